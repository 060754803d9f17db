use camino::Utf8PathBuf;
use colored::Colorize;
use miette::{IntoDiagnostic, Result};
use neka_vocab::{Decompressor, RawPayload};

use crate::errors::CliError;
use crate::println_pad;

pub struct DecompressPayloadArgs {
    pub input: String,
    pub output: Option<String>,
}

pub(crate) fn read_payload(input: &str) -> Result<RawPayload> {
    let path = Utf8PathBuf::from(input);
    if !path.as_std_path().is_file() {
        return Err(CliError::file_not_found(path).into());
    }
    let bytes = std::fs::read(path.as_std_path()).into_diagnostic()?;
    RawPayload::from_slice(&bytes).map_err(|e| CliError::invalid_payload(path, e).into())
}

pub fn decompress_payload(args: DecompressPayloadArgs) -> Result<()> {
    let payload = read_payload(&args.input)?;
    let mut decompressor = Decompressor::new(&payload.vocabulary);
    let value = decompressor
        .decompress_root(&payload.root)
        .map_err(|e| CliError::invalid_payload(Utf8PathBuf::from(&args.input), e))?;
    let pretty = serde_json::to_string_pretty(&value).into_diagnostic()?;

    match args.output {
        Some(output) => {
            std::fs::write(&output, pretty).into_diagnostic()?;
            println_pad!(
                "{} {} {}",
                "✓ Decompressed".bright_green().bold(),
                payload.vocabulary.len().to_string().bright_white(),
                format!("entries into {}", output).dimmed()
            );
            for diagnostic in decompressor.diagnostics() {
                println_pad!("   {} {}", "•".bright_yellow(), diagnostic);
            }
        }
        None => println!("{}", pretty),
    }
    Ok(())
}
