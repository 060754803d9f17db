use camino::{Utf8Path, Utf8PathBuf};
use colored::Colorize;
use miette::Result;
use neka_kit::{KitImporter, ReorganizeProgress, ReorganizeStage, METADATA_FILE};

use super::decompress::read_payload;
use crate::errors::CliError;
use crate::println_pad;
use crate::utils::config::load_config;
use crate::utils::print_summary;

pub struct ImportKitArgs {
    pub input: String,
    pub output_dir: Option<String>,
    pub workers: Option<usize>,
}

pub struct ReorganizeKitArgs {
    pub kit: String,
    pub workers: Option<usize>,
}

fn print_progress(progress: ReorganizeProgress) {
    if progress.stage == ReorganizeStage::Processing {
        println_pad!(
            "{} {}",
            format!("[{}/{}]", progress.current, progress.total).dimmed(),
            progress.current_folder.unwrap_or_default().bright_cyan()
        );
    }
}

pub fn import_kit(args: ImportKitArgs) -> Result<()> {
    let cfg = load_config();
    let payload = read_payload(&args.input)?;
    let output_dir = Utf8PathBuf::from(args.output_dir.unwrap_or(cfg.output_dir.clone()));

    println_pad!(
        "{} {}",
        "📥 Importing into".bright_blue().bold(),
        output_dir.as_str().bright_cyan()
    );
    let report = KitImporter::new(output_dir, cfg.reorganize_options(args.workers))
        .with_progress(print_progress)
        .import(&payload)
        .map_err(CliError::kit_failed)?;

    println!();
    print_summary(&report.summary);
    Ok(())
}

/// Accepts either a kit folder or its metadata.json.
fn metadata_path(kit: &str) -> Result<Utf8PathBuf> {
    let path = Utf8Path::new(kit);
    let metadata = if path.file_name() == Some(METADATA_FILE) {
        path.to_path_buf()
    } else {
        path.join(METADATA_FILE)
    };
    if !metadata.as_std_path().is_file() {
        return Err(CliError::kit_not_found(path.to_path_buf()).into());
    }
    Ok(metadata)
}

pub fn reorganize_kit(args: ReorganizeKitArgs) -> Result<()> {
    let cfg = load_config();
    let metadata = metadata_path(&args.kit)?;

    println_pad!(
        "{} {}",
        "🔁 Reorganizing".bright_blue().bold(),
        metadata.as_str().bright_cyan()
    );
    let report = KitImporter::new(cfg.output_dir.clone(), cfg.reorganize_options(args.workers))
        .with_progress(print_progress)
        .reorganize_metadata(&metadata)
        .map_err(CliError::kit_failed)?;

    println!();
    print_summary(&report.summary);
    Ok(())
}
