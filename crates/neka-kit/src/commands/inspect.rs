use camino::Utf8PathBuf;
use colored::Colorize;
use miette::{IntoDiagnostic, Result};
use neka_kit::KitStructure;

use crate::errors::CliError;
use crate::println_pad;

pub struct InspectKitArgs {
    pub kit: String,
    pub json: bool,
}

pub fn inspect_kit(args: InspectKitArgs) -> Result<()> {
    let root = Utf8PathBuf::from(&args.kit);
    let kit = KitStructure::scan(&root).map_err(|e| match e {
        neka_kit::Error::NotFound(path) => CliError::kit_not_found(path),
        other => CliError::kit_failed(other),
    })?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&kit).into_diagnostic()?);
        return Ok(());
    }

    println_pad!(
        "{} {}",
        "📁 Kit:".bright_blue().bold(),
        kit.root.as_str().bright_cyan().bold()
    );
    match kit.canvas {
        Some(canvas) => println_pad!(
            "{} {}x{}",
            "🖼️  Canvas:".bright_green(),
            canvas.width,
            canvas.height
        ),
        None => println_pad!(
            "{} {}",
            "🖼️  Canvas:".bright_green(),
            "(no metadata.json)".bright_yellow()
        ),
    }

    println_pad!("\n{}", "🏗️  Folders:".bright_magenta().bold());
    for folder in &kit.folders {
        let marker = if folder.is_separated {
            " separated".bright_yellow().to_string()
        } else {
            String::new()
        };
        let colors = if folder.colors.is_empty() {
            "default".to_string()
        } else {
            folder.colors.join(", ")
        };
        println_pad!(
            "   {} {} {} {}{}",
            "•".bright_cyan(),
            folder.name.bright_cyan().bold(),
            format!("({} items)", folder.items_count).dimmed(),
            colors.bright_white(),
            marker
        );
    }

    if !kit.duplicate_x.is_empty() {
        println_pad!(
            "\n{} {}",
            "⚠️  Duplicate X:".bright_yellow().bold(),
            join(&kit.duplicate_x)
        );
    }
    if !kit.missing_x.is_empty() {
        println_pad!("{} {}", "⚠️  Missing X:".bright_yellow(), join(&kit.missing_x));
    }
    if !kit.missing_y.is_empty() {
        println_pad!("{} {}", "⚠️  Missing Y:".bright_yellow(), join(&kit.missing_y));
    }
    Ok(())
}

fn join(values: &[usize]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
