use colored::Colorize;
use neka_kit::ReorganizeSummary;

pub mod config;

#[macro_export]
macro_rules! println_pad {
    ($($arg:tt)*) => {{
        let __s = format!($($arg)*);
        for __line in __s.lines() {
            println!("    {}", __line);
        }
    }};
}

/// Prints the outcome of a reorganization run.
pub fn print_summary(summary: &ReorganizeSummary) {
    println_pad!(
        "{} {}",
        "📁 Kit:".bright_blue().bold(),
        summary.kit_root.as_str().bright_cyan().bold()
    );
    println_pad!(
        "{} {} {}",
        "🧩 Render layers:".bright_green(),
        summary.render_layers.to_string().bright_white().bold(),
        format!("(canvas {}x{})", summary.canvas.width, summary.canvas.height).dimmed()
    );
    println_pad!(
        "{} {} written, {} already present",
        "🖼️  Files:".bright_green(),
        summary.files_written.to_string().bright_white().bold(),
        summary.files_existing.to_string().bright_white()
    );

    if !summary.separated.is_empty() {
        println_pad!(
            "{} {}",
            "🪄 Separated layers:".bright_magenta(),
            summary.separated.join(", ").bright_white()
        );
    }
    if summary.undecodable > 0 {
        println_pad!(
            "{} {}",
            "⚠️  Undecodable assets:".bright_yellow(),
            summary.undecodable
        );
    }
    if !summary.issues.is_empty() {
        println_pad!(
            "\n{} {}",
            "⚠️  Skipped document entries:".bright_yellow().bold(),
            summary.issues.len()
        );
        for issue in &summary.issues {
            println_pad!(
                "   {} {} {}",
                "•".bright_yellow(),
                issue.path.bright_white(),
                format!("({})", issue.message).dimmed()
            );
        }
    }
    if !summary.failed_blobs.is_empty() {
        println_pad!(
            "\n{} {}",
            "✗ Failed blobs:".bright_red().bold(),
            summary.failed_blobs.len()
        );
        for blob in &summary.failed_blobs {
            println_pad!("   {} {}", "•".bright_red(), blob);
        }
    }
    if !summary.failed_writes.is_empty() {
        println_pad!(
            "\n{} {}",
            "✗ Unwritable outputs:".bright_red().bold(),
            summary.failed_writes.len()
        );
        for path in &summary.failed_writes {
            println_pad!("   {} {}", "•".bright_red(), path.as_str());
        }
    }

    println_pad!(
        "\n{} {}",
        "✓ Done in".bright_green().bold(),
        format!("{:.2?}", summary.elapsed).bright_white()
    );
}
