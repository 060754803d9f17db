use crate::utils::config::{self, AppConfig};
use colored::Colorize;
use miette::Result;

pub fn show_config() -> Result<()> {
    let cfg = config::load_config();
    let config_path = config::default_config_path()
        .map(|p| p.to_string())
        .unwrap_or_else(|| "Unknown".to_string());

    println!();
    println!("  {} {}", "config_file:".bright_white(), config_path);
    for key in AppConfig::KEYS {
        let value = cfg.get(key).unwrap_or_default();
        println!(
            "  {} {}",
            format!("{}:", key).bright_white(),
            value.bright_green()
        );
    }
    println!();
    Ok(())
}

pub fn set_config_value(key: String, value: String) -> Result<()> {
    let mut cfg = config::load_config();
    cfg.set(&key, &value)?;
    config::save_config(&cfg).map_err(|e| miette::miette!("Failed to save config: {}", e))?;

    println!("{}", "✓ Configuration updated".bright_green().bold());
    println!();
    println!(
        "  {} {}",
        format!("{}:", key).bright_white().bold(),
        cfg.get(&key).unwrap_or_default().bright_green()
    );
    Ok(())
}

pub fn reset_config() -> Result<()> {
    let config_path = config::default_config_path()
        .map(|p| p.to_string())
        .unwrap_or_else(|| "Unknown".to_string());

    config::save_config(&AppConfig::default())
        .map_err(|e| miette::miette!("Failed to reset config: {}", e))?;

    println!(
        "{}",
        "✓ Configuration reset to defaults".bright_green().bold()
    );
    println!();
    println!("  {} {}", "Config file:".bright_white().bold(), config_path);
    Ok(())
}
