use anyhow::Result;

use crate::cli::output::{OutputFormat, OutputOptions};
use crate::core::config::AppConfig;

pub fn init(_opts: &OutputOptions) -> Result<()> {
    let path = AppConfig::config_path();
    if path.exists() {
        eprintln!("Config file already exists at {}", path.display());
        eprintln!("Remove it first if you want to regenerate.");
        return Ok(());
    }

    match AppConfig::default().save() {
        Ok(path) => {
            println!("Generated config at {}", path.display());
            println!("  Add a [budget] section to track spend against a limit.");
        }
        Err(e) => {
            eprintln!("Failed to generate config: {}", e);
            std::process::exit(1);
        }
    }
    Ok(())
}

pub fn path(opts: &OutputOptions) -> Result<()> {
    let path = AppConfig::config_path();
    match opts.format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({ "path": path, "exists": path.exists() })
        ),
        OutputFormat::Text => println!("{}", path.display()),
    }
    Ok(())
}

pub fn check(_opts: &OutputOptions) -> Result<()> {
    let path = AppConfig::config_path();
    if !path.exists() {
        eprintln!("No config file found at {}", path.display());
        eprintln!("Run `tkc config init` to create one.");
        return Ok(());
    }

    let config = match AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    let mut issues = config.validate();
    if let Err(e) = config.pricing_registry() {
        issues.push(format!("Pricing: {}", e));
    }

    if issues.is_empty() {
        println!("Config is valid: {}", path.display());
        match &config.budget {
            Some(budget) => println!(
                "  Budget: ${:.2} {} (alert at {:.0}%)",
                budget.amount,
                budget.period.to_string().to_lowercase(),
                budget.alert_threshold * 100.0
            ),
            None => println!("  No budget configured."),
        }
        if let Some(pricing) = &config.settings.pricing_file {
            println!("  Pricing overrides: {}", pricing.display());
        }
    } else {
        eprintln!("Config issues found in {}:", path.display());
        for issue in &issues {
            eprintln!("  - {}", issue);
        }
        std::process::exit(1);
    }
    Ok(())
}
