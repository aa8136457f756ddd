//! Database bootstrap and configuration inspection.

use anyhow::{Context, Result};

use pullreq::config::ServiceConfig;
use pullreq::review::server::open_database;

pub fn cmd_init(config: &ServiceConfig) -> Result<()> {
    open_database(&config.database.path)?;
    println!(
        "Review database initialized at {}",
        config.database.path.display()
    );
    Ok(())
}

pub fn cmd_config(config: &ServiceConfig) -> Result<()> {
    let rendered = toml::to_string_pretty(config).context("Failed to render configuration")?;
    println!("{}", rendered.trim_end());

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("\nConfiguration is valid.");
    } else {
        println!("\nWarnings:");
        for warning in warnings {
            println!("  - {}", warning);
        }
    }
    Ok(())
}
