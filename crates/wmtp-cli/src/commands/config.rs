//! Config command implementations

use std::path::Path;

use anyhow::{Context, Result};

use crate::output::{print_error, print_info, print_success};
use wmtp_core::config::{self, ClientConfig};

/// Print the effective configuration (file values plus overrides)
pub fn config_show(config: &ClientConfig, path: &Path) -> Result<()> {
    if path.exists() {
        print_info(&format!("Loaded from {}", path.display()));
    } else {
        print_info(&format!("No config file at {}, using defaults", path.display()));
    }
    let content = toml::to_string_pretty(config).context("Failed to render configuration")?;
    println!("{}", content);
    Ok(())
}

/// Write a default configuration file
pub fn config_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        print_error(&format!("Config file already exists: {}", path.display()));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    config::save_config(path, &ClientConfig::default())
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    print_success(&format!("Created configuration file: {}", path.display()));
    Ok(())
}
