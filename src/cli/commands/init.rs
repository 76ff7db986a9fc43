//! Init and Config commands.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};

use crate::config::{CONFIG_DIR, CONFIG_FILE, Settings};

/// Run init command - write the default configuration under `base`.
pub fn run_init(base: &Path, force: bool) -> anyhow::Result<PathBuf> {
    let config_path = base.join(CONFIG_DIR).join(CONFIG_FILE);

    if config_path.exists() && !force {
        bail!(
            "Configuration file already exists at: {}\nUse --force to overwrite",
            config_path.display()
        );
    }

    Settings::default()
        .save(&config_path)
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("Cannot write {}", config_path.display()))?;

    Ok(config_path)
}

/// Run config command - display current configuration.
pub fn run_config(config: &Settings) {
    println!("Current Configuration:");
    println!("{}", "=".repeat(50));
    match toml::to_string_pretty(config) {
        Ok(toml_str) => println!("{toml_str}"),
        Err(e) => eprintln!("Error displaying config: {e}"),
    }
}
