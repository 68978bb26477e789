//! `contextwise config` — Print configuration.

use super::load_config;
use anyhow::{Context, Result};
use contextwise_config::AppConfig;

pub fn run(effective: bool) -> Result<()> {
    if !effective {
        print!("{}", AppConfig::default_toml());
        return Ok(());
    }

    let config = load_config()?;
    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("# Loaded from {}", config_path.display());
    } else {
        println!("# No config file at {}; showing defaults", config_path.display());
    }
    if let Some(window) = config.context_window_override {
        println!("# CONTEXTWISE_CONTEXT_WINDOW={window} overrides the models table");
    }
    print!(
        "{}",
        toml::to_string_pretty(&config).context("Failed to render config")?
    );
    Ok(())
}
