//! `stepwire check`: load and validate the configuration.

use std::path::Path;

use anyhow::Context as _;

pub fn run(path: Option<&Path>) -> anyhow::Result<()> {
    let config = super::load_config(path).context("failed to load config")?;
    println!("Config parsed");
    println!("  Model:     {}", config.model);
    println!("  Base URL:  {}", config.base_url);
    println!("  API key:   {}", if config.has_api_key() { "set" } else { "missing" });
    println!("  Max steps: {}", config.max_steps_per_run);
    println!(
        "  Context:   {} tokens ({} reserved)",
        config.max_context_size, config.reserved_tokens
    );

    config.validate().context("config is invalid")?;
    println!("All checks passed");
    Ok(())
}
