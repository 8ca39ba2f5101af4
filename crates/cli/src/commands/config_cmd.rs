//! `parley config`: Configuration management commands.

use std::path::Path;

use anyhow::Context;
use parley_config::AppConfig;

pub fn show(config_path: &Path) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config.redacted())?;
    println!("# {}", config_path.display());
    println!("{toml_str}");
    Ok(())
}

pub fn init(config_path: &Path, force: bool) -> anyhow::Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }
    if let Some(dir) = config_path.parent() {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    std::fs::write(config_path, AppConfig::default_toml())
        .with_context(|| format!("writing {}", config_path.display()))?;

    println!("Wrote {}", config_path.display());
    println!("Secrets can stay out of the file: set GEMINI_API_KEY and DISCORD_BOT_TOKEN instead.");
    Ok(())
}

pub fn path(config_path: &Path) {
    println!("{}", config_path.display());
}
