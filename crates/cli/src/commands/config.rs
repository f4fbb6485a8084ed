//! Config subcommands

use anyhow::{Context, Result};
use mrdice_core::{CONFIG_FILE_NAME, Config};

/// Print the effective configuration and where it was loaded from.
pub fn cmd_config_show() -> Result<()> {
  let cwd = std::env::current_dir().context("Failed to determine current directory")?;
  let (config, source) = Config::load_with_source(&cwd).context("Failed to load configuration")?;

  match source {
    Some(path) => println!("# Loaded from: {}", path.display()),
    None => println!("# Built-in defaults (no config file found)"),
  }
  println!();
  print!("{}", toml::to_string_pretty(&config).context("Failed to render configuration")?);

  Ok(())
}

/// Write a commented template config to the current directory.
pub fn cmd_config_init(force: bool) -> Result<()> {
  let path = std::env::current_dir()
    .context("Failed to determine current directory")?
    .join(CONFIG_FILE_NAME);

  if path.exists() && !force {
    anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
  }

  std::fs::write(&path, Config::generate_template()).with_context(|| format!("Failed to write {}", path.display()))?;

  println!("Wrote {}", path.display());
  println!("Edit it and run 'dicectl config show' to check the result.");

  Ok(())
}
