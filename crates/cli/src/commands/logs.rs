//! Logs command

use super::load_config;
use crate::format::format_size;
use anyhow::{Context, Result};
use mrdice_core::ServiceId;
use std::process::Command;

/// Show or follow a service log. With no service, list the available log files.
pub fn cmd_logs(service: Option<&str>, lines: usize, follow: bool) -> Result<()> {
  let config = load_config()?;
  let log_dir = config.log_dir();

  let Some(name) = service else {
    return list_log_files(&log_dir);
  };

  let service: ServiceId = name.parse().map_err(anyhow::Error::msg)?;
  let log_file = log_dir.join(service.log_file_name());

  if !log_file.exists() {
    println!("No log file at {}", log_file.display());
    println!("The service may not have been deployed yet.");
    return Ok(());
  }

  if follow {
    // Hand the terminal to tail so Ctrl-C works as expected.
    let status = Command::new("tail")
      .arg("-f")
      .arg("-n")
      .arg(lines.to_string())
      .arg(&log_file)
      .status()
      .context("Failed to run tail")?;
    if !status.success() {
      anyhow::bail!("tail exited with {status}");
    }
    return Ok(());
  }

  let content = std::fs::read_to_string(&log_file).with_context(|| format!("Failed to read {}", log_file.display()))?;
  let all: Vec<&str> = content.lines().collect();
  let start = all.len().saturating_sub(lines);
  println!("Showing {} of {} lines from {}", all.len() - start, all.len(), log_file.display());
  println!();
  for line in &all[start..] {
    println!("{line}");
  }

  Ok(())
}

fn list_log_files(log_dir: &std::path::Path) -> Result<()> {
  if !log_dir.is_dir() {
    println!("No logs yet (looked in {})", log_dir.display());
    return Ok(());
  }

  let mut entries: Vec<(String, u64, std::time::SystemTime)> = Vec::new();
  for entry in std::fs::read_dir(log_dir).with_context(|| format!("Failed to read {}", log_dir.display()))? {
    let entry = entry?;
    let path = entry.path();
    if path.extension().and_then(|e| e.to_str()) != Some("log") {
      continue;
    }
    let meta = entry.metadata()?;
    let name = entry.file_name().to_string_lossy().into_owned();
    let modified = meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH);
    entries.push((name, meta.len(), modified));
  }

  if entries.is_empty() {
    println!("No logs yet (looked in {})", log_dir.display());
    return Ok(());
  }

  entries.sort_by(|a, b| b.2.cmp(&a.2));

  println!("Log files in {}:", log_dir.display());
  for (name, size, _) in &entries {
    println!("  {:<40} {}", name, format_size(*size));
  }
  println!();
  println!("Use 'dicectl logs <service>' to view one.");

  Ok(())
}
