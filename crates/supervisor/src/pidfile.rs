// Run records - one JSON file per launched service
//
// Records are what stop/status target:
// - Written after a successful spawn, removed after a confirmed stop
// - Verified against the live process table before use (pid reuse)
// - Stale records from dead processes are cleaned up on sight

use chrono::{DateTime, Utc};
use mrdice_core::ServiceId;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecordError {
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),
}

/// Run record contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRecord {
  pub service: ServiceId,
  pub pid: u32,
  pub port: u16,
  /// Environment profile the service was launched with.
  pub env: String,
  /// Full command line, for display.
  pub command: String,
  /// Argument tail used to verify the pid still runs this command.
  pub signature: String,
  pub log_file: PathBuf,
  pub started_at: DateTime<Utc>,
}

impl ServiceRecord {
  pub fn uptime_secs(&self) -> i64 {
    (Utc::now() - self.started_at).num_seconds().max(0)
  }
}

/// Manages run records under a single directory.
pub struct RunDir {
  dir: PathBuf,
}

impl RunDir {
  pub fn new(dir: PathBuf) -> Self {
    Self { dir }
  }

  pub fn record_path(&self, service: ServiceId) -> PathBuf {
    self.dir.join(format!("{}.json", service.name()))
  }

  pub fn write(&self, record: &ServiceRecord) -> Result<(), RecordError> {
    fs::create_dir_all(&self.dir)?;

    let path = self.record_path(record.service);
    let mut file = OpenOptions::new().write(true).create(true).truncate(true).open(&path)?;

    let contents = serde_json::to_string_pretty(record)?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()?;

    Ok(())
  }

  pub fn read(&self, service: ServiceId) -> Result<Option<ServiceRecord>, RecordError> {
    let path = self.record_path(service);
    if !path.exists() {
      return Ok(None);
    }

    let mut file = File::open(&path)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    Ok(Some(serde_json::from_str(&contents)?))
  }

  pub fn remove(&self, service: ServiceId) -> Result<(), RecordError> {
    let path = self.record_path(service);
    if path.exists() {
      fs::remove_file(&path)?;
    }
    Ok(())
  }
}
