//! Small display helpers shared by commands.

/// Format duration in human-readable form
pub fn format_duration(seconds: u64) -> String {
  if seconds < 60 {
    format!("{} sec", seconds)
  } else if seconds < 3600 {
    let mins = seconds / 60;
    let secs = seconds % 60;
    if secs > 0 {
      format!("{} min {} sec", mins, secs)
    } else {
      format!("{} min", mins)
    }
  } else if seconds < 86400 {
    let hours = seconds / 3600;
    let mins = (seconds % 3600) / 60;
    if mins > 0 {
      format!("{} hr {} min", hours, mins)
    } else {
      format!("{} hr", hours)
    }
  } else {
    let days = seconds / 86400;
    let hours = (seconds % 86400) / 3600;
    if hours > 0 {
      format!("{} d {} hr", days, hours)
    } else {
      format!("{} d", days)
    }
  }
}

pub fn format_size(bytes: u64) -> String {
  if bytes < 1024 {
    format!("{} B", bytes)
  } else if bytes < 1024 * 1024 {
    format!("{:.1} KB", bytes as f64 / 1024.0)
  } else {
    format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
  }
}

pub fn join_pids(pids: &[u32]) -> String {
  pids.iter().map(|pid| pid.to_string()).collect::<Vec<_>>().join(", ")
}
