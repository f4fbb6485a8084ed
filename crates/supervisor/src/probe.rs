//! Readiness probing for freshly launched services.
//!
//! "Ready" means the process is still alive and its port accepts a TCP
//! connection. This replaces fixed post-launch sleeps: a fast service reports
//! ready in well under a second, a crashed one reports immediately.

use crate::process::is_process_running;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{Instant, sleep, timeout};

/// Cap on a single TCP connect attempt.
const CONNECT_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(250);

/// Outcome of waiting for a service to become ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
  /// Alive, and the port accepted a connection.
  Ready,
  /// The process exited before becoming ready.
  ExitedEarly,
  /// Still alive, but the port never accepted within the deadline.
  TimedOut,
}

/// Poll until the process is ready, exits, or the deadline passes.
///
/// With `port = None` there is nothing to probe, so the deadline acts as a
/// liveness grace period: surviving it counts as ready.
pub async fn wait_ready(pid: u32, port: Option<u16>, deadline: Duration, interval: Duration) -> Readiness {
  let limit = Instant::now() + deadline;

  loop {
    if !is_process_running(pid) {
      return Readiness::ExitedEarly;
    }

    if let Some(port) = port
      && timeout(CONNECT_ATTEMPT_TIMEOUT, TcpStream::connect(("127.0.0.1", port)))
        .await
        .is_ok_and(|conn| conn.is_ok())
    {
      return Readiness::Ready;
    }

    if Instant::now() >= limit {
      return if port.is_some() { Readiness::TimedOut } else { Readiness::Ready };
    }
    sleep(interval).await;
  }
}
