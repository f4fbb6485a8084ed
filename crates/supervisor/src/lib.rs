//! Process supervision for the Mr.Dice fleet: run records, detached
//! launching, readiness probes, and the deploy/stop/status orchestrator.

pub mod launch;
pub mod pidfile;
pub mod probe;
pub mod process;
pub mod supervisor;

pub use launch::{LaunchError, spawn_detached};
pub use pidfile::{RecordError, RunDir, ServiceRecord};
pub use probe::{Readiness, wait_ready};
pub use supervisor::{LaunchOutcome, ServiceState, ServiceStatus, StopOutcome, Supervisor, Timeouts};
