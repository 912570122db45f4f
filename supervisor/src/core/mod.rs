//! Core supervision logic
//!
//! The supervisor and monitor talk to the OS only through the seam traits
//! in [`crate::traits`], so both run against mocks in tests.

pub mod monitor;
pub mod supervisor;

pub use monitor::{spawn_status_timer, StatusMonitor};
pub use supervisor::{ManagedProcess, OutputCapture, ProcessOrigin, ProcessSupervisor, SupervisorOutcome};
