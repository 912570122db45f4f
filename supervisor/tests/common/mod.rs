//! Common test utilities for supervisor integration tests

#![allow(dead_code)]

pub mod fixtures;

pub use fixtures::{fast_timings, free_port, shell_role, SupervisorBuilder};
