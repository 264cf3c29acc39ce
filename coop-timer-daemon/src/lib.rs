//! Coop timer daemon library
//!
//! This module re-exports the daemon's modules for integration testing.

pub mod app;
pub mod config;

pub use app::{build_rules, TimerApp};
pub use config::{DaemonConfig, TriggerConfig, TriggerMatch};
