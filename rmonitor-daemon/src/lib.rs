//! RMONITOR daemon library
//!
//! Configuration, command-line overrides and pipeline wiring, shared by the
//! binary and the integration tests.

pub mod cli;
pub mod config;
pub mod pipeline;

pub use cli::Args;
pub use config::{CollectorSection, DaemonConfig, FeedMode, RelaySection};
pub use pipeline::Pipeline;
