//! RMONITOR feed collector
//!
//! Sources sentences from an upstream timing system and publishes them on a
//! [`rmonitor_hub::Dispatcher`].
//!
//! # Modes
//!
//! - **Pull**: connect out to the timing system (port 50000 by default) and
//!   reconnect forever, waiting per [`ReconnectPolicy`] between attempts
//! - **Push**: listen (port 40000 by default) and let the timing system
//!   connect in; every accepted connection runs its own worker
//!
//! # Example
//!
//! ```no_run
//! use rmonitor_collector::{Collector, CollectorConfig};
//! use rmonitor_hub::Dispatcher;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> rmonitor_collector::Result<()> {
//! let dispatcher = Dispatcher::new();
//! let collector = Collector::new(CollectorConfig::pull("10.0.0.5", 50000), dispatcher);
//!
//! let cancel = CancellationToken::new();
//! collector.run(cancel.clone()).await?;
//! # Ok(())
//! # }
//! ```

pub mod collector;
pub mod config;
pub mod error;

// Re-exports
pub use collector::{Collector, WorkerStats};
pub use config::{CollectorConfig, CollectorMode, ReconnectPolicy, DEFAULT_MAX_LINE_LENGTH, DEFAULT_PULL_PORT, DEFAULT_PUSH_PORT};
pub use error::{CollectorError, Result};
