//! RMONITOR relay
//!
//! Listens for downstream clients and gives each one a consistent view of
//! the event: the cached state on connect, then every live report, as CSV
//! lines.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rmonitor_hub::{Cache, Dispatcher};
//! use rmonitor_relay::{Relay, RelayConfig};
//!
//! # async fn example() -> rmonitor_relay::Result<()> {
//! let dispatcher = Dispatcher::new();
//! let cache = Arc::new(Cache::new());
//! let _attached = cache.attach(&dispatcher);
//!
//! let relay = Relay::new(RelayConfig::default(), cache, dispatcher);
//! relay.start().await?;
//! // ... publish reports on the dispatcher ...
//! relay.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod relay;
pub mod session;

// Re-exports
pub use config::{RelayConfig, DEFAULT_RELAY_PORT, DEFAULT_WRITE_TIMEOUT};
pub use error::{RelayError, Result};
pub use relay::Relay;
pub use session::{Session, SessionEnd, SessionId, SessionManager};
