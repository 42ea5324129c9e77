//! In-process state for an RMONITOR pipeline
//!
//! - [`Cache`]: the latest report per cache key, snapshotted for new clients
//! - [`Dispatcher`]: publish/subscribe bus between producers and consumers
//!
//! Both are plain values owned by whoever wires the pipeline together, so one
//! process can run several independent pipelines.

pub mod cache;
pub mod dispatcher;

// Re-exports
pub use cache::Cache;
pub use dispatcher::{Dispatcher, KindFilter, Subscription, SubscriptionId};
