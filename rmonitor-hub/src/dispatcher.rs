//! Publish/subscribe bus for reports
//!
//! Publishing fans a report out to every matching subscriber concurrently and
//! waits until all of them have handled it. Each subscriber sees reports in
//! the order `publish` was called. Subscribers that do slow work should put
//! reports on their own queue and return, as the relay does.

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::future::{join_all, BoxFuture, FutureExt};
use parking_lot::RwLock;
use tokio::sync::Mutex;

use rmonitor_protocol::Report;

/// Identifier of one registration with a [`Dispatcher`]
pub type SubscriptionId = u64;

type Callback = Box<dyn Fn(Arc<Report>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Which sentence kinds a subscriber receives
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum KindFilter {
    #[default]
    All,
    Only(HashSet<String>),
}

impl KindFilter {
    /// Receive only the listed tags
    pub fn only<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Only(kinds.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, kind: &str) -> bool {
        match self {
            KindFilter::All => true,
            KindFilter::Only(kinds) => kinds.contains(kind),
        }
    }
}

struct Subscriber {
    id: SubscriptionId,
    filter: KindFilter,
    callback: Callback,
    // FIFO lock: deliveries to this subscriber run one at a time, in publish order
    turn: Mutex<()>,
}

impl Subscriber {
    async fn deliver(self: Arc<Self>, report: Arc<Report>) {
        let _turn = self.turn.lock().await;
        tracing::trace!(subscription_id = self.id, kind = report.kind(), "delivering report");
        (self.callback)(report).await;
    }
}

#[derive(Default)]
struct SubscriberTable {
    subscribers: RwLock<Vec<Arc<Subscriber>>>,
    next_id: AtomicU64,
}

impl SubscriberTable {
    fn remove(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let original_len = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != original_len
    }
}

/// Report bus; clones share the same subscriber table
#[derive(Clone, Default)]
pub struct Dispatcher {
    table: Arc<SubscriberTable>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for reports matching `filter`
    ///
    /// The registration lasts as long as the returned [`Subscription`].
    pub fn subscribe<F, Fut>(&self, filter: KindFilter, callback: F) -> Subscription
    where
        F: Fn(Arc<Report>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.table.next_id.fetch_add(1, Ordering::Relaxed);
        let subscriber = Arc::new(Subscriber {
            id,
            filter,
            callback: Box::new(move |report| callback(report).boxed()),
            turn: Mutex::new(()),
        });

        let mut subscribers = self.table.subscribers.write();
        subscribers.push(subscriber);
        tracing::debug!(subscription_id = id, total = subscribers.len(), "subscriber added");

        Subscription {
            id,
            table: Arc::downgrade(&self.table),
            released: false,
        }
    }

    /// Remove a registration by id; returns false if it was already gone
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.table.remove(id)
    }

    /// Number of live registrations
    pub fn subscriber_count(&self) -> usize {
        self.table.subscribers.read().len()
    }

    /// Deliver `report` to every matching subscriber
    ///
    /// Returns once all of them have handled it, with the number delivered to.
    pub async fn publish(&self, report: Arc<Report>) -> usize {
        let targets: Vec<Arc<Subscriber>> = self
            .table
            .subscribers
            .read()
            .iter()
            .filter(|s| s.filter.matches(report.kind()))
            .cloned()
            .collect();

        let delivered = targets.len();
        join_all(targets.into_iter().map(|s| s.deliver(Arc::clone(&report)))).await;
        delivered
    }
}

/// Scoped registration with a [`Dispatcher`]
///
/// Released exactly once: by [`Subscription::release`], or on drop, which
/// also covers task cancellation and early returns.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: SubscriptionId,
    table: Weak<SubscriberTable>,
    released: bool,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Unsubscribe now
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if std::mem::replace(&mut self.released, true) {
            return;
        }
        if let Some(table) = self.table.upgrade() {
            if table.remove(self.id) {
                tracing::debug!(subscription_id = self.id, "subscriber removed");
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_once();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("released", &self.released)
            .finish()
    }
}
