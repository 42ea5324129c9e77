//! Latest-record cache
//!
//! Holds the most recent report per cache key, which is enough to rebuild a
//! client's view of the event. An initialization (`$I`) report wipes
//! everything and is kept under the empty key, so it always leads a snapshot.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use rmonitor_protocol::{registry, Report};

use crate::dispatcher::{Dispatcher, KindFilter, Subscription};

/// Thread-safe map from cache key to the latest report
#[derive(Default)]
pub struct Cache {
    entries: RwLock<BTreeMap<String, Arc<Report>>>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `report`, replacing whatever shared its key
    ///
    /// A reset report clears the cache in the same critical section, so no
    /// reader observes a half-cleared cache.
    pub fn update(&self, report: Arc<Report>) {
        let mut entries = self.entries.write();

        if report.kind() == registry::RESET {
            let dropped = entries.len();
            entries.clear();
            tracing::debug!(dropped, "cache reset");
        }

        if let Some(key) = report.cache_key() {
            entries.insert(key.to_string(), report);
        }
    }

    /// Latest report of `kind` for entity `subkey`
    ///
    /// `subkey` is the sentence's first data field; singleton kinds ignore it.
    pub fn lookup(&self, kind: &str, subkey: Option<&str>) -> Option<Arc<Report>> {
        let key = registry::cache_key_for(kind, subkey)?;
        self.entries.read().get(&key).cloned()
    }

    /// Every cached report, ordered by cache key
    pub fn snapshot(&self) -> Vec<Arc<Report>> {
        self.entries.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Keep this cache current with everything published on `dispatcher`
    pub fn attach(self: &Arc<Self>, dispatcher: &Dispatcher) -> Subscription {
        let cache = Arc::clone(self);
        dispatcher.subscribe(KindFilter::All, move |report| {
            cache.update(report);
            futures::future::ready(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(line: &str) -> Arc<Report> {
        Arc::new(Report::from_csv_str(line, false).unwrap())
    }

    fn kinds(cache: &Cache) -> Vec<String> {
        cache.snapshot().iter().map(|r| r.to_csv().to_string()).collect()
    }

    #[test]
    fn test_reset_leads_snapshot() {
        let cache = Cache::new();
        cache.update(report("$I,14:00:00,01 Jan 24"));
        cache.update(report("$B,5,Race"));
        cache.update(report("$A,12,12,5512,Ann,Lee,,1"));
        cache.update(report("$G,1,12,3,00:10:00.000"));

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.len(), 4);
        assert!(snapshot[0].is_reset());
    }

    #[test]
    fn test_same_key_replaces() {
        let cache = Cache::new();
        cache.update(report("$J,12,00:01:30.000,00:10:00.000"));
        cache.update(report("$J,12,00:01:29.500,00:11:29.500"));

        assert_eq!(cache.len(), 1);
        let latest = cache.lookup("$J", Some("12")).unwrap();
        assert_eq!(latest.fields()[2], "00:01:29.500");
    }

    #[test]
    fn test_indexed_rows_sort_numerically() {
        let cache = Cache::new();
        for pos in ["2", "10", "1"] {
            cache.update(report(&format!("$G,{},C{},3,00:10:00.000", pos, pos)));
        }

        let positions: Vec<String> = cache.snapshot().iter().map(|r| r.fields()[1].clone()).collect();
        assert_eq!(positions, vec!["1", "2", "10"]);
    }

    #[test]
    fn test_reset_clears_previous_state() {
        let cache = Cache::new();
        cache.update(report("$B,5,Race"));
        cache.update(report("$F,10,00:10:00,14:00:00,00:20:00,Green"));
        cache.update(report("$I,14:00:00,01 Jan 24"));

        assert_eq!(kinds(&cache), vec!["$I,14:00:00,01 Jan 24"]);
    }

    #[test]
    fn test_uncached_kinds_not_retained() {
        let cache = Cache::new();
        cache.update(report("$L,31,1,SF,01/06/24,14:00:01.100,7,GTP"));
        cache.update(report("$ZZ,something"));
        cache.update(report("$G,first,12,3,00:10:00.000"));

        assert!(cache.is_empty());
    }

    #[test]
    fn test_lookup_singleton_ignores_subkey() {
        let cache = Cache::new();
        cache.update(report("$F,10,00:10:00,14:00:00,00:20:00,Green"));

        assert!(cache.lookup("$F", None).is_some());
        assert!(cache.lookup("$F", Some("anything")).is_some());
        assert!(cache.lookup("$L", Some("31")).is_none());
    }

    #[tokio::test]
    async fn test_attach_follows_dispatcher() {
        let cache = Arc::new(Cache::new());
        let dispatcher = Dispatcher::new();
        let subscription = cache.attach(&dispatcher);

        dispatcher.publish(report("$B,5,Race")).await;
        assert_eq!(cache.len(), 1);

        drop(subscription);
        dispatcher.publish(report("$E,TRACKNAME,Sebring")).await;
        assert_eq!(cache.len(), 1);
    }
}
