//! Shared result store.
//!
//! The store is the only shared, concurrently written resource in the
//! engine. Writes are idempotent per (genome, instance) key: a duplicate
//! write is a no-op, so a cancelled-then-late-arriving result can never
//! corrupt an already reported outcome. Entries are only ever removed
//! wholesale, when the active instance set changes.

use dashmap::DashMap;
use paramrace_core::{EvalResult, GenomeId, GenomeResults, Instance, InstanceId};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ResultStore {
    version: AtomicU64,
    results: DashMap<(GenomeId, InstanceId), EvalResult>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a result unless the key already holds one. Returns whether
    /// the write took effect.
    pub fn put(&self, genome: GenomeId, instance: InstanceId, result: EvalResult) -> bool {
        match self.results.entry((genome, instance)) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(result);
                true
            }
        }
    }

    pub fn get(&self, genome: GenomeId, instance: InstanceId) -> Option<EvalResult> {
        self.results
            .get(&(genome, instance))
            .map(|entry| entry.value().clone())
    }

    pub fn contains(&self, genome: GenomeId, instance: InstanceId) -> bool {
        self.results.contains_key(&(genome, instance))
    }

    /// Collect a genome's stored results over `instances`. Misses are
    /// simply absent from the returned set.
    pub fn results_for(&self, genome: GenomeId, instances: &[Instance]) -> GenomeResults {
        let mut results = GenomeResults::new();
        for instance in instances {
            if let Some(result) = self.get(genome, instance.id()) {
                results.insert(instance.id(), result);
            }
        }
        results
    }

    /// Drop every entry and advance the version. Called when the active
    /// instance set changes; results against the old set are meaningless
    /// against the new one.
    pub fn invalidate(&self) -> u64 {
        self.results.clear();
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paramrace_core::{Genome, ParamValue};
    use std::time::Duration;

    fn genome(x: i64) -> GenomeId {
        let mut g = Genome::new(Default::default());
        g.set("x", ParamValue::Int(x));
        g.id()
    }

    #[test]
    fn test_put_then_get() {
        let store = ResultStore::new();
        let result = EvalResult::finished(1.0, Duration::from_millis(10));
        assert!(store.put(genome(1), InstanceId::new(0), result.clone()));
        assert_eq!(store.get(genome(1), InstanceId::new(0)), Some(result));
        assert_eq!(store.get(genome(2), InstanceId::new(0)), None);
    }

    #[test]
    fn test_duplicate_put_keeps_first_result() {
        let store = ResultStore::new();
        let first = EvalResult::finished(1.0, Duration::from_millis(10));
        let second = EvalResult::finished(9.0, Duration::from_millis(99));

        assert!(store.put(genome(1), InstanceId::new(0), first.clone()));
        assert!(!store.put(genome(1), InstanceId::new(0), second));
        assert_eq!(store.get(genome(1), InstanceId::new(0)), Some(first));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_invalidate_clears_and_bumps_version() {
        let store = ResultStore::new();
        store.put(
            genome(1),
            InstanceId::new(0),
            EvalResult::finished(1.0, Duration::from_millis(10)),
        );
        assert_eq!(store.version(), 0);

        let version = store.invalidate();
        assert_eq!(version, 1);
        assert_eq!(store.version(), 1);
        assert!(store.is_empty());
        assert_eq!(store.get(genome(1), InstanceId::new(0)), None);
    }

    #[test]
    fn test_results_for_collects_hits_only() {
        let store = ResultStore::new();
        let instances = vec![
            Instance::new(InstanceId::new(0), "a"),
            Instance::new(InstanceId::new(1), "b"),
        ];
        store.put(
            genome(1),
            InstanceId::new(1),
            EvalResult::finished(0.5, Duration::from_millis(20)),
        );

        let results = store.results_for(genome(1), &instances);
        assert_eq!(results.len(), 1);
        assert!(results.get(InstanceId::new(1)).is_some());
        assert!(results.get(InstanceId::new(0)).is_none());
    }
}
