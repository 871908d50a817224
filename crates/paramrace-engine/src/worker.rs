//! Bounded worker pool over leased target-algorithm slots.
//!
//! The pool owns one target-algorithm instance per slot, created once at
//! startup through the [`TargetFactory`]. A lease couples a semaphore
//! permit with exclusive access to one of those instances, so the number
//! of concurrent target runs can never exceed the configured limit and
//! targets are reused rather than recreated per run.

use crate::{EngineError, Result};
use async_trait::async_trait;
use paramrace_core::{Genome, Instance};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// What a completed target run reports back.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetRun {
    /// Quality of the produced solution; lower is better.
    pub quality: f64,
    /// Runtime as measured by the target itself, when it reports one.
    /// Absent means the caller should fall back to wall-clock time.
    pub runtime: Option<Duration>,
}

/// One runnable target-algorithm instance.
///
/// `run` executes the target on a single (genome, instance) pair. The
/// budget is the wall-clock allowance for this attempt; targets that
/// support a native cutoff should pass it through. Enforcement happens
/// outside regardless. An `Err` is a transient failure and subject to the
/// retry budget.
#[async_trait]
pub trait TargetAlgorithm: Send {
    async fn run(
        &mut self,
        genome: &Genome,
        instance: &Instance,
        budget: Duration,
    ) -> Result<TargetRun>;
}

/// Produces target-algorithm instances; called once per worker slot.
#[async_trait]
pub trait TargetFactory: Send + Sync {
    async fn create(&self) -> Result<Box<dyn TargetAlgorithm>>;
}

type SlotList = Arc<Mutex<Vec<Box<dyn TargetAlgorithm>>>>;

/// Fixed-capacity pool of target slots.
#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    idle: SlotList,
    capacity: usize,
}

impl WorkerPool {
    /// Build a pool of `capacity` slots, invoking the factory once per
    /// slot.
    pub async fn new(factory: &dyn TargetFactory, capacity: usize) -> Result<Self> {
        let mut targets = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            targets.push(factory.create().await?);
        }
        Ok(Self {
            permits: Arc::new(Semaphore::new(capacity)),
            idle: Arc::new(Mutex::new(targets)),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots currently free.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait for a free slot. The returned lease holds the slot until
    /// dropped.
    pub async fn lease(&self) -> Result<WorkerLease> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| EngineError::PoolClosed)?;
        let target = lock_slots(&self.idle).pop();
        match target {
            Some(target) => Ok(WorkerLease {
                target: Some(target),
                idle: self.idle.clone(),
                _permit: permit,
            }),
            // A held permit guarantees an idle target; an empty list means
            // the pool was torn down underneath us.
            None => Err(EngineError::PoolClosed),
        }
    }
}

fn lock_slots(slots: &SlotList) -> std::sync::MutexGuard<'_, Vec<Box<dyn TargetAlgorithm>>> {
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Exclusive access to one pool slot for the duration of a run.
pub struct WorkerLease {
    target: Option<Box<dyn TargetAlgorithm>>,
    idle: SlotList,
    _permit: OwnedSemaphorePermit,
}

impl WorkerLease {
    /// Run the leased target on one pair.
    pub async fn run(
        &mut self,
        genome: &Genome,
        instance: &Instance,
        budget: Duration,
    ) -> Result<TargetRun> {
        match self.target.as_deref_mut() {
            Some(target) => target.run(genome, instance, budget).await,
            None => Err(EngineError::PoolClosed),
        }
    }
}

impl Drop for WorkerLease {
    fn drop(&mut self) {
        if let Some(target) = self.target.take() {
            lock_slots(&self.idle).push(target);
        }
        // The permit drops after the target is back, so a waiter that
        // wakes up always finds an idle slot.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFactory {
        created: Arc<AtomicUsize>,
        concurrent: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl CountingFactory {
        fn new() -> Self {
            Self {
                created: Arc::new(AtomicUsize::new(0)),
                concurrent: Arc::new(AtomicUsize::new(0)),
                peak: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl TargetFactory for CountingFactory {
        async fn create(&self) -> Result<Box<dyn TargetAlgorithm>> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(SleepTarget {
                concurrent: self.concurrent.clone(),
                peak: self.peak.clone(),
            }))
        }
    }

    struct SleepTarget {
        concurrent: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TargetAlgorithm for SleepTarget {
        async fn run(
            &mut self,
            _genome: &Genome,
            _instance: &Instance,
            _budget: Duration,
        ) -> Result<TargetRun> {
            let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.concurrent.fetch_sub(1, Ordering::SeqCst);
            Ok(TargetRun {
                quality: 1.0,
                runtime: None,
            })
        }
    }

    fn pair() -> (Genome, Instance) {
        (
            Genome::new(Default::default()),
            Instance::new(paramrace_core::InstanceId::new(0), "inst"),
        )
    }

    #[tokio::test]
    async fn test_factory_called_once_per_slot() {
        let factory = CountingFactory::new();
        let created = factory.created.clone();
        let _pool = WorkerPool::new(&factory, 3).await.unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_capacity() {
        let factory = CountingFactory::new();
        let peak = factory.peak.clone();
        let pool = WorkerPool::new(&factory, 2).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                let (genome, instance) = pair();
                let mut lease = pool.lease().await.unwrap();
                lease
                    .run(&genome, &instance, Duration::from_secs(1))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn test_dropped_lease_frees_the_slot() {
        let factory = CountingFactory::new();
        let pool = WorkerPool::new(&factory, 1).await.unwrap();

        let lease = pool.lease().await.unwrap();
        assert_eq!(pool.available(), 0);
        drop(lease);
        assert_eq!(pool.available(), 1);

        // The slot must be leasable again immediately.
        let again = tokio::time::timeout(Duration::from_millis(100), pool.lease()).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn test_run_reports_target_output() {
        let factory = CountingFactory::new();
        let pool = WorkerPool::new(&factory, 1).await.unwrap();
        let (genome, instance) = pair();

        let mut lease = pool.lease().await.unwrap();
        let run = lease
            .run(&genome, &instance, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(run.quality, 1.0);
        assert_eq!(run.runtime, None);
    }
}
