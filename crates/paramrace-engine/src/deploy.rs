//! In-process deployment of a selector with its coordinators.

use crate::coordinator::{create_coordinator_actor, CoordinatorHandle};
use crate::messages::SelectionOutcome;
use crate::selector::{create_selector_actor, SelectorHandle};
use crate::store::ResultStore;
use crate::worker::{TargetFactory, WorkerPool};
use crate::Result;
use paramrace_core::{EngineConfig, EventSink, Genome, Instance, RunEvaluator, TunerEvent};
use std::sync::Arc;
use tracing::{info, warn};

/// A running evaluation engine: one selector, `coordinator_count`
/// coordinators, each with its own pool of `worker_count` target slots,
/// all sharing one result store.
pub struct LocalDeployment {
    selector: SelectorHandle,
    coordinators: Vec<CoordinatorHandle>,
    store: Arc<ResultStore>,
    events: EventSink,
}

impl LocalDeployment {
    /// Spawn the actors and wire them together. The factory is invoked
    /// once per worker slot, so `coordinator_count * worker_count` targets
    /// exist up front.
    pub async fn start(
        config: EngineConfig,
        factory: &dyn TargetFactory,
        evaluator: Arc<dyn RunEvaluator>,
        events: EventSink,
    ) -> Result<Self> {
        config.validate()?;

        let requested = config.coordinator_count * config.worker_count;
        let hardware = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        if requested > hardware {
            let message = format!(
                "{requested} worker slots configured but only {hardware} hardware threads available"
            );
            warn!("{message}");
            events.emit(TunerEvent::ConfigWarning { message });
        }

        let store = Arc::new(ResultStore::new());
        let (selector_actor, selector) =
            create_selector_actor(config.clone(), store.clone(), events.clone());
        tokio::spawn(selector_actor.run());

        let mut coordinators = Vec::with_capacity(config.coordinator_count);
        for _ in 0..config.coordinator_count {
            let pool = WorkerPool::new(factory, config.worker_count).await?;
            let (actor, handle) = create_coordinator_actor(
                config.clone(),
                store.clone(),
                evaluator.clone(),
                pool,
                events.clone(),
                selector.clone(),
            );
            tokio::spawn(actor.run());
            selector.register_coordinator(handle.clone()).await?;
            coordinators.push(handle);
        }
        info!(
            coordinators = coordinators.len(),
            workers_each = config.worker_count,
            "deployment started"
        );

        Ok(Self {
            selector,
            coordinators,
            store,
            events,
        })
    }

    /// Run one selection round and wait for its aggregated outcome.
    pub async fn select(
        &self,
        genomes: Vec<Genome>,
        instances: Vec<Instance>,
        generation: u64,
    ) -> Result<SelectionOutcome> {
        self.selector.select(genomes, instances, generation).await
    }

    pub fn selector(&self) -> &SelectorHandle {
        &self.selector
    }

    pub fn store(&self) -> &Arc<ResultStore> {
        &self.store
    }

    pub fn events(&self) -> &EventSink {
        &self.events
    }

    pub fn coordinator_count(&self) -> usize {
        self.coordinators.len()
    }

    /// Stop the selector and every coordinator. In-flight tournaments are
    /// aborted.
    pub async fn shutdown(&self) -> Result<()> {
        self.selector.shutdown().await
    }
}
