//! Shared harness for engine integration tests: a scripted target whose
//! runtime and failure behavior are driven by genome alleles.
#![allow(dead_code)]

use async_trait::async_trait;
use dashmap::DashMap;
use paramrace_core::{
    EngineConfig, EventSink, Genome, Instance, InstanceId, ParamValue, PenalizedRuntimeEvaluator,
    TunerEvent,
};
use paramrace_engine::{
    EngineError, LocalDeployment, Result, TargetAlgorithm, TargetFactory, TargetRun,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Factory for [`ScriptedTarget`]s. All targets share the run counter and
/// the per-pair failure ledger.
pub struct ScriptedFactory {
    runs: Arc<AtomicUsize>,
    attempts: Arc<DashMap<(u64, u64), i64>>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self {
            runs: Arc::new(AtomicUsize::new(0)),
            attempts: Arc::new(DashMap::new()),
        }
    }

    /// Total `run` invocations across every worker slot.
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TargetFactory for ScriptedFactory {
    async fn create(&self) -> Result<Box<dyn TargetAlgorithm>> {
        Ok(Box::new(ScriptedTarget {
            runs: self.runs.clone(),
            attempts: self.attempts.clone(),
        }))
    }
}

/// Target whose behavior is scripted by alleles:
///
/// - `factor` (Int): sleep `instance spec * factor` milliseconds, report
///   that figure as quality and runtime.
/// - `fail` (Int): fail this many times per (genome, instance) pair
///   before succeeding.
struct ScriptedTarget {
    runs: Arc<AtomicUsize>,
    attempts: Arc<DashMap<(u64, u64), i64>>,
}

#[async_trait]
impl TargetAlgorithm for ScriptedTarget {
    async fn run(
        &mut self,
        genome: &Genome,
        instance: &Instance,
        _budget: Duration,
    ) -> Result<TargetRun> {
        self.runs.fetch_add(1, Ordering::SeqCst);

        let scripted_failures = int_allele(genome, "fail").unwrap_or(0);
        if scripted_failures > 0 {
            let key = (genome.id().as_u64(), instance.id().as_u64());
            let mut attempts = self.attempts.entry(key).or_insert(0);
            if *attempts < scripted_failures {
                *attempts += 1;
                return Err(EngineError::TargetRun(format!(
                    "scripted failure {} of {}",
                    *attempts, scripted_failures
                )));
            }
        }

        let base: u64 = instance.spec().parse().unwrap_or(1);
        let factor = int_allele(genome, "factor").unwrap_or(1).max(1) as u64;
        let millis = base * factor;
        tokio::time::sleep(Duration::from_millis(millis)).await;
        Ok(TargetRun {
            quality: millis as f64,
            runtime: Some(Duration::from_millis(millis)),
        })
    }
}

fn int_allele(genome: &Genome, name: &str) -> Option<i64> {
    match genome.get(name) {
        Some(ParamValue::Int(value)) => Some(*value),
        _ => None,
    }
}

/// A genome with a distinguishing tag and a runtime factor.
pub fn tagged_genome(tag: i64, factor: i64) -> Genome {
    let mut alleles = BTreeMap::new();
    alleles.insert("tag".to_string(), ParamValue::Int(tag));
    alleles.insert("factor".to_string(), ParamValue::Int(factor));
    Genome::new(alleles)
}

/// A genome that fails `fail` times per pair before succeeding.
pub fn failing_genome(tag: i64, fail: i64) -> Genome {
    let mut genome = tagged_genome(tag, 1);
    genome.set("fail", ParamValue::Int(fail));
    genome
}

/// `n` distinct genomes, all with the same runtime factor.
pub fn population(n: usize, factor: i64) -> Vec<Genome> {
    (0..n).map(|i| tagged_genome(i as i64, factor)).collect()
}

/// Instances whose spec is their base runtime in milliseconds.
pub fn instances(bases: &[u64]) -> Vec<Instance> {
    bases
        .iter()
        .enumerate()
        .map(|(index, base)| Instance::new(InstanceId::new(index as u64), base.to_string()))
        .collect()
}

pub fn engine_config(
    coordinators: usize,
    workers: usize,
    tournament_size: usize,
    winner_percentage: f64,
    racing: bool,
) -> EngineConfig {
    EngineConfig {
        coordinator_count: coordinators,
        worker_count: workers,
        tournament_size,
        winner_percentage,
        racing_enabled: racing,
        cpu_timeout_ms: 5_000,
        retry_budget: 2,
    }
}

pub async fn start_deployment(config: EngineConfig, factory: &ScriptedFactory) -> LocalDeployment {
    start_deployment_with_events(config, factory, EventSink::default()).await
}

pub async fn start_deployment_with_events(
    config: EngineConfig,
    factory: &ScriptedFactory,
    events: EventSink,
) -> LocalDeployment {
    LocalDeployment::start(
        config,
        factory,
        Arc::new(PenalizedRuntimeEvaluator::default()),
        events,
    )
    .await
    .expect("deployment should start")
}

/// Collect every event emitted so far.
pub fn drain_events(rx: &mut broadcast::Receiver<TunerEvent>) -> Vec<TunerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
