//! Mini-tournament coordinator actor.
//!
//! A coordinator cycles `AwaitingInstances → Ready → Evaluating → Ready`.
//! It owns a worker pool and, one at a time, evaluates tournaments handed
//! over by the selector: one run per (genome, instance) pair, bounded by
//! the pool, with stored results replayed instead of recomputed and the
//! racing bound cutting off genomes that can no longer win.
//!
//! The actor loop itself never blocks on evaluation. A tournament runs in
//! a spawned session task, so polls and instance handshakes are answered
//! immediately even mid-tournament.

use crate::messages::{CoordinatorRequest, InstanceUpdate, PollReply};
use crate::racing::{race_expired, run_budget, RaceSignal, RacingState};
use crate::selector::SelectorHandle;
use crate::store::ResultStore;
use crate::sync::{InstanceSync, SyncOutcome};
use crate::worker::WorkerPool;
use crate::{EngineError, Result};
use dashmap::{DashMap, DashSet};
use paramrace_core::{
    EngineConfig, EvalResult, EventSink, Genome, GenomeId, Instance, InstanceId, InstanceSet,
    MiniTournament, MiniTournamentResult, RankedGenome, RunEvaluator, TunerEvent,
};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Identity of one coordinator within a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoordinatorId(Uuid);

impl CoordinatorId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for CoordinatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CoordinatorState {
    AwaitingInstances,
    Ready,
    Evaluating,
}

/// Coordinator actor owning all of its mutable state.
pub struct CoordinatorActor {
    id: CoordinatorId,
    state: CoordinatorState,
    sync: InstanceSync,
    config: EngineConfig,
    store: Arc<ResultStore>,
    evaluator: Arc<dyn RunEvaluator>,
    pool: WorkerPool,
    events: EventSink,
    selector: SelectorHandle,
    inbox: mpsc::Receiver<CoordinatorRequest>,
    self_tx: mpsc::Sender<CoordinatorRequest>,
    session: Option<tokio::task::JoinHandle<()>>,
}

impl CoordinatorActor {
    /// Message loop. Runs until `Shutdown` or until every handle is gone.
    pub async fn run(mut self) {
        while let Some(request) = self.inbox.recv().await {
            match request {
                CoordinatorRequest::Poll { set_version, reply } => {
                    let answer = self.handle_poll(set_version).await;
                    let _ = reply.send(answer);
                }
                CoordinatorRequest::SyncInstances(update) => {
                    self.handle_sync(update).await;
                }
                CoordinatorRequest::RunTournament { tournament, reply } => {
                    self.handle_run(tournament, reply);
                }
                CoordinatorRequest::SessionFinished {
                    tournament_id,
                    failed,
                } => {
                    self.session = None;
                    self.state = if self.sync.committed().is_some() {
                        CoordinatorState::Ready
                    } else {
                        CoordinatorState::AwaitingInstances
                    };
                    if failed {
                        warn!(coordinator = %self.id, tournament = tournament_id, "tournament session failed");
                    } else {
                        debug!(coordinator = %self.id, tournament = tournament_id, "tournament session finished");
                    }
                }
                CoordinatorRequest::Shutdown => break,
            }
        }
        if let Some(session) = self.session.take() {
            session.abort();
        }
        debug!(coordinator = %self.id, "coordinator stopped");
    }

    async fn handle_poll(&mut self, set_version: u64) -> PollReply {
        match self.state {
            CoordinatorState::Ready => match self.sync.committed() {
                Some(set) if set.version() == set_version => PollReply::Accept,
                _ => {
                    // The poller evaluates on a set we do not hold yet.
                    self.state = CoordinatorState::AwaitingInstances;
                    self.request_instances().await;
                    PollReply::Decline
                }
            },
            CoordinatorState::AwaitingInstances => {
                self.request_instances().await;
                PollReply::Decline
            }
            CoordinatorState::Evaluating => PollReply::Decline,
        }
    }

    async fn handle_sync(&mut self, update: InstanceUpdate) {
        match self.sync.apply(update) {
            SyncOutcome::Accumulating => {}
            SyncOutcome::Committed(set) => {
                info!(
                    coordinator = %self.id,
                    version = set.version(),
                    instances = set.len(),
                    "instance set committed"
                );
                self.events.emit(TunerEvent::InstanceSetCommitted {
                    version: set.version(),
                    count: set.len(),
                });
                if self.state == CoordinatorState::AwaitingInstances {
                    self.state = CoordinatorState::Ready;
                }
            }
            SyncOutcome::Rejected(rejection) => {
                warn!(coordinator = %self.id, %rejection, "instance handshake rejected");
                self.events.emit(TunerEvent::InstanceSyncRejected {
                    reason: rejection.to_string(),
                });
                if self.state != CoordinatorState::Evaluating {
                    self.state = CoordinatorState::AwaitingInstances;
                }
                // One fresh request per rejection; the source re-pushes the
                // whole set.
                self.request_instances().await;
            }
        }
    }

    fn handle_run(
        &mut self,
        tournament: MiniTournament,
        reply: oneshot::Sender<Result<MiniTournamentResult>>,
    ) {
        if self.state != CoordinatorState::Ready {
            let _ = reply.send(Err(EngineError::CoordinatorBusy));
            return;
        }
        let instances = match self.sync.committed() {
            Some(set) => set.clone(),
            None => {
                let _ = reply.send(Err(EngineError::CoordinatorBusy));
                return;
            }
        };

        let tournament_id = tournament.id;
        let session = TournamentSession {
            tournament,
            instances,
            config: self.config.clone(),
            store: self.store.clone(),
            evaluator: self.evaluator.clone(),
            pool: self.pool.clone(),
            events: self.events.clone(),
        };
        let self_tx = self.self_tx.clone();
        self.state = CoordinatorState::Evaluating;
        self.session = Some(tokio::spawn(async move {
            let result = session.run().await;
            let failed = result.is_err();
            let _ = reply.send(result);
            let _ = self_tx
                .send(CoordinatorRequest::SessionFinished {
                    tournament_id,
                    failed,
                })
                .await;
        }));
    }

    async fn request_instances(&self) {
        let _ = self.selector.request_instances(self.id).await;
    }
}

/// Build a coordinator actor and its handle. The actor must be spawned by
/// the caller.
pub fn create_coordinator_actor(
    config: EngineConfig,
    store: Arc<ResultStore>,
    evaluator: Arc<dyn RunEvaluator>,
    pool: WorkerPool,
    events: EventSink,
    selector: SelectorHandle,
) -> (CoordinatorActor, CoordinatorHandle) {
    let (tx, rx) = mpsc::channel(32);
    let id = CoordinatorId::new();
    let actor = CoordinatorActor {
        id,
        state: CoordinatorState::AwaitingInstances,
        sync: InstanceSync::new(),
        config,
        store,
        evaluator,
        pool,
        events,
        selector,
        inbox: rx,
        self_tx: tx.clone(),
        session: None,
    };
    let handle = CoordinatorHandle { id, sender: tx };
    (actor, handle)
}

/// Cheap-to-clone handle for talking to a coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    id: CoordinatorId,
    sender: mpsc::Sender<CoordinatorRequest>,
}

impl CoordinatorHandle {
    pub fn id(&self) -> CoordinatorId {
        self.id
    }

    /// Ask whether the coordinator can take a tournament on instance-set
    /// version `set_version`.
    pub async fn poll(&self, set_version: u64) -> Result<PollReply> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(CoordinatorRequest::Poll {
                set_version,
                reply: tx,
            })
            .await
            .map_err(|_| EngineError::ActorUnavailable("coordinator"))?;
        rx.await
            .map_err(|_| EngineError::ActorUnavailable("coordinator"))
    }

    /// Push one handshake step.
    pub async fn sync(&self, update: InstanceUpdate) -> Result<()> {
        self.sender
            .send(CoordinatorRequest::SyncInstances(update))
            .await
            .map_err(|_| EngineError::ActorUnavailable("coordinator"))
    }

    /// Run one tournament to completion.
    pub async fn run_tournament(&self, tournament: MiniTournament) -> Result<MiniTournamentResult> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(CoordinatorRequest::RunTournament {
                tournament,
                reply: tx,
            })
            .await
            .map_err(|_| EngineError::ActorUnavailable("coordinator"))?;
        rx.await
            .map_err(|_| EngineError::ActorUnavailable("coordinator"))?
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(CoordinatorRequest::Shutdown)
            .await
            .map_err(|_| EngineError::ActorUnavailable("coordinator"))
    }
}

/// One tournament evaluated to completion inside a spawned task.
struct TournamentSession {
    tournament: MiniTournament,
    instances: InstanceSet,
    config: EngineConfig,
    store: Arc<ResultStore>,
    evaluator: Arc<dyn RunEvaluator>,
    pool: WorkerPool,
    events: EventSink,
}

/// Final word of one evaluation task.
#[derive(Debug)]
enum RunVerdict {
    /// A result landed in the store.
    Stored { genome: GenomeId, result: EvalResult },
    /// The genome ran out of racing allowance; nothing was stored.
    Raced { genome: GenomeId },
    /// The pair was not evaluated (genome already abandoned).
    Skipped,
    /// The retry budget is exhausted; the deployment must come down.
    Fatal {
        genome: GenomeId,
        instance: InstanceId,
        failures: u32,
    },
}

/// Everything an evaluation task needs, cloneable per pair.
#[derive(Clone)]
struct RunContext {
    pool: WorkerPool,
    store: Arc<ResultStore>,
    events: EventSink,
    spent: Arc<DashMap<GenomeId, Duration>>,
    abandoned: Arc<DashSet<GenomeId>>,
    bound_rx: watch::Receiver<Option<Duration>>,
    cpu_timeout: Duration,
    retry_budget: u32,
}

impl TournamentSession {
    async fn run(self) -> Result<MiniTournamentResult> {
        let tournament_id = self.tournament.id;
        let size = self.tournament.size();
        let winner_count = self.config.winner_count(size);
        let cpu_timeout = self.config.cpu_timeout();

        info!(
            tournament = tournament_id,
            genomes = size,
            instances = self.instances.len(),
            racing = self.config.racing_enabled,
            "tournament started"
        );
        self.events.emit(TunerEvent::TournamentStarted {
            tournament: tournament_id,
            genomes: size,
            instances: self.instances.len(),
        });

        let mut racing = RacingState::new(self.config.racing_enabled, winner_count);
        let (bound_tx, bound_rx) = watch::channel(None::<Duration>);
        let spent: Arc<DashMap<GenomeId, Duration>> = Arc::new(DashMap::new());
        let abandoned: Arc<DashSet<GenomeId>> = Arc::new(DashSet::new());
        // Instances still missing a stored result, per distinct genome.
        let mut remaining: HashMap<GenomeId, usize> = HashMap::new();
        let mut jobs: Vec<(Genome, Instance)> = Vec::new();

        // Replay the store before dispatching anything. A genome fully
        // covered by stored results finishes right here and feeds the
        // racing bound like any other finisher.
        for genome in &self.tournament.genomes {
            let gid = genome.id();
            if remaining.contains_key(&gid) {
                // Value-equal duplicate; evaluated once, ranked per copy.
                continue;
            }
            spent.insert(gid, Duration::ZERO);
            let mut missing = 0usize;
            for instance in self.instances.iter() {
                match self.store.get(gid, instance.id()) {
                    Some(hit) => add_runtime(&spent, gid, hit.runtime()),
                    None => {
                        missing += 1;
                        jobs.push((genome.clone(), instance.clone()));
                    }
                }
            }
            remaining.insert(gid, missing);
            if missing == 0 {
                let completion = total_spent(&spent, gid);
                debug!(tournament = tournament_id, genome = %gid, "genome served entirely from the store");
                self.events.emit(TunerEvent::GenomeFinished {
                    tournament: tournament_id,
                    genome: gid.to_string(),
                    completion_ms: completion.as_millis() as u64,
                });
                if let Some(bound) = racing.record_finished(completion) {
                    let _ = bound_tx.send(Some(bound));
                    self.events.emit(TunerEvent::RacingBoundSet {
                        tournament: tournament_id,
                        bound_ms: bound.as_millis() as u64,
                    });
                }
            }
        }

        let total_jobs = jobs.len();
        let (verdict_tx, mut verdict_rx) = mpsc::channel(total_jobs.max(1));
        let mut handles = Vec::with_capacity(total_jobs);
        for (genome, instance) in jobs {
            let ctx = RunContext {
                pool: self.pool.clone(),
                store: self.store.clone(),
                events: self.events.clone(),
                spent: spent.clone(),
                abandoned: abandoned.clone(),
                bound_rx: bound_rx.clone(),
                cpu_timeout,
                retry_budget: self.config.retry_budget,
            };
            let tx = verdict_tx.clone();
            handles.push(tokio::spawn(async move {
                let verdict = evaluate_pair(ctx, genome, instance).await;
                let _ = tx.send(verdict).await;
            }));
        }
        drop(verdict_tx);

        let mut received = 0usize;
        let mut announced_cancellations: HashSet<GenomeId> = HashSet::new();
        let mut fatal: Option<EngineError> = None;
        while received < total_jobs && fatal.is_none() {
            match verdict_rx.recv().await {
                Some(RunVerdict::Stored { genome, result }) => {
                    received += 1;
                    add_runtime(&spent, genome, result.runtime());
                    if let Some(missing) = remaining.get_mut(&genome) {
                        *missing = missing.saturating_sub(1);
                        if *missing == 0 && !abandoned.contains(&genome) {
                            let completion = total_spent(&spent, genome);
                            debug!(
                                tournament = tournament_id,
                                genome = %genome,
                                completion_ms = completion.as_millis() as u64,
                                "genome finished"
                            );
                            self.events.emit(TunerEvent::GenomeFinished {
                                tournament: tournament_id,
                                genome: genome.to_string(),
                                completion_ms: completion.as_millis() as u64,
                            });
                            if let Some(bound) = racing.record_finished(completion) {
                                let _ = bound_tx.send(Some(bound));
                                debug!(
                                    tournament = tournament_id,
                                    bound_ms = bound.as_millis() as u64,
                                    "racing bound tightened"
                                );
                                self.events.emit(TunerEvent::RacingBoundSet {
                                    tournament: tournament_id,
                                    bound_ms: bound.as_millis() as u64,
                                });
                            }
                        }
                    }
                }
                Some(RunVerdict::Raced { genome }) => {
                    received += 1;
                    if announced_cancellations.insert(genome) {
                        debug!(tournament = tournament_id, genome = %genome, "genome cut off by racing");
                        self.events.emit(TunerEvent::GenomeCancelled {
                            tournament: tournament_id,
                            genome: genome.to_string(),
                        });
                    }
                }
                Some(RunVerdict::Skipped) => {
                    received += 1;
                }
                Some(RunVerdict::Fatal {
                    genome,
                    instance,
                    failures,
                }) => {
                    fatal = Some(EngineError::EvaluationAborted {
                        genome,
                        instance,
                        failures,
                    });
                }
                None => {
                    fatal = Some(EngineError::RoundCancelled(
                        "evaluation tasks stopped unexpectedly".to_string(),
                    ));
                }
            }
        }

        if let Some(fatal) = fatal {
            for handle in &handles {
                handle.abort();
            }
            error!(tournament = tournament_id, error = %fatal, "tournament aborted");
            return Err(fatal);
        }

        // Rank every finished genome, best first. Duplicate copies share
        // the evaluation and rank adjacently.
        let mut scored: HashMap<GenomeId, RankedGenome> = HashMap::new();
        let mut ranking: Vec<RankedGenome> = Vec::new();
        let mut cancelled: Vec<Genome> = Vec::new();
        for genome in &self.tournament.genomes {
            let gid = genome.id();
            if abandoned.contains(&gid) {
                cancelled.push(genome.clone());
                continue;
            }
            if remaining.get(&gid).copied().unwrap_or(0) != 0 {
                continue;
            }
            let entry = scored.entry(gid).or_insert_with(|| {
                let results = self.store.results_for(gid, self.instances.instances());
                let score = self.evaluator.score(&results);
                RankedGenome {
                    genome: genome.clone(),
                    score,
                    results,
                }
            });
            ranking.push(entry.clone());
        }
        ranking.sort_by(|a, b| a.score.total_cmp(&b.score));

        info!(
            tournament = tournament_id,
            ranked = ranking.len(),
            winners = winner_count,
            cancelled = cancelled.len(),
            "tournament finished"
        );
        self.events.emit(TunerEvent::TournamentFinished {
            tournament: tournament_id,
            ranked: ranking.len(),
            cancelled: cancelled.len(),
        });

        Ok(MiniTournamentResult {
            tournament_id,
            ranking,
            winner_count,
            cancelled,
        })
    }
}

/// Outcome of one attempt within an evaluation.
enum Attempt {
    Completed(crate::worker::TargetRun),
    TimedOut,
    Raced,
    Failed(EngineError),
}

/// Evaluate one (genome, instance) pair: lease a worker slot, enforce the
/// CPU and racing limits, retry transient failures within the budget and
/// store whatever result the run produced.
async fn evaluate_pair(ctx: RunContext, genome: Genome, instance: Instance) -> RunVerdict {
    let gid = genome.id();
    if ctx.abandoned.contains(&gid) {
        return RunVerdict::Skipped;
    }
    let mut lease = match ctx.pool.lease().await {
        Ok(lease) => lease,
        Err(_) => return RunVerdict::Skipped,
    };
    // The genome may have been abandoned while we queued for a slot.
    if ctx.abandoned.contains(&gid) {
        return RunVerdict::Skipped;
    }

    let spent_before = total_spent(&ctx.spent, gid);
    let budget = run_budget(*ctx.bound_rx.borrow(), spent_before, ctx.cpu_timeout);
    let allowance = match budget.allowance() {
        Some(allowance) => allowance,
        None => {
            // Already spent the whole bound; the genome cannot win.
            ctx.abandoned.insert(gid);
            return RunVerdict::Raced { genome: gid };
        }
    };

    let mut failures = 0u32;
    loop {
        let started = Instant::now();
        let attempt = tokio::select! {
            run = tokio::time::timeout(ctx.cpu_timeout, lease.run(&genome, &instance, allowance)) => {
                match run {
                    Ok(Ok(run)) => Attempt::Completed(run),
                    Ok(Err(error)) => Attempt::Failed(error),
                    Err(_) => Attempt::TimedOut,
                }
            }
            signal = race_expired(ctx.bound_rx.clone(), spent_before, started) => {
                match signal {
                    RaceSignal::Expired => Attempt::Raced,
                    RaceSignal::Closed => return RunVerdict::Skipped,
                }
            }
        };

        match attempt {
            Attempt::Completed(run) => {
                let runtime = run.runtime.unwrap_or_else(|| started.elapsed());
                let result = EvalResult::finished(run.quality, runtime);
                ctx.store.put(gid, instance.id(), result.clone());
                return RunVerdict::Stored {
                    genome: gid,
                    result,
                };
            }
            Attempt::TimedOut => {
                let result = EvalResult::timed_out(ctx.cpu_timeout);
                ctx.store.put(gid, instance.id(), result.clone());
                return RunVerdict::Stored {
                    genome: gid,
                    result,
                };
            }
            Attempt::Raced => {
                ctx.abandoned.insert(gid);
                return RunVerdict::Raced { genome: gid };
            }
            Attempt::Failed(error) => {
                failures += 1;
                if failures > ctx.retry_budget {
                    error!(
                        genome = %gid,
                        instance = %instance.id(),
                        failures,
                        error = %error,
                        "evaluation exhausted its retry budget"
                    );
                    ctx.store
                        .put(gid, instance.id(), EvalResult::failed(started.elapsed()));
                    ctx.events.emit(TunerEvent::EvaluationAborted {
                        genome: gid.to_string(),
                        instance: instance.id().as_u64(),
                        failures,
                    });
                    return RunVerdict::Fatal {
                        genome: gid,
                        instance: instance.id(),
                        failures,
                    };
                }
                debug!(
                    genome = %gid,
                    instance = %instance.id(),
                    failures,
                    error = %error,
                    "target run failed, retrying"
                );
                ctx.events.emit(TunerEvent::RunRetried {
                    genome: gid.to_string(),
                    instance: instance.id().as_u64(),
                    failures,
                });
            }
        }
    }
}

fn add_runtime(spent: &DashMap<GenomeId, Duration>, genome: GenomeId, runtime: Duration) {
    *spent.entry(genome).or_insert(Duration::ZERO) += runtime;
}

fn total_spent(spent: &DashMap<GenomeId, Duration>, genome: GenomeId) -> Duration {
    spent
        .get(&genome)
        .map(|entry| *entry.value())
        .unwrap_or(Duration::ZERO)
}
