//! Selection orchestrator actor.
//!
//! The selector is the single writer of the instance set and the single
//! entry point for selection rounds. Each round partitions the population
//! into capped mini-tournaments, deals them round-robin over the
//! registered coordinators, waits for every result and aggregates the
//! ranked winners. Requests that arrive mid-round queue in FIFO order.

use crate::coordinator::{CoordinatorHandle, CoordinatorId};
use crate::messages::{InstanceUpdate, PollReply, SelectionOutcome, SelectorRequest};
use crate::store::ResultStore;
use crate::{EngineError, Result};
use futures::future::try_join_all;
use paramrace_core::{
    EngineConfig, EventSink, Genome, Instance, InstanceSet, MiniTournament, MiniTournamentResult,
    TunerEvent,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Instances are pushed in batches of this many per `Add`.
const INSTANCE_BATCH: usize = 64;

/// Backoff between polls while a coordinator finishes its previous
/// tournament or catches up on the instance set.
const POLL_RETRY_DELAY: Duration = Duration::from_millis(5);
const POLL_ATTEMPTS: usize = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectorState {
    /// No coordinator registered yet; requests queue.
    AwaitingWorkerPool,
    Ready,
    /// A round is in flight; new requests queue behind it.
    Working,
}

struct PendingSelect {
    genomes: Vec<Genome>,
    instances: Vec<Instance>,
    generation: u64,
    reply: oneshot::Sender<Result<SelectionOutcome>>,
}

/// Selector actor owning the instance set and the round queue.
pub struct SelectorActor {
    config: EngineConfig,
    store: Arc<ResultStore>,
    events: EventSink,
    state: SelectorState,
    coordinators: Vec<CoordinatorHandle>,
    current_set: InstanceSet,
    next_set_version: u64,
    next_tournament_id: u64,
    queued: VecDeque<PendingSelect>,
    active_reply: Option<oneshot::Sender<Result<SelectionOutcome>>>,
    round: Option<tokio::task::JoinHandle<()>>,
    inbox: mpsc::Receiver<SelectorRequest>,
    self_tx: mpsc::Sender<SelectorRequest>,
}

impl SelectorActor {
    /// Message loop. Exits on `Shutdown` or after a fatal round error.
    pub async fn run(mut self) {
        while let Some(request) = self.inbox.recv().await {
            match request {
                SelectorRequest::RegisterCoordinator { handle } => {
                    debug!(coordinator = %handle.id(), "coordinator registered");
                    self.coordinators.push(handle);
                    if self.state == SelectorState::AwaitingWorkerPool {
                        self.state = SelectorState::Ready;
                        self.start_next_round();
                    }
                }
                SelectorRequest::Select {
                    genomes,
                    instances,
                    generation,
                    reply,
                } => {
                    self.queued.push_back(PendingSelect {
                        genomes,
                        instances,
                        generation,
                        reply,
                    });
                    self.start_next_round();
                }
                SelectorRequest::InstancesRequest { coordinator } => {
                    self.push_instances(coordinator);
                }
                SelectorRequest::RoundFinished(result) => {
                    if !self.finish_round(*result).await {
                        break;
                    }
                }
                SelectorRequest::Shutdown => {
                    self.stop(EngineError::RoundCancelled(
                        "selector shut down".to_string(),
                    ))
                    .await;
                    break;
                }
            }
        }
        debug!("selector stopped");
    }

    /// Pop the next queued request if nothing is in flight.
    fn start_next_round(&mut self) {
        if self.state != SelectorState::Ready || self.round.is_some() {
            return;
        }
        let pending = match self.queued.pop_front() {
            Some(pending) => pending,
            None => return,
        };
        self.refresh_instance_set(&pending.instances);

        let count = pending
            .genomes
            .len()
            .div_ceil(self.config.tournament_size.max(1));
        let mut tournaments = Vec::with_capacity(count);
        for genomes in partition_genomes(pending.genomes, self.config.tournament_size) {
            let id = self.next_tournament_id;
            self.next_tournament_id += 1;
            tournaments.push(MiniTournament::new(id, genomes));
        }
        info!(
            generation = pending.generation,
            tournaments = tournaments.len(),
            coordinators = self.coordinators.len(),
            set_version = self.current_set.version(),
            "selection round started"
        );

        self.state = SelectorState::Working;
        self.active_reply = Some(pending.reply);
        let round = RoundTask {
            coordinators: self.coordinators.clone(),
            set_version: self.current_set.version(),
            tournaments,
            generation: pending.generation,
        };
        let self_tx = self.self_tx.clone();
        self.round = Some(tokio::spawn(async move {
            let result = round.execute().await;
            let _ = self_tx
                .send(SelectorRequest::RoundFinished(Box::new(result)))
                .await;
        }));
    }

    /// Adopt the round's instance list. A changed list bumps the set
    /// version and drops every stored result, since results are only
    /// comparable within one instance set.
    fn refresh_instance_set(&mut self, instances: &[Instance]) {
        let had_set = self.current_set.version() != 0;
        if had_set && self.current_set.same_instances(instances) {
            return;
        }
        self.next_set_version += 1;
        self.current_set = InstanceSet::new(self.next_set_version, instances.to_vec());
        if had_set {
            let store_version = self.store.invalidate();
            info!(
                set_version = self.current_set.version(),
                instances = instances.len(),
                "instance set changed, result store invalidated"
            );
            self.events.emit(TunerEvent::StoreInvalidated {
                version: store_version,
            });
        } else {
            info!(
                set_version = self.current_set.version(),
                instances = instances.len(),
                "instance set adopted"
            );
        }
    }

    /// Answer a coordinator's instance request with the full handshake.
    /// Runs in a task of its own so a slow coordinator cannot stall the
    /// selector loop.
    fn push_instances(&self, coordinator: CoordinatorId) {
        let handle = match self.coordinators.iter().find(|h| h.id() == coordinator) {
            Some(handle) => handle.clone(),
            None => {
                warn!(%coordinator, "instance request from unknown coordinator");
                return;
            }
        };
        let set = self.current_set.clone();
        debug!(%coordinator, version = set.version(), "pushing instance set");
        tokio::spawn(async move {
            let expected = set.len();
            let _ = handle
                .sync(InstanceUpdate::Clear {
                    version: set.version(),
                })
                .await;
            for batch in set.instances().chunks(INSTANCE_BATCH) {
                let _ = handle.sync(InstanceUpdate::Add(batch.to_vec())).await;
            }
            let _ = handle.sync(InstanceUpdate::Finished { expected }).await;
        });
    }

    /// Deliver a round result. Returns false when the actor must stop.
    async fn finish_round(&mut self, result: Result<SelectionOutcome>) -> bool {
        self.round = None;
        match result {
            Ok(outcome) => {
                info!(
                    generation = outcome.generation,
                    winners = outcome.winners.len(),
                    "selection round finished"
                );
                if let Some(reply) = self.active_reply.take() {
                    let _ = reply.send(Ok(outcome));
                }
                self.state = SelectorState::Ready;
                self.start_next_round();
                true
            }
            Err(fatal) => {
                error!(error = %fatal, "selection round failed, shutting the deployment down");
                self.stop(fatal).await;
                false
            }
        }
    }

    /// Tear everything down and fail every waiting caller.
    async fn stop(&mut self, fatal: EngineError) {
        if let Some(round) = self.round.take() {
            round.abort();
        }
        for coordinator in &self.coordinators {
            let _ = coordinator.shutdown().await;
        }
        if let Some(reply) = self.active_reply.take() {
            let _ = reply.send(Err(fatal));
        } else {
            debug!(error = %fatal, "selector stopping");
        }
        while let Some(pending) = self.queued.pop_front() {
            let _ = pending.reply.send(Err(EngineError::RoundCancelled(
                "deployment is shutting down".to_string(),
            )));
        }
    }
}

/// One selection round, driven outside the actor loop.
struct RoundTask {
    coordinators: Vec<CoordinatorHandle>,
    set_version: u64,
    tournaments: Vec<MiniTournament>,
    generation: u64,
}

impl RoundTask {
    async fn execute(&self) -> Result<SelectionOutcome> {
        if self.coordinators.is_empty() {
            return Err(EngineError::RoundCancelled(
                "no coordinators registered".to_string(),
            ));
        }

        let mut shares: Vec<Vec<MiniTournament>> = vec![Vec::new(); self.coordinators.len()];
        for (index, tournament) in self.tournaments.iter().cloned().enumerate() {
            shares[index % self.coordinators.len()].push(tournament);
        }

        let drivers = self
            .coordinators
            .iter()
            .zip(shares)
            .map(|(coordinator, share)| run_share(coordinator.clone(), share, self.set_version));
        let mut results: Vec<MiniTournamentResult> =
            try_join_all(drivers).await?.into_iter().flatten().collect();
        results.sort_by_key(|result| result.tournament_id);

        let winners = results
            .iter()
            .flat_map(|result| result.winners().iter().cloned())
            .collect();
        Ok(SelectionOutcome {
            generation: self.generation,
            winners,
            tournaments: results,
        })
    }
}

/// Run one coordinator's share of the round, one tournament after another.
async fn run_share(
    coordinator: CoordinatorHandle,
    share: Vec<MiniTournament>,
    set_version: u64,
) -> Result<Vec<MiniTournamentResult>> {
    let mut results = Vec::with_capacity(share.len());
    for tournament in share {
        wait_until_ready(&coordinator, set_version).await?;
        results.push(coordinator.run_tournament(tournament).await?);
    }
    Ok(results)
}

/// Poll until the coordinator accepts work on `set_version`.
async fn wait_until_ready(coordinator: &CoordinatorHandle, set_version: u64) -> Result<()> {
    for _ in 0..POLL_ATTEMPTS {
        match coordinator.poll(set_version).await? {
            PollReply::Accept => return Ok(()),
            PollReply::Decline => tokio::time::sleep(POLL_RETRY_DELAY).await,
        }
    }
    Err(EngineError::RoundCancelled(format!(
        "coordinator {} never became ready for set version {set_version}",
        coordinator.id()
    )))
}

/// Split a population into the smallest number of tournaments that
/// respects `max_size`, with sizes differing by at most one.
fn partition_genomes(genomes: Vec<Genome>, max_size: usize) -> Vec<Vec<Genome>> {
    if genomes.is_empty() {
        return Vec::new();
    }
    let count = genomes.len().div_ceil(max_size.max(1));
    let base = genomes.len() / count;
    let extra = genomes.len() % count;
    let mut groups = Vec::with_capacity(count);
    let mut rest = genomes.into_iter();
    for index in 0..count {
        let size = base + usize::from(index < extra);
        groups.push(rest.by_ref().take(size).collect());
    }
    groups
}

/// Build a selector actor and its handle. The actor must be spawned by
/// the caller.
pub fn create_selector_actor(
    config: EngineConfig,
    store: Arc<ResultStore>,
    events: EventSink,
) -> (SelectorActor, SelectorHandle) {
    let (tx, rx) = mpsc::channel(64);
    let actor = SelectorActor {
        config,
        store,
        events,
        state: SelectorState::AwaitingWorkerPool,
        coordinators: Vec::new(),
        current_set: InstanceSet::new(0, Vec::new()),
        next_set_version: 0,
        next_tournament_id: 1,
        queued: VecDeque::new(),
        active_reply: None,
        round: None,
        inbox: rx,
        self_tx: tx.clone(),
    };
    (actor, SelectorHandle { sender: tx })
}

/// Cheap-to-clone handle for talking to the selector.
#[derive(Debug, Clone)]
pub struct SelectorHandle {
    sender: mpsc::Sender<SelectorRequest>,
}

impl SelectorHandle {
    #[cfg(test)]
    pub(crate) fn from_sender(sender: mpsc::Sender<SelectorRequest>) -> Self {
        Self { sender }
    }

    pub async fn register_coordinator(&self, handle: CoordinatorHandle) -> Result<()> {
        self.sender
            .send(SelectorRequest::RegisterCoordinator { handle })
            .await
            .map_err(|_| EngineError::ActorUnavailable("selector"))
    }

    /// Run one selection round over `genomes` on `instances` and wait for
    /// the aggregated outcome.
    pub async fn select(
        &self,
        genomes: Vec<Genome>,
        instances: Vec<Instance>,
        generation: u64,
    ) -> Result<SelectionOutcome> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SelectorRequest::Select {
                genomes,
                instances,
                generation,
                reply: tx,
            })
            .await
            .map_err(|_| EngineError::ActorUnavailable("selector"))?;
        rx.await
            .map_err(|_| EngineError::ActorUnavailable("selector"))?
    }

    pub(crate) async fn request_instances(&self, coordinator: CoordinatorId) -> Result<()> {
        self.sender
            .send(SelectorRequest::InstancesRequest { coordinator })
            .await
            .map_err(|_| EngineError::ActorUnavailable("selector"))
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(SelectorRequest::Shutdown)
            .await
            .map_err(|_| EngineError::ActorUnavailable("selector"))
    }
}
