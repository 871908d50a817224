//! Typed message protocol between the selector and its coordinators.
//!
//! The protocol is transport-agnostic: every interaction is a plain enum
//! carried over a channel today, and would map onto an RPC layer
//! unchanged if coordinators moved to remote processes.

use crate::coordinator::{CoordinatorHandle, CoordinatorId};
use crate::Result;
use paramrace_core::{Genome, Instance, MiniTournament, MiniTournamentResult, RankedGenome};
use tokio::sync::oneshot;

/// Answer to a [`CoordinatorRequest::Poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollReply {
    /// Ready for a tournament on the polled instance-set version.
    Accept,
    /// Not ready; the poller should try again later.
    Decline,
}

/// One step of the instance synchronization handshake.
///
/// A well-formed sequence is `Clear`, any number of `Add` batches, then
/// `Finished` carrying the announced total. Anything else is rejected by
/// the receiver, which discards its partial set and re-requests.
#[derive(Debug, Clone, PartialEq)]
pub enum InstanceUpdate {
    /// Discard the active set and start accumulating a new one under the
    /// given version.
    Clear { version: u64 },
    /// Append a batch to the set under construction.
    Add(Vec<Instance>),
    /// Commit the accumulated set; `expected` is the announced total
    /// instance count.
    Finished { expected: usize },
}

/// Inbox protocol of a tournament coordinator.
#[derive(Debug)]
pub enum CoordinatorRequest {
    /// Ask whether the coordinator can take a tournament evaluated on
    /// instance-set version `set_version`.
    Poll {
        set_version: u64,
        reply: oneshot::Sender<PollReply>,
    },
    /// One step of the instance handshake.
    SyncInstances(InstanceUpdate),
    /// Run a tournament to completion. Accepted only while ready; never
    /// pipelined.
    RunTournament {
        tournament: MiniTournament,
        reply: oneshot::Sender<Result<MiniTournamentResult>>,
    },
    /// Internal: the spawned tournament session finished.
    SessionFinished { tournament_id: u64, failed: bool },
    /// Stop the actor, aborting any in-flight session.
    Shutdown,
}

/// Inbox protocol of the tournament selector.
#[derive(Debug)]
pub enum SelectorRequest {
    /// A coordinator joined the worker pool.
    RegisterCoordinator { handle: CoordinatorHandle },
    /// Run one selection round over the generation's competitive pool.
    Select {
        genomes: Vec<Genome>,
        instances: Vec<Instance>,
        generation: u64,
        reply: oneshot::Sender<Result<SelectionOutcome>>,
    },
    /// A coordinator needs the current instance set.
    InstancesRequest { coordinator: CoordinatorId },
    /// Internal: the spawned round task finished.
    RoundFinished(Box<Result<SelectionOutcome>>),
    /// Stop the actor and every registered coordinator.
    Shutdown,
}

/// Aggregated outcome of one selection round.
#[derive(Debug, Clone)]
pub struct SelectionOutcome {
    pub generation: u64,
    /// Winner lists concatenated in tournament order, each tournament's
    /// internal ranking preserved. Scores are not comparable across
    /// tournaments and are never re-ranked globally.
    pub winners: Vec<RankedGenome>,
    pub tournaments: Vec<MiniTournamentResult>,
}

impl SelectionOutcome {
    pub fn winner_genomes(&self) -> Vec<Genome> {
        self.winners.iter().map(|w| w.genome.clone()).collect()
    }

    /// The best-scoring winner of the round, if any tournament reported
    /// one.
    pub fn best(&self) -> Option<&RankedGenome> {
        self.winners
            .iter()
            .min_by(|a, b| a.score.total_cmp(&b.score))
    }
}
