//! Mini-tournament evaluation engine.
//!
//! A generation's competitive pool is partitioned into bounded
//! mini-tournaments by the [`selector`], evaluated genome-by-instance over
//! a bounded [`worker`] pool by per-tournament [`coordinator`]s, with the
//! [`racing`] policy cutting off genomes that can no longer win. Results
//! are shared through the idempotent [`store`]; coordinators learn the
//! active instance set through the [`sync`] handshake.
//!
//! All components are single-threaded actors owning their state and
//! communicating over typed channels; the result store is the only shared
//! mutable resource.

use paramrace_core::{CoreError, GenomeId, InstanceId};
use thiserror::Error;

pub mod coordinator;
pub mod deploy;
pub mod messages;
pub mod racing;
pub mod selector;
pub mod store;
pub mod sync;
pub mod worker;

pub use coordinator::{create_coordinator_actor, CoordinatorHandle, CoordinatorId};
pub use deploy::LocalDeployment;
pub use messages::{InstanceUpdate, PollReply, SelectionOutcome};
pub use selector::{create_selector_actor, SelectorHandle};
pub use store::ResultStore;
pub use worker::{TargetAlgorithm, TargetFactory, TargetRun, WorkerPool};

#[derive(Error, Debug)]
pub enum EngineError {
    /// An evaluation exhausted its retry budget. Tears down the whole
    /// deployment.
    #[error("evaluation of {genome} on {instance} aborted after {failures} consecutive failures")]
    EvaluationAborted {
        genome: GenomeId,
        instance: InstanceId,
        failures: u32,
    },

    /// A single target run reported a failure. Transient; absorbed by the
    /// retry loop unless the budget is exhausted.
    #[error("target run failed: {0}")]
    TargetRun(String),

    #[error("coordinator cannot accept a tournament in its current state")]
    CoordinatorBusy,

    #[error("selection round cancelled: {0}")]
    RoundCancelled(String),

    #[error("{0} is no longer running")]
    ActorUnavailable(&'static str),

    #[error("worker pool closed")]
    PoolClosed,

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
