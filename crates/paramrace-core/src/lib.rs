//! Core data model for paramrace: genomes over a typed parameter space,
//! versioned instance sets, evaluation results with a pluggable ranking
//! order, tuner configuration and the structured event sink.
//!
//! Everything here is runtime-agnostic value types; the evaluation engine
//! lives in `paramrace-engine`.

pub mod config;
pub mod error;
pub mod events;
pub mod genome;
pub mod instance;
pub mod params;
pub mod result;

pub use config::{EngineConfig, GeneticsConfig, TunerConfig, TuningObjective};
pub use error::{CoreError, Result};
pub use events::{EventSink, TunerEvent};
pub use genome::{Genome, GenomeId};
pub use instance::{Instance, InstanceId, InstanceSet};
pub use params::{ParamDef, ParamDomain, ParamSpace, ParamValue};
pub use result::{
    EvalResult, GenomeResults, MeanQualityEvaluator, MiniTournament, MiniTournamentResult,
    PenalizedRuntimeEvaluator, RankedGenome, RunEvaluator, RunOutcome,
};
