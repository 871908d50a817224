//! Evaluation results, tournaments and the ranking order over them.

use crate::genome::Genome;
use crate::instance::InstanceId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// What one target run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RunOutcome {
    /// The target completed and reported a quality value (lower is better).
    Finished { quality: f64 },
    /// The target exceeded the CPU time limit.
    TimedOut,
    /// The target failed terminally on this pair.
    Failed,
}

/// Immutable outcome of one (genome, instance) evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalResult {
    outcome: RunOutcome,
    runtime: Duration,
}

impl EvalResult {
    pub fn finished(quality: f64, runtime: Duration) -> Self {
        Self {
            outcome: RunOutcome::Finished { quality },
            runtime,
        }
    }

    /// A run cut off at the CPU limit; the limit itself is recorded as the
    /// runtime so penalized scoring stays comparable.
    pub fn timed_out(limit: Duration) -> Self {
        Self {
            outcome: RunOutcome::TimedOut,
            runtime: limit,
        }
    }

    pub fn failed(runtime: Duration) -> Self {
        Self {
            outcome: RunOutcome::Failed,
            runtime,
        }
    }

    pub fn outcome(&self) -> &RunOutcome {
        &self.outcome
    }

    pub fn runtime(&self) -> Duration {
        self.runtime
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.outcome, RunOutcome::Finished { .. })
    }

    pub fn quality(&self) -> Option<f64> {
        match self.outcome {
            RunOutcome::Finished { quality } => Some(quality),
            _ => None,
        }
    }
}

/// A genome's per-instance result set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenomeResults {
    results: BTreeMap<InstanceId, EvalResult>,
}

impl GenomeResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, instance: InstanceId, result: EvalResult) {
        self.results.insert(instance, result);
    }

    pub fn get(&self, instance: InstanceId) -> Option<&EvalResult> {
        self.results.get(&instance)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&InstanceId, &EvalResult)> {
        self.results.iter()
    }

    /// Total runtime across all recorded results. This is the genome's
    /// completion time for racing purposes.
    pub fn total_runtime(&self) -> Duration {
        self.results.values().map(|r| r.runtime()).sum()
    }
}

/// A bounded subset of genomes evaluated together.
#[derive(Debug, Clone, PartialEq)]
pub struct MiniTournament {
    pub id: u64,
    pub genomes: Vec<Genome>,
}

impl MiniTournament {
    pub fn new(id: u64, genomes: Vec<Genome>) -> Self {
        Self { id, genomes }
    }

    pub fn size(&self) -> usize {
        self.genomes.len()
    }
}

/// One finished genome with its ranking score and complete result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedGenome {
    pub genome: Genome,
    pub score: f64,
    pub results: GenomeResults,
}

/// Outcome of one mini-tournament: the best-first ranking of every genome
/// that finished, the size of the winner prefix and the genomes cut off by
/// racing.
#[derive(Debug, Clone, PartialEq)]
pub struct MiniTournamentResult {
    pub tournament_id: u64,
    pub ranking: Vec<RankedGenome>,
    pub winner_count: usize,
    pub cancelled: Vec<Genome>,
}

impl MiniTournamentResult {
    /// The winning prefix of the ranking.
    pub fn winners(&self) -> &[RankedGenome] {
        &self.ranking[..self.winner_count]
    }
}

/// Total order over genomes' result sets. Lower scores rank better; ties
/// are broken by the caller's sort stability.
pub trait RunEvaluator: Send + Sync {
    /// Scalar ranking key for a (possibly partial) result set.
    fn score(&self, results: &GenomeResults) -> f64;

    fn name(&self) -> &'static str {
        "evaluator"
    }
}

/// Penalized average runtime, the standard objective for runtime tuning:
/// finished runs count their runtime, timed-out runs count the limit times
/// a penalty factor, and a terminal failure dominates everything.
#[derive(Debug, Clone)]
pub struct PenalizedRuntimeEvaluator {
    timeout_penalty: f64,
}

impl PenalizedRuntimeEvaluator {
    pub fn new(timeout_penalty: f64) -> Self {
        Self { timeout_penalty }
    }
}

impl Default for PenalizedRuntimeEvaluator {
    fn default() -> Self {
        Self::new(10.0)
    }
}

impl RunEvaluator for PenalizedRuntimeEvaluator {
    fn score(&self, results: &GenomeResults) -> f64 {
        if results.is_empty() {
            return f64::INFINITY;
        }
        let mut total = 0.0;
        for (_, result) in results.iter() {
            total += match result.outcome() {
                RunOutcome::Finished { .. } => result.runtime().as_secs_f64(),
                RunOutcome::TimedOut => result.runtime().as_secs_f64() * self.timeout_penalty,
                RunOutcome::Failed => return f64::INFINITY,
            };
        }
        total / results.len() as f64
    }

    fn name(&self) -> &'static str {
        "penalized-runtime"
    }
}

/// Mean reported quality, for tuning toward solution quality instead of
/// speed. Timeouts and failures dominate every finished run.
#[derive(Debug, Clone, Default)]
pub struct MeanQualityEvaluator;

impl RunEvaluator for MeanQualityEvaluator {
    fn score(&self, results: &GenomeResults) -> f64 {
        if results.is_empty() {
            return f64::INFINITY;
        }
        let mut total = 0.0;
        for (_, result) in results.iter() {
            match result.quality() {
                Some(q) => total += q,
                None => return f64::INFINITY,
            }
        }
        total / results.len() as f64
    }

    fn name(&self) -> &'static str {
        "mean-quality"
    }
}
