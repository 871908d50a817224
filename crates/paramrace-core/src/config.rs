//! Tuner configuration.
//!
//! Durations are carried as integer milliseconds in the serialized form
//! with accessor methods returning `Duration`. Every struct has a working
//! `Default` and an explicit `validate()`; soft anomalies (for example a
//! worker count above the hardware parallelism) are runtime warnings, not
//! validation errors.

use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// What the run optimizes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TuningObjective {
    /// Minimize penalized runtime.
    #[default]
    Runtime,
    /// Minimize the quality value reported by the target.
    Quality,
}

/// Settings for the evaluation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of tournament coordinators the deployment spawns.
    pub coordinator_count: usize,
    /// Parallel target runs per coordinator.
    pub worker_count: usize,
    /// Maximum genomes per mini-tournament.
    pub tournament_size: usize,
    /// Fraction of a tournament that wins, in (0, 1].
    pub winner_percentage: f64,
    /// Whether racing cuts off clearly slower genomes.
    pub racing_enabled: bool,
    /// CPU time limit per target run, in milliseconds.
    pub cpu_timeout_ms: u64,
    /// Tolerated consecutive failures per evaluation before the run is
    /// declared unrecoverable.
    pub retry_budget: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            coordinator_count: 1,
            worker_count: 4,
            tournament_size: 8,
            winner_percentage: 0.125,
            racing_enabled: true,
            cpu_timeout_ms: 300_000,
            retry_budget: 2,
        }
    }
}

impl EngineConfig {
    pub fn cpu_timeout(&self) -> Duration {
        Duration::from_millis(self.cpu_timeout_ms)
    }

    /// Winners for a tournament of `size` genomes: the configured fraction
    /// rounded up, never below one.
    pub fn winner_count(&self, size: usize) -> usize {
        ((size as f64 * self.winner_percentage).ceil() as usize).max(1)
    }

    pub fn validate(&self) -> Result<()> {
        if self.coordinator_count == 0 {
            return Err(CoreError::Config(
                "coordinator_count must be at least 1".to_string(),
            ));
        }
        if self.worker_count == 0 {
            return Err(CoreError::Config(
                "worker_count must be at least 1".to_string(),
            ));
        }
        if self.tournament_size == 0 {
            return Err(CoreError::Config(
                "tournament_size must be at least 1".to_string(),
            ));
        }
        if !(self.winner_percentage > 0.0 && self.winner_percentage <= 1.0) {
            return Err(CoreError::Config(format!(
                "winner_percentage must be in (0, 1], got {}",
                self.winner_percentage
            )));
        }
        if self.cpu_timeout_ms == 0 {
            return Err(CoreError::Config(
                "cpu_timeout_ms must be positive".to_string(),
            ));
        }
        if self.racing_enabled && self.winner_percentage >= 1.0 {
            warn!(
                "racing is enabled but winner_percentage is 1: every genome must finish, so no run can be cut off"
            );
        }
        Ok(())
    }
}

/// Settings for population management and the genetic operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneticsConfig {
    /// Total genomes across both pools.
    pub population_size: usize,
    /// Share of the population in the competitive pool, in (0, 1).
    pub competitive_fraction: f64,
    /// Per-allele mutation probability.
    pub mutation_rate: f64,
    /// Generations a genome may survive before retirement.
    pub max_age: u32,
    /// Seed for reproducible runs; random when absent.
    pub seed: Option<u64>,
}

impl Default for GeneticsConfig {
    fn default() -> Self {
        Self {
            population_size: 24,
            competitive_fraction: 0.5,
            mutation_rate: 0.1,
            max_age: 3,
            seed: None,
        }
    }
}

impl GeneticsConfig {
    /// Size of the competitive pool, kept strictly between one genome and
    /// the whole population.
    pub fn competitive_size(&self) -> usize {
        let raw = (self.population_size as f64 * self.competitive_fraction).round() as usize;
        raw.clamp(1, self.population_size.saturating_sub(1).max(1))
    }

    pub fn validate(&self) -> Result<()> {
        if self.population_size < 2 {
            return Err(CoreError::Config(
                "population_size must be at least 2".to_string(),
            ));
        }
        if !(self.competitive_fraction > 0.0 && self.competitive_fraction < 1.0) {
            return Err(CoreError::Config(format!(
                "competitive_fraction must be in (0, 1), got {}",
                self.competitive_fraction
            )));
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(CoreError::Config(format!(
                "mutation_rate must be in [0, 1], got {}",
                self.mutation_rate
            )));
        }
        if self.max_age == 0 {
            return Err(CoreError::Config("max_age must be at least 1".to_string()));
        }
        if self.mutation_rate == 0.0 {
            warn!("mutation_rate is 0: offspring only recombine alleles already present in their parents");
        }
        Ok(())
    }
}

/// Top-level tuner settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    pub generations: u64,
    pub objective: TuningObjective,
    /// Penalty factor applied to timed-out runs under the runtime
    /// objective.
    pub timeout_penalty: f64,
    pub engine: EngineConfig,
    pub genetics: GeneticsConfig,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            generations: 10,
            objective: TuningObjective::default(),
            timeout_penalty: 10.0,
            engine: EngineConfig::default(),
            genetics: GeneticsConfig::default(),
        }
    }
}

impl TunerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.generations == 0 {
            return Err(CoreError::Config(
                "generations must be at least 1".to_string(),
            ));
        }
        if self.timeout_penalty < 1.0 {
            return Err(CoreError::Config(format!(
                "timeout_penalty must be at least 1, got {}",
                self.timeout_penalty
            )));
        }
        self.engine.validate()?;
        self.genetics.validate()?;
        Ok(())
    }
}
