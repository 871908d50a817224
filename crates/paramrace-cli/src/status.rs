//! Per-generation status snapshots.

use crate::Result;
use chrono::{DateTime, Utc};
use paramrace_core::{GenomeResults, ParamValue, RankedGenome};
use paramrace_genetics::Population;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// What the tuner knows after a generation, serialized as JSON for
/// external monitoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub generation: u64,
    pub generations_total: u64,
    pub incumbent: Option<Incumbent>,
    pub population: PopulationSummary,
    pub updated_at: DateTime<Utc>,
}

/// The best configuration seen so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incumbent {
    pub score: f64,
    pub parameters: BTreeMap<String, ParamValue>,
    pub results: GenomeResults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationSummary {
    pub competitive: usize,
    pub non_competitive: usize,
}

impl StatusSnapshot {
    pub fn capture(
        generation: u64,
        generations_total: u64,
        incumbent: Option<&RankedGenome>,
        population: &Population,
    ) -> Self {
        Self {
            generation,
            generations_total,
            incumbent: incumbent.map(|best| Incumbent {
                score: best.score,
                parameters: best.genome.alleles().clone(),
                results: best.results.clone(),
            }),
            population: PopulationSummary {
                competitive: population.competitive().len(),
                non_competitive: population.non_competitive().len(),
            },
            updated_at: Utc::now(),
        }
    }
}

/// Write the snapshot atomically: a sibling temp file is renamed over the
/// target, so a concurrent reader sees either the old snapshot or the new
/// one, never a torn write.
pub fn write_snapshot(path: &Path, snapshot: &StatusSnapshot) -> Result<()> {
    let json = serde_json::to_string_pretty(snapshot)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use paramrace_core::{
        EvalResult, Genome, GeneticsConfig, InstanceId, ParamDef, ParamDomain, ParamSpace,
    };
    use paramrace_genetics::GeneticOperators;
    use std::time::Duration;

    fn sample_population() -> Population {
        let space = ParamSpace::new(vec![ParamDef::new(
            "depth",
            ParamDomain::Int { min: 1, max: 9 },
        )])
        .unwrap();
        let mut operators = GeneticOperators::new(space, 0.1, Some(1));
        Population::seed(
            &GeneticsConfig {
                population_size: 6,
                ..GeneticsConfig::default()
            },
            &mut operators,
        )
    }

    fn sample_incumbent() -> RankedGenome {
        let mut genome = Genome::new(Default::default());
        genome.set("depth", ParamValue::Int(4));
        let mut results = GenomeResults::new();
        results.insert(
            InstanceId::new(0),
            EvalResult::finished(1.5, Duration::from_millis(300)),
        );
        RankedGenome {
            genome,
            score: 0.3,
            results,
        }
    }

    #[test]
    fn test_snapshot_round_trips_through_json() {
        let population = sample_population();
        let incumbent = sample_incumbent();
        let snapshot = StatusSnapshot::capture(3, 10, Some(&incumbent), &population);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        write_snapshot(&path, &snapshot).unwrap();

        let loaded: StatusSnapshot =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.generation, 3);
        assert_eq!(loaded.generations_total, 10);
        let loaded_incumbent = loaded.incumbent.unwrap();
        assert_eq!(loaded_incumbent.score, 0.3);
        assert_eq!(
            loaded_incumbent.parameters.get("depth"),
            Some(&ParamValue::Int(4))
        );
        assert_eq!(loaded.population.competitive, 3);
    }

    #[test]
    fn test_rewrite_replaces_previous_snapshot() {
        let population = sample_population();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");

        for generation in 1..=3 {
            let snapshot = StatusSnapshot::capture(generation, 3, None, &population);
            write_snapshot(&path, &snapshot).unwrap();
        }

        let loaded: StatusSnapshot =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.generation, 3);
        assert!(loaded.incumbent.is_none());
        assert!(!path.with_extension("tmp").exists());
    }
}
