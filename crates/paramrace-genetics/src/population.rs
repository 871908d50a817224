//! Two-pool population with aging and retirement.

use crate::operators::GeneticOperators;
use paramrace_core::{Genome, GeneticsConfig};
use tracing::debug;

/// The tuning population. Only the competitive pool enters tournaments;
/// the non-competitive pool preserves allele diversity and supplies
/// crossover mates.
pub struct Population {
    competitive: Vec<Genome>,
    non_competitive: Vec<Genome>,
    config: GeneticsConfig,
}

impl Population {
    /// Sample a fresh population and split it into the two pools.
    pub fn seed(config: &GeneticsConfig, operators: &mut GeneticOperators) -> Self {
        let mut competitive: Vec<Genome> = (0..config.population_size)
            .map(|_| operators.random_genome())
            .collect();
        let non_competitive = competitive.split_off(config.competitive_size());
        debug!(
            competitive = competitive.len(),
            non_competitive = non_competitive.len(),
            "population seeded"
        );
        Self {
            competitive,
            non_competitive,
            config: config.clone(),
        }
    }

    pub fn competitive(&self) -> &[Genome] {
        &self.competitive
    }

    pub fn non_competitive(&self) -> &[Genome] {
        &self.non_competitive
    }

    pub fn len(&self) -> usize {
        self.competitive.len() + self.non_competitive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.competitive.is_empty() && self.non_competitive.is_empty()
    }

    /// Add an externally constructed genome to the competitive pool. Meant
    /// for callers that plug in their own genome source; the genome
    /// competes in the next round like any other.
    pub fn inject_competitive(&mut self, genome: Genome) {
        self.competitive.push(genome);
    }

    /// Advance one generation: the round's winners survive and age,
    /// genomes past the age cap retire, and the freed competitive slots
    /// are refilled with offspring bred from a winner and a
    /// non-competitive mate. Retired non-competitive genomes are replaced
    /// by fresh random ones.
    pub fn next_generation(&mut self, winners: &[Genome], operators: &mut GeneticOperators) {
        let max_age = self.config.max_age;
        let target = self.config.competitive_size();

        let mut survivors: Vec<Genome> = winners.to_vec();
        for genome in &mut survivors {
            genome.grow_older();
        }
        let before = survivors.len();
        survivors.retain(|genome| genome.age() <= max_age);
        let retired = before - survivors.len();
        survivors.truncate(target);

        let mut bred = 0usize;
        while survivors.len() < target {
            let child = match (
                operators.choose(winners),
                operators.choose(&self.non_competitive),
            ) {
                (Some(father), Some(mother)) => operators.breed(father, mother),
                _ => operators.random_genome(),
            };
            survivors.push(child);
            bred += 1;
        }

        let mut refreshed = 0usize;
        for genome in &mut self.non_competitive {
            genome.grow_older();
            if genome.age() > max_age {
                *genome = operators.random_genome();
                refreshed += 1;
            }
        }

        debug!(
            survivors = survivors.len() - bred,
            retired, bred, refreshed, "generation advanced"
        );
        self.competitive = survivors;
    }
}
