//! Domain-aware genetic operators over a typed parameter space.

use paramrace_core::{Genome, ParamDomain, ParamSpace, ParamValue};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

/// Crossover, mutation and repair, sharing one seedable RNG so a tuning
/// run can be reproduced exactly.
pub struct GeneticOperators {
    space: ParamSpace,
    mutation_rate: f64,
    rng: StdRng,
}

impl GeneticOperators {
    pub fn new(space: ParamSpace, mutation_rate: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            space,
            mutation_rate: mutation_rate.clamp(0.0, 1.0),
            rng,
        }
    }

    pub fn space(&self) -> &ParamSpace {
        &self.space
    }

    /// A fresh genome sampled uniformly from the space.
    pub fn random_genome(&mut self) -> Genome {
        Genome::sample(&self.space, &mut self.rng)
    }

    /// Uniform allele-wise crossover: each parameter comes from either
    /// parent with equal probability. A parameter missing from the chosen
    /// parent is sampled fresh.
    pub fn crossover(&mut self, a: &Genome, b: &Genome) -> Genome {
        let mut alleles = BTreeMap::new();
        for def in self.space.params() {
            let picked = if self.rng.gen_bool(0.5) {
                a.get(&def.name)
            } else {
                b.get(&def.name)
            };
            let value = match picked {
                Some(value) => value.clone(),
                None => def.domain.sample(&mut self.rng),
            };
            alleles.insert(def.name.clone(), value);
        }
        Genome::new(alleles)
    }

    /// Mutate each allele with probability `mutation_rate`: numeric
    /// parameters step within a tenth of their range, booleans flip,
    /// categoricals resample.
    pub fn mutate(&mut self, genome: &mut Genome) {
        for def in self.space.params() {
            if !self.rng.gen_bool(self.mutation_rate) {
                continue;
            }
            let mutated = match genome.get(&def.name) {
                Some(value) => step_value(&mut self.rng, &def.domain, value),
                None => def.domain.sample(&mut self.rng),
            };
            genome.set(def.name.clone(), mutated);
        }
    }

    /// Rebuild a genome so it validates against the space: out-of-domain
    /// values are clamped, missing parameters sampled, unknown alleles
    /// dropped.
    pub fn repair(&mut self, genome: &Genome) -> Genome {
        let mut alleles = BTreeMap::new();
        for def in self.space.params() {
            let value = match genome.get(&def.name) {
                Some(value) => def.domain.clamp(value, &mut self.rng),
                None => def.domain.sample(&mut self.rng),
            };
            alleles.insert(def.name.clone(), value);
        }
        if genome.is_engineered() {
            Genome::engineered(alleles)
        } else {
            Genome::new(alleles)
        }
    }

    /// Crossover, mutation and repair in one step.
    pub fn breed(&mut self, a: &Genome, b: &Genome) -> Genome {
        let mut child = self.crossover(a, b);
        self.mutate(&mut child);
        self.repair(&child)
    }

    /// Pick one genome uniformly at random.
    pub fn choose<'a>(&mut self, genomes: &'a [Genome]) -> Option<&'a Genome> {
        genomes.choose(&mut self.rng)
    }
}

fn step_value(rng: &mut StdRng, domain: &ParamDomain, value: &ParamValue) -> ParamValue {
    match (domain, value) {
        (ParamDomain::Int { min, max }, ParamValue::Int(current)) => {
            // The full i64 range is a legal domain; its width does not
            // fit in i64.
            let span = ((*max as i128 - *min as i128) / 10).max(1);
            let stepped = (*current as i128 + rng.gen_range(-span..=span))
                .clamp(*min as i128, *max as i128);
            ParamValue::Int(stepped as i64)
        }
        (ParamDomain::Float { min, max }, ParamValue::Float(current)) => {
            let span = (max - min) / 10.0;
            ParamValue::Float((current + rng.gen_range(-span..=span)).clamp(*min, *max))
        }
        (ParamDomain::Bool, ParamValue::Bool(current)) => ParamValue::Bool(!current),
        _ => domain.sample(rng),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paramrace_core::ParamDef;

    fn space() -> ParamSpace {
        ParamSpace::new(vec![
            ParamDef::new("depth", ParamDomain::Int { min: 1, max: 100 }),
            ParamDef::new(
                "ratio",
                ParamDomain::Float {
                    min: 0.0,
                    max: 1.0,
                },
            ),
            ParamDef::new("greedy", ParamDomain::Bool),
            ParamDef::new(
                "strategy",
                ParamDomain::Categorical {
                    choices: vec!["dfs".into(), "bfs".into(), "best".into()],
                },
            ),
        ])
        .unwrap()
    }

    fn operators(seed: u64) -> GeneticOperators {
        GeneticOperators::new(space(), 0.1, Some(seed))
    }

    #[test]
    fn test_crossover_takes_each_allele_from_a_parent() {
        let mut ops = operators(3);
        let a = ops.random_genome();
        let b = ops.random_genome();
        let child = ops.crossover(&a, &b);

        for def in space().params() {
            let value = child.get(&def.name).unwrap();
            assert!(
                value == a.get(&def.name).unwrap() || value == b.get(&def.name).unwrap(),
                "allele {} came from neither parent",
                def.name
            );
        }
    }

    #[test]
    fn test_mutation_stays_within_domains() {
        let space = space();
        let mut ops = GeneticOperators::new(space.clone(), 1.0, Some(5));
        for _ in 0..50 {
            let mut genome = ops.random_genome();
            ops.mutate(&mut genome);
            genome.validate_against(&space).unwrap();
        }
    }

    #[test]
    fn test_mutation_steps_survive_full_integer_range() {
        let space = ParamSpace::new(vec![ParamDef::new(
            "offset",
            ParamDomain::Int {
                min: i64::MIN,
                max: i64::MAX,
            },
        )])
        .unwrap();
        let mut ops = GeneticOperators::new(space.clone(), 1.0, Some(11));
        let mut genome = Genome::new(BTreeMap::from([(
            "offset".to_string(),
            ParamValue::Int(i64::MAX),
        )]));
        for _ in 0..50 {
            ops.mutate(&mut genome);
            genome.validate_against(&space).unwrap();
        }
    }

    #[test]
    fn test_zero_mutation_rate_changes_nothing() {
        let mut ops = GeneticOperators::new(space(), 0.0, Some(5));
        let original = ops.random_genome();
        let mut genome = original.clone();
        ops.mutate(&mut genome);
        assert_eq!(genome, original);
    }

    #[test]
    fn test_repair_fixes_everything_wrong() {
        let space = space();
        let mut ops = operators(9);
        let mut broken = ops.random_genome();
        broken.set("depth", ParamValue::Int(5_000));
        broken.set("strategy", ParamValue::Text("warp".into()));
        broken.set("leftover", ParamValue::Bool(true));

        let repaired = ops.repair(&broken);
        repaired.validate_against(&space).unwrap();
        assert!(repaired.get("leftover").is_none());
        assert_eq!(repaired.len(), space.len());
    }

    #[test]
    fn test_breed_produces_valid_offspring() {
        let space = space();
        let mut ops = operators(21);
        let a = ops.random_genome();
        let b = ops.random_genome();
        for _ in 0..20 {
            let child = ops.breed(&a, &b);
            child.validate_against(&space).unwrap();
            assert_eq!(child.age(), 0);
        }
    }

    #[test]
    fn test_seeded_operators_are_deterministic() {
        let mut first = operators(77);
        let mut second = operators(77);
        let (a1, b1) = (first.random_genome(), first.random_genome());
        let (a2, b2) = (second.random_genome(), second.random_genome());
        assert_eq!(a1, a2);
        assert_eq!(first.breed(&a1, &b1), second.breed(&a2, &b2));
    }
}
