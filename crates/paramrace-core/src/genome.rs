//! Candidate parameter configurations.

use crate::params::{ParamSpace, ParamValue};
use crate::{CoreError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identity of a genome, derived from its allele values.
///
/// Two genomes with the same alleles share an id regardless of age or
/// origin, which is what lets the result store reuse evaluations across
/// tournaments and generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GenomeId(u64);

impl GenomeId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for GenomeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{:016x}", self.0)
    }
}

/// One candidate configuration: a map from parameter name to allele value,
/// an age counter and a flag marking externally engineered genomes.
///
/// Value equality and hashing consider only the alleles. Age and the
/// engineered flag are bookkeeping for population management and never
/// influence identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Genome {
    alleles: BTreeMap<String, ParamValue>,
    age: u32,
    engineered: bool,
}

impl PartialEq for Genome {
    fn eq(&self, other: &Self) -> bool {
        self.alleles == other.alleles
    }
}

impl Eq for Genome {}

impl Hash for Genome {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.alleles.hash(state);
    }
}

impl Genome {
    pub fn new(alleles: BTreeMap<String, ParamValue>) -> Self {
        Self {
            alleles,
            age: 0,
            engineered: false,
        }
    }

    /// A genome supplied by an external generator rather than bred from
    /// the population.
    pub fn engineered(alleles: BTreeMap<String, ParamValue>) -> Self {
        Self {
            alleles,
            age: 0,
            engineered: true,
        }
    }

    /// Sample a fresh random genome over `space`.
    pub fn sample<R: Rng>(space: &ParamSpace, rng: &mut R) -> Self {
        let alleles = space
            .params()
            .iter()
            .map(|def| (def.name.clone(), def.domain.sample(rng)))
            .collect();
        Self::new(alleles)
    }

    /// Content-derived identity, stable across clones.
    pub fn id(&self) -> GenomeId {
        let mut hasher = DefaultHasher::new();
        self.alleles.hash(&mut hasher);
        GenomeId(hasher.finish())
    }

    pub fn alleles(&self) -> &BTreeMap<String, ParamValue> {
        &self.alleles
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.alleles.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: ParamValue) {
        self.alleles.insert(name.into(), value);
    }

    pub fn len(&self) -> usize {
        self.alleles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alleles.is_empty()
    }

    pub fn age(&self) -> u32 {
        self.age
    }

    pub fn grow_older(&mut self) {
        self.age += 1;
    }

    pub fn is_engineered(&self) -> bool {
        self.engineered
    }

    /// Check that every parameter of `space` is assigned a value inside
    /// its domain and that no extra alleles are present.
    pub fn validate_against(&self, space: &ParamSpace) -> Result<()> {
        for def in space.params() {
            match self.alleles.get(&def.name) {
                Some(value) if def.domain.contains(value) => {}
                Some(value) => {
                    return Err(CoreError::ValueOutOfDomain {
                        name: def.name.clone(),
                        value: value.to_string(),
                    })
                }
                None => return Err(CoreError::UnknownParameter(def.name.clone())),
            }
        }
        for name in self.alleles.keys() {
            if space.get(name).is_none() {
                return Err(CoreError::UnknownParameter(name.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{ParamDef, ParamDomain};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn genome(pairs: &[(&str, ParamValue)]) -> Genome {
        Genome::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_equality_ignores_age_and_origin() {
        let a = genome(&[("x", ParamValue::Int(3)), ("y", ParamValue::Bool(true))]);
        let mut b = a.clone();
        b.grow_older();
        b.grow_older();
        assert_eq!(a, b);
        assert_eq!(a.id(), b.id());

        let c = Genome::engineered(a.alleles().clone());
        assert_eq!(a, c);
        assert_eq!(a.id(), c.id());
    }

    #[test]
    fn test_equality_ignores_insertion_order() {
        let a = genome(&[("x", ParamValue::Int(1)), ("y", ParamValue::Int(2))]);
        let b = genome(&[("y", ParamValue::Int(2)), ("x", ParamValue::Int(1))]);
        assert_eq!(a, b);
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn test_different_alleles_different_id() {
        let a = genome(&[("x", ParamValue::Int(1))]);
        let b = genome(&[("x", ParamValue::Int(2))]);
        assert_ne!(a, b);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_sample_covers_space() {
        let space = ParamSpace::new(vec![
            ParamDef::new("depth", ParamDomain::Int { min: 1, max: 4 }),
            ParamDef::new("flag", ParamDomain::Bool),
        ])
        .unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let g = Genome::sample(&space, &mut rng);
        assert_eq!(g.len(), 2);
        assert!(g.validate_against(&space).is_ok());
        assert_eq!(g.age(), 0);
        assert!(!g.is_engineered());
    }

    #[test]
    fn test_validate_rejects_missing_and_extra() {
        let space = ParamSpace::new(vec![ParamDef::new(
            "depth",
            ParamDomain::Int { min: 1, max: 4 },
        )])
        .unwrap();

        let missing = genome(&[]);
        assert!(missing.validate_against(&space).is_err());

        let extra = genome(&[
            ("depth", ParamValue::Int(2)),
            ("stray", ParamValue::Bool(false)),
        ]);
        assert!(extra.validate_against(&space).is_err());

        let out_of_range = genome(&[("depth", ParamValue::Int(9))]);
        assert!(matches!(
            out_of_range.validate_against(&space),
            Err(CoreError::ValueOutOfDomain { .. })
        ));
    }
}
