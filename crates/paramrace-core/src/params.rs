//! Typed parameter space for the target algorithm.
//!
//! A tuning run is defined over a fixed set of named parameters, each with
//! a typed domain. Genomes are assignments over this space; the space also
//! knows how to sample fresh values and how to repair values that genetic
//! operators pushed outside their domain.

use crate::{CoreError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// One allele value.
///
/// Equality and hashing are exact: floats compare by bit pattern so that a
/// genome's identity is stable under cloning and serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl PartialEq for ParamValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ParamValue::Bool(a), ParamValue::Bool(b)) => a == b,
            (ParamValue::Int(a), ParamValue::Int(b)) => a == b,
            (ParamValue::Float(a), ParamValue::Float(b)) => a.to_bits() == b.to_bits(),
            (ParamValue::Text(a), ParamValue::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ParamValue {}

impl Hash for ParamValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            ParamValue::Bool(v) => {
                state.write_u8(0);
                v.hash(state);
            }
            ParamValue::Int(v) => {
                state.write_u8(1);
                v.hash(state);
            }
            ParamValue::Float(v) => {
                state.write_u8(2);
                v.to_bits().hash(state);
            }
            ParamValue::Text(v) => {
                state.write_u8(3);
                v.hash(state);
            }
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Text(v) => write!(f, "{}", v),
        }
    }
}

/// The domain a parameter ranges over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamDomain {
    /// Integers in `[min, max]`, inclusive.
    Int { min: i64, max: i64 },
    /// Floats in `[min, max]`, inclusive. The width `max - min` must be a
    /// finite f64 or the domain cannot be sampled.
    Float { min: f64, max: f64 },
    /// A boolean flag.
    Bool,
    /// One of a fixed list of choices.
    Categorical { choices: Vec<String> },
}

impl ParamDomain {
    /// Check that the domain itself is well formed.
    fn validate(&self, name: &str) -> Result<()> {
        match self {
            ParamDomain::Int { min, max } if min > max => Err(CoreError::InvalidParameter(
                format!("'{}': min {} exceeds max {}", name, min, max),
            )),
            ParamDomain::Float { min, max } if !(min <= max && (max - min).is_finite()) => {
                Err(CoreError::InvalidParameter(format!(
                    "'{}': invalid float range [{}, {}]",
                    name, min, max
                )))
            }
            ParamDomain::Categorical { choices } if choices.is_empty() => Err(
                CoreError::InvalidParameter(format!("'{}': empty choice list", name)),
            ),
            _ => Ok(()),
        }
    }

    /// Whether `value` lies inside this domain.
    pub fn contains(&self, value: &ParamValue) -> bool {
        match (self, value) {
            (ParamDomain::Int { min, max }, ParamValue::Int(v)) => (min..=max).contains(&v),
            (ParamDomain::Float { min, max }, ParamValue::Float(v)) => {
                v.is_finite() && *v >= *min && *v <= *max
            }
            (ParamDomain::Bool, ParamValue::Bool(_)) => true,
            (ParamDomain::Categorical { choices }, ParamValue::Text(v)) => {
                choices.iter().any(|c| c == v)
            }
            _ => false,
        }
    }

    /// Draw a uniform random value from the domain.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> ParamValue {
        match self {
            ParamDomain::Int { min, max } => ParamValue::Int(rng.gen_range(*min..=*max)),
            ParamDomain::Float { min, max } => {
                if min == max {
                    ParamValue::Float(*min)
                } else {
                    ParamValue::Float(rng.gen_range(*min..=*max))
                }
            }
            ParamDomain::Bool => ParamValue::Bool(rng.gen_bool(0.5)),
            ParamDomain::Categorical { choices } => {
                ParamValue::Text(choices[rng.gen_range(0..choices.len())].clone())
            }
        }
    }

    /// Pull `value` back into the domain, keeping it unchanged if it is
    /// already valid. Values of the wrong type are replaced by a resample.
    pub fn clamp<R: Rng>(&self, value: &ParamValue, rng: &mut R) -> ParamValue {
        if self.contains(value) {
            return value.clone();
        }
        match (self, value) {
            (ParamDomain::Int { min, max }, ParamValue::Int(v)) => {
                ParamValue::Int(*v.max(min).min(max))
            }
            (ParamDomain::Float { min, max }, ParamValue::Float(v)) => {
                if v.is_finite() {
                    ParamValue::Float(v.clamp(*min, *max))
                } else {
                    self.sample(rng)
                }
            }
            _ => self.sample(rng),
        }
    }
}

impl fmt::Display for ParamDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamDomain::Int { min, max } => write!(f, "int [{}, {}]", min, max),
            ParamDomain::Float { min, max } => write!(f, "float [{}, {}]", min, max),
            ParamDomain::Bool => write!(f, "bool"),
            ParamDomain::Categorical { choices } => write!(f, "one of {{{}}}", choices.join(", ")),
        }
    }
}

/// A named parameter with its domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDef {
    pub name: String,
    #[serde(flatten)]
    pub domain: ParamDomain,
}

impl ParamDef {
    pub fn new(name: impl Into<String>, domain: ParamDomain) -> Self {
        Self {
            name: name.into(),
            domain,
        }
    }
}

/// The full parameter space of a tuning run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamSpace {
    params: Vec<ParamDef>,
}

impl ParamSpace {
    /// Build a space from definitions, rejecting duplicates and malformed
    /// domains.
    pub fn new(params: Vec<ParamDef>) -> Result<Self> {
        let mut seen = std::collections::HashSet::new();
        for def in &params {
            if def.name.is_empty() {
                return Err(CoreError::InvalidParameter(
                    "parameter with empty name".to_string(),
                ));
            }
            if !seen.insert(def.name.as_str()) {
                return Err(CoreError::InvalidParameter(format!(
                    "duplicate parameter '{}'",
                    def.name
                )));
            }
            def.domain.validate(&def.name)?;
        }
        Ok(Self { params })
    }

    pub fn params(&self) -> &[ParamDef] {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ParamDef> {
        self.params.iter().find(|d| d.name == name)
    }
}
