//! Problem instances the target algorithm is evaluated on.
//!
//! Instances are opaque to the engine: the payload is only interpreted by
//! the target-algorithm adapter. Sets are versioned as a whole and always
//! replaced wholesale, never diffed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a problem instance within a tuning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(u64);

impl InstanceId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i{}", self.0)
    }
}

/// One problem input, with an opaque payload for the target adapter
/// (typically a file path or a command-line fragment).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instance {
    id: InstanceId,
    spec: String,
}

impl Instance {
    pub fn new(id: InstanceId, spec: impl Into<String>) -> Self {
        Self {
            id,
            spec: spec.into(),
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn spec(&self) -> &str {
        &self.spec
    }
}

/// A versioned snapshot of the active instance set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InstanceSet {
    version: u64,
    instances: Vec<Instance>,
}

impl InstanceSet {
    pub fn new(version: u64, instances: Vec<Instance>) -> Self {
        Self { version, instances }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instance> {
        self.instances.iter()
    }

    /// Whether both sets hold the same instances, ignoring the version.
    pub fn same_instances(&self, other: &[Instance]) -> bool {
        self.instances == other
    }
}
