//! Receiver side of the instance synchronization handshake.
//!
//! The set is pushed as `Clear`, then `Add` batches, then `Finished` with
//! the announced total. The receiver accumulates between `Clear` and
//! `Finished` and commits atomically; any `Add` or `Finished` outside that
//! window, or a count mismatch at commit, discards everything and parks
//! the receiver until a fresh set arrives. Malformed sequences are never
//! fatal, only a reason to re-request.

use crate::messages::InstanceUpdate;
use paramrace_core::{Instance, InstanceSet};
use std::fmt;

/// Why a handshake step was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncRejection {
    AddWithoutClear,
    FinishedWithoutClear,
    CountMismatch { expected: usize, actual: usize },
}

impl fmt::Display for SyncRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncRejection::AddWithoutClear => write!(f, "add without a preceding clear"),
            SyncRejection::FinishedWithoutClear => write!(f, "finished without a preceding clear"),
            SyncRejection::CountMismatch { expected, actual } => {
                write!(f, "announced {} instances but received {}", expected, actual)
            }
        }
    }
}

/// Effect of applying one handshake step.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// Still accumulating; nothing visible changed.
    Accumulating,
    /// A complete set was committed.
    Committed(InstanceSet),
    /// The step was malformed. The partial set and any previously active
    /// set are gone; the receiver owes exactly one fresh request.
    Rejected(SyncRejection),
}

/// Accumulator for the handshake.
#[derive(Debug, Default)]
pub struct InstanceSync {
    staged: Option<(u64, Vec<Instance>)>,
    committed: Option<InstanceSet>,
}

impl InstanceSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// The active set, if one has been committed and not since discarded.
    pub fn committed(&self) -> Option<&InstanceSet> {
        self.committed.as_ref()
    }

    pub fn apply(&mut self, update: InstanceUpdate) -> SyncOutcome {
        match update {
            InstanceUpdate::Clear { version } => {
                // A clear is always valid; it restarts accumulation.
                self.staged = Some((version, Vec::new()));
                SyncOutcome::Accumulating
            }
            InstanceUpdate::Add(batch) => match self.staged.as_mut() {
                Some((_, staged)) => {
                    staged.extend(batch);
                    SyncOutcome::Accumulating
                }
                None => self.reject(SyncRejection::AddWithoutClear),
            },
            InstanceUpdate::Finished { expected } => match self.staged.take() {
                Some((version, staged)) => {
                    if staged.len() != expected {
                        self.reject(SyncRejection::CountMismatch {
                            expected,
                            actual: staged.len(),
                        })
                    } else {
                        let set = InstanceSet::new(version, staged);
                        self.committed = Some(set.clone());
                        SyncOutcome::Committed(set)
                    }
                }
                None => self.reject(SyncRejection::FinishedWithoutClear),
            },
        }
    }

    fn reject(&mut self, rejection: SyncRejection) -> SyncOutcome {
        self.staged = None;
        self.committed = None;
        SyncOutcome::Rejected(rejection)
    }
}
