//! Racing policy: adaptive early termination of hopeless genomes.
//!
//! Once as many genomes have fully finished as the tournament needs
//! winners, the best completion time among them becomes a bound on
//! everyone else: a genome whose accumulated runtime exceeds the bound can
//! no longer win and its remaining runs are abandoned. The bound only
//! ever tightens, and only genomes that finished completely feed it;
//! partial results of cancelled genomes never do.
//!
//! The bound is broadcast over a watch channel so in-flight runs shorten
//! their own deadlines the moment it tightens, instead of checking only at
//! dispatch.

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Tracks finished-genome completion times and derives the racing bound.
#[derive(Debug)]
pub struct RacingState {
    enabled: bool,
    winner_target: usize,
    finished: usize,
    best: Option<Duration>,
    bound: Option<Duration>,
}

impl RacingState {
    pub fn new(enabled: bool, winner_target: usize) -> Self {
        Self {
            enabled,
            winner_target,
            finished: 0,
            best: None,
            bound: None,
        }
    }

    /// Record a genome that finished every instance with total runtime
    /// `completion`. Returns the new bound when this establishes or
    /// tightens it.
    pub fn record_finished(&mut self, completion: Duration) -> Option<Duration> {
        self.finished += 1;
        self.best = Some(match self.best {
            Some(best) => best.min(completion),
            None => completion,
        });

        if !self.enabled || self.finished < self.winner_target {
            return None;
        }
        let best = self.best?;
        match self.bound {
            Some(bound) if best >= bound => None,
            _ => {
                self.bound = Some(best);
                Some(best)
            }
        }
    }

    pub fn bound(&self) -> Option<Duration> {
        self.bound
    }

    pub fn finished(&self) -> usize {
        self.finished
    }
}

/// How much a run dispatched now may consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunBudget {
    /// The CPU limit binds; an overrun is recorded as a timeout result.
    CpuBound(Duration),
    /// The racing allowance binds; an overrun abandons the genome without
    /// a stored result.
    RaceBound(Duration),
    /// The genome has already spent the bound; nothing may be dispatched.
    Exhausted,
}

impl RunBudget {
    pub fn allowance(&self) -> Option<Duration> {
        match self {
            RunBudget::CpuBound(d) | RunBudget::RaceBound(d) => Some(*d),
            RunBudget::Exhausted => None,
        }
    }
}

/// Budget for a run dispatched with `spent` already consumed by its genome
/// under the current `bound`.
pub fn run_budget(bound: Option<Duration>, spent: Duration, cpu_timeout: Duration) -> RunBudget {
    match bound {
        None => RunBudget::CpuBound(cpu_timeout),
        Some(bound) => {
            if spent >= bound {
                return RunBudget::Exhausted;
            }
            let left = bound - spent;
            if left < cpu_timeout {
                RunBudget::RaceBound(left)
            } else {
                RunBudget::CpuBound(cpu_timeout)
            }
        }
    }
}

/// Why a racing wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RaceSignal {
    /// The genome's allowance ran out; abandon the run.
    Expired,
    /// The session is gone; stop quietly.
    Closed,
}

/// Wait until the racing deadline of a run that started at `started` with
/// `spent_before` already consumed expires, re-arming whenever the bound
/// tightens. Pends forever while no bound exists.
pub(crate) async fn race_expired(
    mut bound_rx: watch::Receiver<Option<Duration>>,
    spent_before: Duration,
    started: Instant,
) -> RaceSignal {
    loop {
        let bound = *bound_rx.borrow_and_update();
        match bound {
            Some(bound) => {
                let allowance = bound.saturating_sub(spent_before);
                let deadline = started + allowance;
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => return RaceSignal::Expired,
                    changed = bound_rx.changed() => {
                        if changed.is_err() {
                            return RaceSignal::Closed;
                        }
                    }
                }
            }
            None => {
                if bound_rx.changed().await.is_err() {
                    return RaceSignal::Closed;
                }
            }
        }
    }
}
