//! Structured event sink.
//!
//! Every engine component receives an [`EventSink`] at construction and
//! publishes lifecycle events through it instead of writing to a global
//! side channel. Subscribers (the CLI progress printer, tests) attach via
//! `subscribe()`; publishing never blocks and never fails, lagging
//! subscribers simply miss events.

use tokio::sync::broadcast;

/// Lifecycle events published by the tuner.
#[derive(Clone, Debug, PartialEq)]
pub enum TunerEvent {
    /// A coordinator committed a synchronized instance set.
    InstanceSetCommitted {
        version: u64,
        count: usize,
    },
    /// A malformed instance handshake was discarded.
    InstanceSyncRejected {
        reason: String,
    },
    /// The result store was cleared after an instance-set change.
    StoreInvalidated {
        version: u64,
    },
    /// A mini-tournament started evaluating.
    TournamentStarted {
        tournament: u64,
        genomes: usize,
        instances: usize,
    },
    /// A mini-tournament reported its ranking.
    TournamentFinished {
        tournament: u64,
        ranked: usize,
        cancelled: usize,
    },
    /// The racing bound was established or tightened.
    RacingBoundSet {
        tournament: u64,
        bound_ms: u64,
    },
    /// A genome finished evaluation on every instance.
    GenomeFinished {
        tournament: u64,
        genome: String,
        completion_ms: u64,
    },
    /// A genome was cut off by racing.
    GenomeCancelled {
        tournament: u64,
        genome: String,
    },
    /// A transient run failure was retried.
    RunRetried {
        genome: String,
        instance: u64,
        failures: u32,
    },
    /// An evaluation exhausted its retry budget; the system is being torn
    /// down.
    EvaluationAborted {
        genome: String,
        instance: u64,
        failures: u32,
    },
    /// A configuration anomaly worth knowing about; execution continues.
    ConfigWarning {
        message: String,
    },
    /// One generation of the outer tuning loop completed.
    GenerationComplete {
        generation: u64,
        best_score: f64,
        winners: usize,
    },
}

/// Broadcast bridge for [`TunerEvent`]s.
#[derive(Clone)]
pub struct EventSink {
    events_tx: broadcast::Sender<TunerEvent>,
}

impl EventSink {
    pub fn new(capacity: usize) -> Self {
        let (events_tx, _) = broadcast::channel(capacity);
        Self { events_tx }
    }

    /// Publish an event. A send error means nobody is listening.
    pub fn emit(&self, event: TunerEvent) {
        let _ = self.events_tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TunerEvent> {
        self.events_tx.subscribe()
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let sink = EventSink::default();
        let mut rx = sink.subscribe();

        sink.emit(TunerEvent::TournamentStarted {
            tournament: 3,
            genomes: 8,
            instances: 5,
        });

        let event = rx.recv().await.expect("should receive event");
        match event {
            TunerEvent::TournamentStarted {
                tournament,
                genomes,
                ..
            } => {
                assert_eq!(tournament, 3);
                assert_eq!(genomes, 8);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let sink = EventSink::new(8);
        sink.emit(TunerEvent::ConfigWarning {
            message: "x".to_string(),
        });
    }

    #[tokio::test]
    async fn test_clones_share_the_channel() {
        let sink = EventSink::default();
        let clone = sink.clone();
        let mut rx = sink.subscribe();

        clone.emit(TunerEvent::StoreInvalidated { version: 2 });

        assert_eq!(
            rx.recv().await.unwrap(),
            TunerEvent::StoreInvalidated { version: 2 }
        );
    }
}
