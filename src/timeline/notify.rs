// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Operation notifications.
//!
//! Listeners that own things which are not document events (drag handles,
//! playheads, selection boxes) subscribe to a channel and receive a
//! [`Remap`] with every begin and continue. The remap converts an original
//! time or beat into where the in-flight edit places it.

use std::sync::mpsc::Sender;

use super::operation::{OperationKind, PreserveMode};
use crate::mapping::Mapping;

/// A remapped position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeBeat {
    pub time: f64,
    pub beat: f64,
}

/// Converts positions from the state at `begin` to the current state
#[derive(Debug, Clone)]
pub struct Remap {
    mode: PreserveMode,
    ignore_before: Option<f64>,
    initial: Mapping,
    current: Mapping,
}

impl Remap {
    pub(crate) fn new(
        mode: PreserveMode,
        ignore_before: Option<f64>,
        initial: Mapping,
        current: Mapping,
    ) -> Self {
        Self {
            mode,
            ignore_before,
            initial,
            current,
        }
    }

    /// Whether a position at `original_time` keeps its time under this edit
    fn keeps_time(&self, original_time: f64) -> bool {
        match self.mode {
            PreserveMode::KeepBeats => false,
            _ => !self.ignore_before.map_or(false, |cutoff| original_time < cutoff),
        }
    }

    /// Where something originally at `original_time` lands now
    pub fn remap_time(&self, original_time: f64) -> TimeBeat {
        if self.keeps_time(original_time) {
            TimeBeat {
                time: original_time,
                beat: self.current.time_to_beat(original_time),
            }
        } else {
            let beat = self.initial.time_to_beat(original_time);
            TimeBeat {
                time: self.current.beat_to_time(beat),
                beat,
            }
        }
    }

    /// Where something originally at `original_beat` lands now
    pub fn remap_beat(&self, original_beat: f64) -> TimeBeat {
        self.remap_time(self.initial.beat_to_time(original_beat))
    }

    pub fn mode(&self) -> PreserveMode {
        self.mode
    }
}

/// Message sent to timeline subscribers
#[derive(Debug, Clone)]
pub enum OperationNotice {
    Begin { kind: OperationKind, remap: Remap },
    Continue { kind: OperationKind, remap: Remap },
    Finish { kind: OperationKind },
    Cancel { kind: OperationKind },
}

impl OperationNotice {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationNotice::Begin { kind, .. }
            | OperationNotice::Continue { kind, .. }
            | OperationNotice::Finish { kind }
            | OperationNotice::Cancel { kind } => *kind,
        }
    }

    /// The remap carried by begin and continue notices
    pub fn remap(&self) -> Option<&Remap> {
        match self {
            OperationNotice::Begin { remap, .. } | OperationNotice::Continue { remap, .. } => {
                Some(remap)
            }
            _ => None,
        }
    }
}

/// Fan-out over subscriber channels
#[derive(Debug, Default)]
pub(crate) struct Listeners {
    senders: Vec<Sender<OperationNotice>>,
}

impl Listeners {
    pub(crate) fn add(&mut self, sender: Sender<OperationNotice>) {
        self.senders.push(sender);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    /// Send to every subscriber, dropping those whose receiver is gone
    pub(crate) fn send(&mut self, notice: OperationNotice) {
        let before = self.senders.len();
        self.senders.retain(|tx| tx.send(notice.clone()).is_ok());
        let dropped = before - self.senders.len();
        if dropped > 0 {
            tracing::debug!(dropped, "removed disconnected operation listeners");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::EventId;
    use crate::mapping::{compute_mapping, StartData, TempoControl};
    use std::sync::mpsc::channel;

    const EPS: f64 = 1e-9;

    fn mapping(first_bpm: f64) -> Mapping {
        let controls = [
            TempoControl {
                id: EventId::from_raw(0),
                beat: 0.0,
                bpm: Some(first_bpm),
            },
            TempoControl {
                id: EventId::from_raw(1),
                beat: 16.0,
                bpm: Some(90.0),
            },
        ];
        compute_mapping(&StartData::default(), &controls, None).mapping
    }

    #[test]
    fn test_keep_beats_remap() {
        let remap = Remap::new(PreserveMode::KeepBeats, None, mapping(120.0), mapping(60.0));
        assert_eq!(remap.mode(), PreserveMode::KeepBeats);
        let moved = remap.remap_time(4.0);
        assert!((moved.beat - 8.0).abs() < EPS);
        assert!((moved.time - 8.0).abs() < EPS);
        assert_eq!(remap.remap_beat(8.0), moved);
    }

    #[test]
    fn test_keep_times_remap_with_cutoff() {
        let remap = Remap::new(
            PreserveMode::KeepTimesAfter,
            Some(8.0),
            mapping(120.0),
            mapping(60.0),
        );
        // Before the cutoff the beat holds
        let early = remap.remap_time(2.0);
        assert!((early.beat - 4.0).abs() < EPS);
        assert!((early.time - 4.0).abs() < EPS);
        // From the cutoff on the time holds
        let late = remap.remap_time(8.0);
        assert!((late.time - 8.0).abs() < EPS);
        assert!((late.beat - 8.0).abs() < EPS);
    }

    #[test]
    fn test_listeners_drop_closed_receivers() {
        let mut listeners = Listeners::default();
        let (tx, rx) = channel();
        let (closed_tx, closed_rx) = channel();
        listeners.add(tx);
        listeners.add(closed_tx);
        drop(closed_rx);

        listeners.send(OperationNotice::Finish {
            kind: OperationKind::Move,
        });
        assert_eq!(listeners.senders.len(), 1);
        assert_eq!(rx.try_recv().unwrap().kind(), OperationKind::Move);
        assert!(!listeners.is_empty());
    }
}
