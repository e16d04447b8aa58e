// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Restitching: re-deriving beats so events keep their times after a tempo
//! control changes.
//!
//! Controls are placed first, one at a time in order of desired time, each
//! against the mapping built from the controls already placed. Static events
//! then read their new beat straight off the finished mapping.

use tracing::trace;

use super::operation::OperationState;
use super::Timeline;
use crate::document::EventId;
use crate::mapping::{compute_mapping, StartData, TempoControl};

impl Timeline {
    /// Restitch against the snapshot in `op`.
    ///
    /// The target control is placed at `new_target_time`; every other event
    /// aims for its snapshot time. Static events that started before
    /// `ignore_before` keep their snapshot beat instead.
    pub(crate) fn restitch(
        &mut self,
        op: &OperationState,
        new_target_time: f64,
        ignore_before: Option<f64>,
    ) {
        let start = StartData::from_properties(self.document.properties());
        let target = op.target();

        // Preloaded and skipped controls have no time of their own; they hold
        // their beat and feed every partial mapping.
        let mut placed: Vec<TempoControl> = Vec::new();
        let mut pending: Vec<(EventId, f64)> = Vec::new();
        for &id in self.registry.tempo_controls() {
            let (Some(initial), Some(event)) = (op.initial(id), self.document.event(id)) else {
                continue;
            };
            let is_target = Some(id) == target;
            let beat = if is_target { event.time } else { initial.beat };
            if start.is_preloaded(beat) || beat < start.true_first_beat {
                placed.push(TempoControl {
                    id,
                    beat,
                    bpm: event.bpm,
                });
            } else {
                let desired = if is_target { new_target_time } else { initial.time };
                pending.push((id, desired));
            }
        }
        for control in &placed {
            if let Some(event) = self.document.event_mut(control.id) {
                event.time = control.beat;
            }
        }

        pending.sort_by(|a, b| a.1.total_cmp(&b.1));
        for (id, desired) in pending {
            let partial = compute_mapping(&start, &placed, None).mapping;
            let beat = partial.time_to_beat(desired);
            let Some(event) = self.document.event_mut(id) else {
                continue;
            };
            event.time = beat;
            placed.push(TempoControl {
                id,
                beat,
                bpm: event.bpm,
            });
        }

        self.recompute_mapping();

        let keeps_beat = |time: f64| ignore_before.map_or(false, |cutoff| time < cutoff);
        for &id in self.registry.statics() {
            let (Some(initial), Some(event)) = (op.initial(id), self.document.event_mut(id)) else {
                continue;
            };
            let start_kept = keeps_beat(initial.time);
            let new_start = if start_kept {
                initial.beat
            } else {
                self.mapping.time_to_beat(initial.time)
            };
            event.time = new_start;

            if let (Some(duration), Some(end_time)) = (initial.duration, initial.end_time) {
                let end_kept = keeps_beat(end_time);
                event.duration = Some(if start_kept && end_kept {
                    duration
                } else {
                    let new_end = if end_kept {
                        initial.beat + duration
                    } else {
                        self.mapping.time_to_beat(end_time)
                    };
                    (new_end - new_start).max(0.0)
                });
            }
        }
        trace!(
            controls = placed.len(),
            statics = self.registry.statics().len(),
            ?ignore_before,
            "restitched"
        );
    }
}
