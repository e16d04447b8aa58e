// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Selection edits: range transforms and quantize.

use std::collections::BTreeMap;

use tracing::{debug, trace};

use super::operation::{snap_to_grid, OperationKind, OperationState, PreserveMode};
use super::{Timeline, EPSILON};
use crate::document::EventId;
use crate::error::{Result, TimelineError};
use crate::registry::EventCategory;

/// One end of a selected event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SelectionPoint {
    pub id: EventId,
    /// The end of the event's duration rather than its start
    pub tail: bool,
}

impl SelectionPoint {
    pub fn head(id: EventId) -> Self {
        Self { id, tail: false }
    }

    pub fn tail(id: EventId) -> Self {
        Self { id, tail: true }
    }
}

/// Which edge of a range drives snapping and length preservation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeEdge {
    Left,
    Right,
}

/// Selected heads and tails, grouped per event
type Members = BTreeMap<EventId, (bool, bool)>;

/// Range transform bookkeeping kept in the operation state
#[derive(Debug, Clone)]
pub(crate) struct RangeSelection {
    members: Members,
    left_time: f64,
    right_time: f64,
    left_beat: f64,
    right_beat: f64,
    dominant: RangeEdge,
    preserve_length: bool,
}

impl Timeline {
    fn selection_members(&self, selection: &[SelectionPoint], allow_controls: bool) -> Result<Members> {
        if selection.is_empty() {
            return Err(TimelineError::InvalidParameters("selection is empty".to_string()));
        }
        let mut members = Members::new();
        for point in selection {
            let entry = self
                .registry
                .get(point.id)
                .ok_or(TimelineError::UnknownEvent(point.id))?;
            if !allow_controls && entry.category == EventCategory::TempoControl {
                return Err(TimelineError::InvalidParameters(format!(
                    "tempo control {} cannot be range transformed",
                    point.id
                )));
            }
            let has_duration = self
                .document
                .event(point.id)
                .map_or(false, |e| e.duration.is_some());
            if point.tail && !has_duration {
                return Err(TimelineError::InvalidParameters(format!(
                    "event {} has no duration to select the tail of",
                    point.id
                )));
            }
            let member = members.entry(point.id).or_default();
            if point.tail {
                member.1 = true;
            } else {
                member.0 = true;
            }
        }
        Ok(members)
    }

    /// Start rescaling a selection of static events between two edges.
    ///
    /// `KeepTimes` scales in time, `KeepBeats` in beats. `dominant` is the
    /// edge that snaps; with `preserve_length` the other edge follows it at
    /// the original width.
    pub fn begin_range_transform(
        &mut self,
        selection: &[SelectionPoint],
        mode: PreserveMode,
        grid: f64,
        dominant: RangeEdge,
        preserve_length: bool,
    ) -> Result<()> {
        if mode == PreserveMode::KeepTimesAfter {
            return Err(TimelineError::InvalidParameters(
                "range transforms support KeepBeats or KeepTimes only".to_string(),
            ));
        }
        let members = self.selection_members(selection, false)?;
        self.begin_operation(OperationKind::RangeTransform, mode, grid, None, false)?;

        let Some(op) = self.operation.as_mut() else {
            return Err(TimelineError::NoOperation);
        };
        let mut range = RangeSelection {
            members,
            left_time: f64::INFINITY,
            right_time: f64::NEG_INFINITY,
            left_beat: f64::INFINITY,
            right_beat: f64::NEG_INFINITY,
            dominant,
            preserve_length,
        };
        for (id, &(head, tail)) in &range.members {
            let Some(initial) = op.initial_state.get(id) else {
                continue;
            };
            let mut ends = Vec::with_capacity(2);
            if head {
                ends.push((initial.time, initial.beat));
            }
            if let (true, Some(end_time), Some(duration)) = (tail, initial.end_time, initial.duration) {
                ends.push((end_time, initial.beat + duration));
            }
            for (time, beat) in ends {
                range.left_time = range.left_time.min(time);
                range.right_time = range.right_time.max(time);
                range.left_beat = range.left_beat.min(beat);
                range.right_beat = range.right_beat.max(beat);
            }
        }
        debug!(
            events = range.members.len(),
            left = range.left_time,
            right = range.right_time,
            "range transform selection"
        );
        op.range = Some(range);
        Ok(())
    }

    /// Rescale the selection so its edges sit at the given times
    pub fn continue_range_transform(&mut self, new_left: f64, new_right: f64, snapping: bool) -> Result<()> {
        self.with_operation(OperationKind::RangeTransform, |tl, op| {
            tl.apply_range_transform(op, new_left, new_right, snapping)
        })
    }

    pub fn finish_range_transform(&mut self, new_left: f64, new_right: f64, snapping: bool) -> Result<()> {
        self.continue_range_transform(new_left, new_right, snapping)?;
        self.finish_operation(OperationKind::RangeTransform)
    }

    fn apply_range_transform(
        &mut self,
        op: &mut OperationState,
        new_left: f64,
        new_right: f64,
        snapping: bool,
    ) -> Result<()> {
        let range = op.range.as_ref().ok_or_else(|| {
            TimelineError::InvalidParameters("range transform has no selection".to_string())
        })?;
        let in_beats = op.mode == PreserveMode::KeepBeats;
        let mapping = &self.mapping;
        let grid = op.grid;

        let (orig_left, orig_right) = if in_beats {
            (range.left_beat, range.right_beat)
        } else {
            (range.left_time, range.right_time)
        };
        let (mut left, mut right) = if in_beats {
            (mapping.time_to_beat(new_left), mapping.time_to_beat(new_right))
        } else {
            (new_left, new_right)
        };

        let snap = |x: f64| {
            if in_beats {
                snap_to_grid(x, grid)
            } else {
                mapping.beat_to_time(snap_to_grid(mapping.time_to_beat(x), grid))
            }
        };
        if snapping {
            match range.dominant {
                RangeEdge::Left => left = snap(left),
                RangeEdge::Right => right = snap(right),
            }
        }
        if range.preserve_length {
            let width = orig_right - orig_left;
            match range.dominant {
                RangeEdge::Left => right = left + width,
                RangeEdge::Right => left = right - width,
            }
        }

        let span = orig_right - orig_left;
        let scale = if span.abs() < EPSILON {
            1.0
        } else {
            ((right - left) / span).max(0.0)
        };
        let place = |beat: f64, time: f64| {
            if in_beats {
                left + (beat - orig_left) * scale
            } else {
                mapping.time_to_beat(left + (time - orig_left) * scale)
            }
        };

        for (id, &(head, tail)) in &range.members {
            let Some(initial) = op.initial_state.get(id) else {
                continue;
            };
            let start = if head {
                place(initial.beat, initial.time)
            } else {
                initial.beat
            };
            let end = match (initial.duration, initial.end_time) {
                (Some(duration), Some(end_time)) if tail => Some(place(initial.beat + duration, end_time)),
                (Some(duration), _) => Some(initial.beat + duration),
                _ => None,
            };
            if let Some(event) = self.document.event_mut(*id) {
                event.time = start;
                if let Some(end) = end {
                    event.duration = Some(end - start);
                }
            }
        }

        let changed = (left - orig_left).abs() > EPSILON || (right - orig_right).abs() > EPSILON;
        trace!(left, right, scale, changed, "range transform continue");
        op.changed = changed;
        Ok(())
    }

    /// Round the selected heads and tails to the nearest `1 / grid` beat.
    ///
    /// One-shot; returns how many events moved and commits a `quantize` undo
    /// point when any did.
    pub fn quantize(&mut self, selection: &[SelectionPoint], grid: f64) -> Result<usize> {
        self.ensure_idle()?;
        if !(grid > 0.0 && grid.is_finite()) {
            return Err(TimelineError::InvalidParameters(format!(
                "quantize grid must be positive, got {}",
                grid
            )));
        }
        let members = self.selection_members(selection, true)?;

        let mut moved = 0;
        let mut controls_moved = false;
        for (id, (head, tail)) in members {
            let is_control = self
                .registry
                .get(id)
                .map_or(false, |e| e.category == EventCategory::TempoControl);
            let Some(event) = self.document.event_mut(id) else {
                continue;
            };
            let start = event.time;
            let end = event.end_beat();
            let new_start = if head { snap_to_grid(start, grid) } else { start };
            let new_end = end.map(|e| if tail { snap_to_grid(e, grid) } else { e });
            if new_start == start && new_end == end {
                continue;
            }
            event.time = new_start;
            if let Some(new_end) = new_end {
                event.duration = Some(new_end - new_start);
            }
            moved += 1;
            controls_moved |= is_control;
        }

        if moved > 0 {
            self.registry.sort_by_beat(&self.document);
            self.document.sort_events();
            if controls_moved {
                self.recompute_mapping();
            }
            self.save_undo_point("quantize", false)?;
        }
        debug!(moved, grid, "quantize");
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Chart, Document, Event, Level};

    const EPS: f64 = 1e-9;

    /// 120 BPM throughout; blocks at beats 4 and 8, a hold from 10 to 14
    fn timeline() -> (Timeline, Vec<EventId>) {
        let level = Level {
            properties: Default::default(),
            events: vec![
                Event::new("play", 0.0).with_bpm(120.0),
                Event::new("block", 4.0),
                Event::new("block", 8.0),
                Event::new("hold", 10.0).with_duration(4.0),
            ],
        };
        let tl = Timeline::new(Document::from_parts(level, Chart::default())).unwrap();
        let statics = tl.registry().statics().to_vec();
        (tl, statics)
    }

    #[test]
    fn test_rejects_bad_selections() {
        let (mut tl, statics) = timeline();
        let control = tl.registry().tempo_controls()[0];
        let heads = [SelectionPoint::head(statics[0])];
        assert!(matches!(
            tl.begin_range_transform(&heads, PreserveMode::KeepTimesAfter, 4.0, RangeEdge::Left, false),
            Err(TimelineError::InvalidParameters(_))
        ));
        assert!(matches!(
            tl.begin_range_transform(&[SelectionPoint::head(control)], PreserveMode::KeepBeats, 4.0, RangeEdge::Left, false),
            Err(TimelineError::InvalidParameters(_))
        ));
        assert!(matches!(
            tl.begin_range_transform(&[SelectionPoint::tail(statics[0])], PreserveMode::KeepBeats, 4.0, RangeEdge::Left, false),
            Err(TimelineError::InvalidParameters(_))
        ));
        assert!(matches!(
            tl.begin_range_transform(&[], PreserveMode::KeepBeats, 4.0, RangeEdge::Left, false),
            Err(TimelineError::InvalidParameters(_))
        ));
        assert!(tl.operation().is_none());
    }

    #[test]
    fn test_stretch_selection_in_time() {
        let (mut tl, statics) = timeline();
        let selection = [SelectionPoint::head(statics[0]), SelectionPoint::head(statics[1])];
        // Blocks at 2 s and 4 s; pull the right edge out to 6 s
        tl.begin_range_transform(&selection, PreserveMode::KeepTimes, 4.0, RangeEdge::Right, false)
            .unwrap();
        tl.finish_range_transform(2.0, 6.0, false).unwrap();
        assert!((tl.event(statics[0]).unwrap().time - 4.0).abs() < EPS);
        assert!((tl.event(statics[1]).unwrap().time - 12.0).abs() < EPS);
        assert_eq!(tl.history().points().last().unwrap().kind, "rangeTransform");
    }

    #[test]
    fn test_preserve_length_translates() {
        let (mut tl, statics) = timeline();
        let selection = [SelectionPoint::head(statics[0]), SelectionPoint::head(statics[1])];
        tl.begin_range_transform(&selection, PreserveMode::KeepBeats, 4.0, RangeEdge::Left, true)
            .unwrap();
        // Left edge dragged to 2.55 s (beat 5.1), snapped to beat 5
        tl.finish_range_transform(2.55, 100.0, true).unwrap();
        assert!((tl.event(statics[0]).unwrap().time - 5.0).abs() < EPS);
        assert!((tl.event(statics[1]).unwrap().time - 9.0).abs() < EPS);
    }

    #[test]
    fn test_tail_only_resizes_duration() {
        let (mut tl, statics) = timeline();
        let hold = statics[2];
        tl.begin_range_transform(&[SelectionPoint::tail(hold)], PreserveMode::KeepBeats, 4.0, RangeEdge::Right, false)
            .unwrap();
        // Zero-width selection: scale 1, the tail just follows the edge
        tl.continue_range_transform(8.0, 8.0, false).unwrap();
        let event = tl.event(hold).unwrap();
        assert_eq!(event.time, 10.0);
        assert!((event.duration.unwrap() - 6.0).abs() < EPS);
        tl.cancel_operation().unwrap();
        assert_eq!(tl.event(hold).unwrap().duration, Some(4.0));
    }

    #[test]
    fn test_unchanged_transform_saves_nothing() {
        let (mut tl, statics) = timeline();
        let selection = [SelectionPoint::head(statics[0]), SelectionPoint::head(statics[1])];
        tl.begin_range_transform(&selection, PreserveMode::KeepTimes, 4.0, RangeEdge::Left, false)
            .unwrap();
        tl.finish_range_transform(2.0, 4.0, false).unwrap();
        assert_eq!(tl.history().len(), 1);
    }

    #[test]
    fn test_quantize() {
        let (mut tl, _) = timeline();
        let block = tl.add_event(Event::new("block", 7.1), false, false).unwrap();
        let hold = tl
            .add_event(Event::new("hold", 2.3).with_duration(1.1), false, false)
            .unwrap();

        let moved = tl
            .quantize(
                &[
                    SelectionPoint::head(block),
                    SelectionPoint::head(hold),
                    SelectionPoint::tail(hold),
                ],
                4.0,
            )
            .unwrap();
        assert_eq!(moved, 2);
        assert_eq!(tl.event(block).unwrap().time, 7.0);
        let hold = tl.event(hold).unwrap();
        assert_eq!(hold.time, 2.25);
        assert!((hold.duration.unwrap() - 1.25).abs() < EPS);
        assert_eq!(tl.history().points().last().unwrap().kind, "quantize");

        let before = tl.history().len();
        assert_eq!(tl.quantize(&[SelectionPoint::head(block)], 4.0).unwrap(), 0);
        assert_eq!(tl.history().len(), before);
        assert!(matches!(
            tl.quantize(&[SelectionPoint::head(block)], 0.0),
            Err(TimelineError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_quantize_control_updates_mapping() {
        let (mut tl, _) = timeline();
        let control = tl
            .add_event(Event::new("setBPM", 15.9).with_bpm(60.0), false, false)
            .unwrap();
        tl.quantize(&[SelectionPoint::head(control)], 1.0).unwrap();
        assert_eq!(tl.event(control).unwrap().time, 16.0);
        assert!((tl.beat_to_time(17.0) - 9.0).abs() < EPS);
    }
}
