// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Interactive edit operations.
//!
//! Every gesture is a begin / continue* / finish sequence. `begin`
//! snapshots every event so each `continue` recomputes from the original
//! state instead of accumulating drift; `finish` commits an undo point and
//! `cancel_operation` rolls back to the snapshot.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use tracing::{debug, trace};

use super::notify::{OperationNotice, Remap};
use super::range::RangeSelection;
use super::{Timeline, EPSILON};
use crate::document::EventId;
use crate::error::{Result, TimelineError};
use crate::mapping::{clamp_bpm, Mapping};
use crate::registry::EventCategory;

/// Kinds of multi-step edit operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Drag a tempo control to a new time
    Move,
    /// Set or clear a tempo control's BPM
    Tempo,
    /// Drag a tick after a tempo control, implying a new BPM
    Stretch,
    /// Rescale a selection of static events
    RangeTransform,
}

impl OperationKind {
    /// Undo point kind committed on finish
    pub fn undo_kind(self) -> &'static str {
        match self {
            OperationKind::Move => "moveControl",
            OperationKind::Tempo => "setBPM",
            OperationKind::Stretch => "stretch",
            OperationKind::RangeTransform => "rangeTransform",
        }
    }

    fn coalesces(self) -> bool {
        self == OperationKind::Tempo
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Move => "move",
            OperationKind::Tempo => "tempo",
            OperationKind::Stretch => "stretch",
            OperationKind::RangeTransform => "range transform",
        };
        f.write_str(name)
    }
}

/// What an edit holds fixed for everything other than its target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreserveMode {
    /// Beats stay put; times follow the new mapping
    KeepBeats,
    /// Times stay put; beats are re-derived
    KeepTimes,
    /// Times stay put from the next tempo control on; earlier beats stay put
    KeepTimesAfter,
}

impl FromStr for PreserveMode {
    type Err = TimelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "keep-beats" | "beats" => Ok(PreserveMode::KeepBeats),
            "keep-times" | "times" => Ok(PreserveMode::KeepTimes),
            "keep-times-after" | "after" => Ok(PreserveMode::KeepTimesAfter),
            other => Err(TimelineError::InvalidParameters(format!(
                "unknown preserve mode '{}'",
                other
            ))),
        }
    }
}

/// An event as it was when the operation began
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InitialState {
    pub beat: f64,
    pub time: f64,
    /// Explicit tempo, or the tempo in effect at the event's beat
    pub bpm: f64,
    /// The event's own tempo field
    pub tempo: Option<f64>,
    pub duration: Option<f64>,
    /// Time of `beat + duration`
    pub end_time: Option<f64>,
}

/// The in-flight operation
#[derive(Debug, Clone)]
pub struct OperationState {
    pub(crate) kind: OperationKind,
    pub(crate) mode: PreserveMode,
    /// Snap subdivisions per beat
    pub(crate) grid: f64,
    pub(crate) must_save: bool,
    /// Whether the latest continue left a net change
    pub(crate) changed: bool,
    pub(crate) target: Option<EventId>,
    pub(crate) next_control: Option<EventId>,
    pub(crate) initial_state: HashMap<EventId, InitialState>,
    /// Mapping truncated just before the target
    pub(crate) entry_mapping: Mapping,
    /// Full mapping at begin
    pub(crate) initial_mapping: Mapping,
    /// Stretch reference tick time
    pub(crate) reference_time: Option<f64>,
    pub(crate) range: Option<RangeSelection>,
}

impl OperationState {
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn mode(&self) -> PreserveMode {
        self.mode
    }

    pub fn grid(&self) -> f64 {
        self.grid
    }

    pub fn target(&self) -> Option<EventId> {
        self.target
    }

    pub fn next_control(&self) -> Option<EventId> {
        self.next_control
    }

    pub fn initial(&self, id: EventId) -> Option<&InitialState> {
        self.initial_state.get(&id)
    }

    pub fn entry_mapping(&self) -> &Mapping {
        &self.entry_mapping
    }

    pub fn initial_mapping(&self) -> &Mapping {
        &self.initial_mapping
    }

    /// Whether finishing now would commit an undo point
    pub fn will_commit(&self) -> bool {
        self.changed || self.must_save
    }

    pub(crate) fn target_initial(&self) -> Result<(EventId, InitialState)> {
        let target = self.target.ok_or_else(|| {
            TimelineError::InvalidParameters(format!("{} operation has no target", self.kind))
        })?;
        let initial = self
            .initial_state
            .get(&target)
            .copied()
            .ok_or(TimelineError::UnknownEvent(target))?;
        Ok((target, initial))
    }

    pub(crate) fn next_initial(&self) -> Option<InitialState> {
        self.next_control
            .and_then(|id| self.initial_state.get(&id).copied())
    }

    /// Preserve mode and ignore-before cutoff positions actually move under
    fn remap_policy(&self) -> (PreserveMode, Option<f64>) {
        match (self.kind, self.mode) {
            (OperationKind::RangeTransform, _) => (PreserveMode::KeepBeats, None),
            (_, PreserveMode::KeepTimesAfter) => match self.next_initial() {
                Some(next) => (PreserveMode::KeepTimesAfter, Some(next.time)),
                None => (PreserveMode::KeepBeats, None),
            },
            (_, mode) => (mode, None),
        }
    }
}

/// Round a beat to the nearest `1 / grid`
pub fn snap_to_grid(beat: f64, grid: f64) -> f64 {
    (beat * grid).round() / grid
}

/// Tempo nearest `requested_bpm` that keeps the next control on the sub-beat
/// phase it had at `original_bpm`.
///
/// `dt` is the original time from the edited control to the next one. A
/// non-positive `dt` leaves the request as is.
pub fn phase_locked_bpm(dt: f64, original_bpm: f64, requested_bpm: f64, grid: f64) -> f64 {
    if !(dt > 0.0) || !(grid > 0.0) {
        return requested_bpm;
    }
    let phase = (dt * original_bpm / 60.0 * grid).rem_euclid(1.0);
    let mut ticks = (dt * requested_bpm / 60.0 * grid).round();
    if ticks + phase <= 0.0 {
        ticks = 1.0;
    }
    (ticks + phase) * 60.0 / (grid * dt)
}

fn check_grid(grid: f64) -> Result<()> {
    if grid > 0.0 && grid.is_finite() {
        Ok(())
    } else {
        Err(TimelineError::InvalidParameters(format!(
            "snap grid must be positive, got {}",
            grid
        )))
    }
}

impl Timeline {
    pub(crate) fn check_control(&self, id: EventId) -> Result<()> {
        match self.registry.get(id) {
            None => Err(TimelineError::UnknownEvent(id)),
            Some(entry) if entry.category != EventCategory::TempoControl => {
                Err(TimelineError::NotTempoControl(id))
            }
            Some(_) => Ok(()),
        }
    }

    /// Snapshot every event and enter the in-progress state
    pub(crate) fn begin_operation(
        &mut self,
        kind: OperationKind,
        mode: PreserveMode,
        grid: f64,
        target: Option<EventId>,
        must_save: bool,
    ) -> Result<()> {
        self.ensure_idle()?;
        check_grid(grid)?;
        self.recompute_mapping();

        let mut initial_state = HashMap::with_capacity(self.registry.len());
        for &id in self.registry.all_events() {
            if let Some(event) = self.document.event(id) {
                let bpm = match event.bpm {
                    Some(bpm) => clamp_bpm(bpm),
                    None => self.mapping.beat_to_bpm(event.time),
                };
                initial_state.insert(
                    id,
                    InitialState {
                        beat: event.time,
                        time: self.mapping.beat_to_time(event.time),
                        bpm,
                        tempo: event.bpm,
                        duration: event.duration,
                        end_time: event.end_beat().map(|end| self.mapping.beat_to_time(end)),
                    },
                );
            }
        }

        let next_control = target.and_then(|id| self.registry.control_after(id));
        let entry_mapping = match target {
            Some(id) => self.mapping_before(id),
            None => self.mapping.clone(),
        };
        debug!(%kind, ?mode, ?target, ?next_control, grid, "operation begin");
        self.operation = Some(OperationState {
            kind,
            mode,
            grid,
            must_save,
            changed: false,
            target,
            next_control,
            initial_state,
            entry_mapping,
            initial_mapping: self.mapping.clone(),
            reference_time: None,
            range: None,
        });
        self.notify_progress(true);
        Ok(())
    }

    /// Take the in-flight operation if it is of `kind`
    fn take_active(&mut self, kind: OperationKind) -> Result<OperationState> {
        match self.operation.take() {
            None => Err(TimelineError::NoOperation),
            Some(op) if op.kind != kind => {
                let active = op.kind;
                self.operation = Some(op);
                Err(TimelineError::OperationMismatch {
                    expected: kind,
                    active,
                })
            }
            Some(op) => Ok(op),
        }
    }

    /// Run `f` against the in-flight operation of `kind`, then put it back
    pub(crate) fn with_operation<R>(
        &mut self,
        kind: OperationKind,
        f: impl FnOnce(&mut Self, &mut OperationState) -> Result<R>,
    ) -> Result<R> {
        let mut op = self.take_active(kind)?;
        let result = f(self, &mut op);
        self.operation = Some(op);
        let value = result?;
        self.notify_progress(false);
        Ok(value)
    }

    pub(crate) fn notify_progress(&mut self, begin: bool) {
        if self.listeners.is_empty() {
            return;
        }
        let notice = match &self.operation {
            Some(op) => {
                let (mode, cutoff) = op.remap_policy();
                let remap = Remap::new(mode, cutoff, op.initial_mapping.clone(), self.mapping.clone());
                if begin {
                    OperationNotice::Begin {
                        kind: op.kind,
                        remap,
                    }
                } else {
                    OperationNotice::Continue {
                        kind: op.kind,
                        remap,
                    }
                }
            }
            None => return,
        };
        self.notify(notice);
    }

    /// Leave the in-progress state, committing an undo point if warranted
    pub(crate) fn finish_operation(&mut self, kind: OperationKind) -> Result<()> {
        let op = self.take_active(kind)?;
        self.registry.sort_by_beat(&self.document);
        self.document.sort_events();
        self.recompute_mapping();

        let commit = op.will_commit();
        debug!(%kind, commit, "operation finish");
        self.notify(OperationNotice::Finish { kind });
        if commit {
            self.save_undo_point(kind.undo_kind(), kind.coalesces())?;
        }
        Ok(())
    }

    /// Abandon the in-flight operation and restore every event to its
    /// snapshot. No undo point is saved.
    pub fn cancel_operation(&mut self) -> Result<()> {
        let op = self.operation.take().ok_or(TimelineError::NoOperation)?;
        for (&id, initial) in &op.initial_state {
            if let Some(event) = self.document.event_mut(id) {
                event.time = initial.beat;
                event.duration = initial.duration;
                event.bpm = initial.tempo;
            }
        }
        self.registry.sort_by_beat(&self.document);
        self.recompute_mapping();
        debug!(kind = %op.kind, "operation cancelled");
        self.notify(OperationNotice::Cancel { kind: op.kind });
        Ok(())
    }

    pub(crate) fn set_event_beat(&mut self, id: EventId, beat: f64) -> Result<()> {
        self.document
            .event_mut(id)
            .ok_or(TimelineError::UnknownEvent(id))?
            .time = beat;
        Ok(())
    }

    // Move

    /// Start dragging a tempo control. Moves keep beats or times; partial
    /// preservation is not a move mode.
    pub fn begin_move(
        &mut self,
        target: EventId,
        mode: PreserveMode,
        grid: f64,
        must_save: bool,
    ) -> Result<()> {
        if mode == PreserveMode::KeepTimesAfter {
            return Err(TimelineError::InvalidParameters(
                "move operations support KeepBeats or KeepTimes only".to_string(),
            ));
        }
        self.check_control(target)?;
        self.begin_operation(OperationKind::Move, mode, grid, Some(target), must_save)
    }

    /// Place the target `delta_time` seconds from its original time
    pub fn continue_move(&mut self, delta_time: f64, snapping: bool) -> Result<()> {
        self.with_operation(OperationKind::Move, |tl, op| {
            tl.apply_move(op, delta_time, snapping)
        })
    }

    pub fn finish_move(&mut self, delta_time: f64, snapping: bool) -> Result<()> {
        self.continue_move(delta_time, snapping)?;
        self.finish_operation(OperationKind::Move)
    }

    fn apply_move(&mut self, op: &mut OperationState, delta_time: f64, snapping: bool) -> Result<()> {
        let (target, initial) = op.target_initial()?;
        let mut time = initial.time + delta_time;
        let mut beat = op.entry_mapping.time_to_beat(time);
        if snapping {
            beat = snap_to_grid(beat, op.grid);
            time = op.entry_mapping.beat_to_time(beat);
        }
        self.set_event_beat(target, beat)?;
        op.changed = delta_time != 0.0;
        trace!(%target, beat, time, "move continue");

        match op.mode {
            PreserveMode::KeepTimes => self.restitch(op, time, None),
            _ => self.recompute_mapping(),
        }
        Ok(())
    }

    // Tempo

    /// Start editing a tempo control's BPM. Always commits on finish.
    pub fn begin_tempo(&mut self, target: EventId, mode: PreserveMode, grid: f64) -> Result<()> {
        self.check_control(target)?;
        self.begin_operation(OperationKind::Tempo, mode, grid, Some(target), true)
    }

    /// Set the target's tempo; `None` clears it so the previous tempo carries on
    pub fn continue_tempo(&mut self, bpm: Option<f64>, snapping: bool) -> Result<()> {
        self.with_operation(OperationKind::Tempo, |tl, op| {
            tl.apply_tempo(op, bpm, snapping)
        })
    }

    pub fn finish_tempo(&mut self, bpm: Option<f64>, snapping: bool) -> Result<()> {
        self.continue_tempo(bpm, snapping)?;
        self.finish_operation(OperationKind::Tempo)
    }

    /// One-shot tempo edit
    pub fn set_tempo(
        &mut self,
        target: EventId,
        bpm: Option<f64>,
        mode: PreserveMode,
        grid: f64,
        snapping: bool,
    ) -> Result<()> {
        self.begin_tempo(target, mode, grid)?;
        if let Err(err) = self.finish_tempo(bpm, snapping) {
            if self.operation.is_some() {
                self.cancel_operation()?;
            }
            return Err(err);
        }
        Ok(())
    }

    pub(crate) fn apply_tempo(
        &mut self,
        op: &mut OperationState,
        bpm: Option<f64>,
        snapping: bool,
    ) -> Result<()> {
        let (target, initial) = op.target_initial()?;
        let next = op.next_initial();

        let mut bpm = bpm.map(clamp_bpm);
        if snapping && op.mode == PreserveMode::KeepTimesAfter {
            if let (Some(requested), Some(next)) = (bpm, next) {
                let locked = phase_locked_bpm(next.time - initial.time, initial.bpm, requested, op.grid);
                bpm = Some(clamp_bpm(locked));
            }
        }

        self.document
            .event_mut(target)
            .ok_or(TimelineError::UnknownEvent(target))?
            .bpm = bpm;
        if op.kind == OperationKind::Tempo {
            op.changed = bpm != initial.tempo;
        }
        trace!(%target, ?bpm, mode = ?op.mode, "tempo continue");

        match (op.mode, next) {
            (PreserveMode::KeepBeats, _) => self.recompute_mapping(),
            (PreserveMode::KeepTimes, _) => self.restitch(op, initial.time, None),
            (PreserveMode::KeepTimesAfter, Some(next)) => {
                self.restitch(op, initial.time, Some(next.time))
            }
            (PreserveMode::KeepTimesAfter, None) => {
                debug!(%target, "no control after target, keeping beats");
                self.recompute_mapping();
            }
        }
        Ok(())
    }

    // Stretch

    /// Start a stretch: the snap-grid tick `target_tick` (counted from the
    /// first beat) is dragged and the target's BPM follows.
    pub fn begin_stretch(
        &mut self,
        target: EventId,
        mode: PreserveMode,
        grid: f64,
        target_tick: f64,
    ) -> Result<()> {
        self.check_control(target)?;
        self.begin_operation(OperationKind::Stretch, mode, grid, Some(target), false)?;
        let reference = self.beat_to_time(self.tick_to_beat(target_tick, grid));
        if let Some(op) = self.operation.as_mut() {
            op.reference_time = Some(reference);
        }
        Ok(())
    }

    /// Move the reference tick `delta_time` seconds from its original time
    pub fn continue_stretch(&mut self, delta_time: f64, snapping: bool) -> Result<()> {
        self.with_operation(OperationKind::Stretch, |tl, op| {
            let (_, initial) = op.target_initial()?;
            let reference = op.reference_time.ok_or_else(|| {
                TimelineError::InvalidParameters("stretch has no reference tick".to_string())
            })?;
            let original_span = reference - initial.time;
            let new_span = reference + delta_time - initial.time;
            let bpm = if original_span.abs() < EPSILON {
                initial.bpm
            } else {
                initial.bpm * original_span / new_span
            };
            op.changed = delta_time != 0.0;
            tl.apply_tempo(op, Some(bpm), snapping)
        })
    }

    pub fn finish_stretch(&mut self, delta_time: f64, snapping: bool) -> Result<()> {
        self.continue_stretch(delta_time, snapping)?;
        self.finish_operation(OperationKind::Stretch)
    }
}
