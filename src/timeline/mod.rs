// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! The editing session.
//!
//! A [`Timeline`] owns one document together with everything derived from
//! it: the event registry, the current mapping, the undo history and at most
//! one in-flight edit operation. Every query and mutation goes through it.

mod notify;
mod operation;
mod range;
mod restitch;

use std::sync::mpsc::{channel, Receiver};

use tracing::{debug, info};

pub use notify::{OperationNotice, Remap, TimeBeat};
pub use operation::{
    phase_locked_bpm, snap_to_grid, InitialState, OperationKind, OperationState, PreserveMode,
};
pub use range::{RangeEdge, SelectionPoint};

use crate::config::EditorConfig;
use crate::document::{Document, Event, EventId};
use crate::error::{Result, TimelineError};
use crate::history::UndoHistory;
use crate::mapping::{compute_mapping, ComputedMapping, Mapping, StartData, TempoControl};
use crate::registry::{Boundaries, Bucket, EventCategory, EventRegistry, TimelineEvent};
use notify::Listeners;

/// Denominators smaller than this are treated as zero
pub(crate) const EPSILON: f64 = 1e-9;

/// One document being edited
#[derive(Debug)]
pub struct Timeline {
    document: Document,
    registry: EventRegistry,
    mapping: Mapping,
    start: StartData,
    /// Time of the first beat seen at load
    first_time: f64,
    /// Time of the last beat seen at load
    last_time: f64,
    history: UndoHistory,
    operation: Option<OperationState>,
    listeners: Listeners,
}

impl Timeline {
    /// Open a document with default editor settings
    pub fn new(document: Document) -> Result<Self> {
        Self::with_history(document, EditorConfig::default().build_history())
    }

    /// Open a document using the history settings from `config`
    pub fn with_config(document: Document, config: &EditorConfig) -> Result<Self> {
        Self::with_history(document, config.build_history())
    }

    /// Open a document with a caller-built history.
    ///
    /// Loads the registry, computes the boundaries and saves the initial
    /// undo point.
    pub fn with_history(document: Document, history: UndoHistory) -> Result<Self> {
        let mut timeline = Self {
            document,
            registry: EventRegistry::new(),
            mapping: Mapping::default(),
            start: StartData::default(),
            first_time: 0.0,
            last_time: 0.0,
            history,
            operation: None,
            listeners: Listeners::default(),
        };
        timeline.load_events(true);
        timeline.save_undo_point("initial", false)?;

        let bounds = timeline.registry.boundaries();
        timeline.first_time = timeline.mapping.beat_to_time(bounds.first_beat);
        timeline.last_time = timeline.mapping.beat_to_time(bounds.last_beat);

        info!(
            events = timeline.registry.len(),
            tempo_controls = timeline.registry.tempo_controls().len(),
            first_time = timeline.first_time,
            last_time = timeline.last_time,
            "timeline loaded"
        );
        Ok(timeline)
    }

    /// Rebuild the registry from the document and recompute the mapping
    fn load_events(&mut self, compute_boundaries: bool) {
        self.registry.load_events(&mut self.document, compute_boundaries);
        self.recompute_mapping();
    }

    /// Recompute the mapping from the current tempo controls
    pub(crate) fn recompute_mapping(&mut self) {
        let computed = self.compute(None);
        self.registry.apply_placements(&computed.placements);
        self.start = StartData::from_properties(self.document.properties());
        self.mapping = computed.mapping;
    }

    fn compute(&self, stop_at: Option<EventId>) -> ComputedMapping {
        let start = StartData::from_properties(self.document.properties());
        compute_mapping(&start, &self.registry.tempo_control_inputs(&self.document), stop_at)
    }

    /// Mapping as it stands just before `control` takes effect
    pub fn mapping_before(&self, control: EventId) -> Mapping {
        self.compute(Some(control)).mapping
    }

    /// Mapping for an arbitrary control set under this document's start data
    pub fn mapping_for(&self, controls: &[TempoControl]) -> Mapping {
        let start = StartData::from_properties(self.document.properties());
        compute_mapping(&start, controls, None).mapping
    }

    // Queries

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn registry(&self) -> &EventRegistry {
        &self.registry
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    pub fn start_data(&self) -> StartData {
        self.start
    }

    pub fn boundaries(&self) -> Boundaries {
        self.registry.boundaries()
    }

    pub fn history(&self) -> &UndoHistory {
        &self.history
    }

    /// The in-flight operation, if any
    pub fn operation(&self) -> Option<&OperationState> {
        self.operation.as_ref()
    }

    pub fn event(&self, id: EventId) -> Option<&Event> {
        self.document.event(id)
    }

    pub fn timeline_event(&self, id: EventId) -> Option<&TimelineEvent> {
        self.registry.get(id)
    }

    pub fn control_after(&self, id: EventId) -> Option<EventId> {
        self.registry.control_after(id)
    }

    pub fn beat_to_time(&self, beat: f64) -> f64 {
        self.mapping.beat_to_time(beat)
    }

    pub fn time_to_beat(&self, time: f64) -> f64 {
        self.mapping.time_to_beat(time)
    }

    pub fn beat_to_bpm(&self, beat: f64) -> f64 {
        self.mapping.beat_to_bpm(beat)
    }

    pub fn time_to_bpm(&self, time: f64) -> f64 {
        self.mapping.time_to_bpm(time)
    }

    /// Time of an event's beat under the current mapping
    pub fn event_time(&self, id: EventId) -> Option<f64> {
        self.document.event(id).map(|e| self.mapping.beat_to_time(e.time))
    }

    /// Beat of a snap-grid tick counted from the first beat
    pub fn tick_to_beat(&self, tick: f64, grid: f64) -> f64 {
        tick / grid + self.start.true_first_beat
    }

    /// Time as a 0-100 position between the first and last time seen at load
    pub fn time_to_rel(&self, time: f64) -> f64 {
        let span = self.last_time - self.first_time;
        if span.abs() < EPSILON {
            return 0.0;
        }
        (time - self.first_time) / span * 100.0
    }

    /// Inverse of [`Timeline::time_to_rel`]
    pub fn rel_to_time(&self, rel: f64) -> f64 {
        rel / 100.0 * (self.last_time - self.first_time) + self.first_time
    }

    /// Events in a bucket whose time lies within `threshold / 2` of `time`
    pub fn events_near_time(&self, bucket: Bucket, time: f64, threshold: f64) -> Vec<EventId> {
        let half = threshold.abs() / 2.0;
        self.events_in_time_range(bucket, time - half, time + half)
    }

    /// Events in a bucket whose time lies in `[start, end]`
    pub fn events_in_time_range(&self, bucket: Bucket, start: f64, end: f64) -> Vec<EventId> {
        self.registry
            .bucket(bucket)
            .iter()
            .copied()
            .filter(|&id| {
                self.event_time(id)
                    .map_or(false, |t| t >= start && t <= end)
            })
            .collect()
    }

    // Mutations

    fn ensure_idle(&self) -> Result<()> {
        match &self.operation {
            Some(op) => Err(TimelineError::OperationInProgress(op.kind())),
            None => Ok(()),
        }
    }

    /// Add an event to the level or chart
    pub fn add_event(&mut self, event: Event, to_chart: bool, save: bool) -> Result<EventId> {
        self.ensure_idle()?;
        let id = self.document.insert(event, to_chart)?;
        let entry = match self.document.event(id) {
            Some(event) => self.registry.register_event(id, event, to_chart, false),
            None => return Err(TimelineError::UnknownEvent(id)),
        };
        self.registry.sort_by_beat(&self.document);
        if entry.category == EventCategory::TempoControl {
            self.recompute_mapping();
        }
        debug!(%id, category = ?entry.category, "event added");
        if save {
            self.save_undo_point("addEvent", false)?;
        }
        Ok(id)
    }

    /// Remove an event and return it
    pub fn delete_event(&mut self, id: EventId, save: bool) -> Result<Event> {
        self.ensure_idle()?;
        let entry = self
            .registry
            .unregister(id)
            .ok_or(TimelineError::UnknownEvent(id))?;
        let event = self
            .document
            .remove(id)
            .ok_or(TimelineError::UnknownEvent(id))?;
        if entry.category == EventCategory::TempoControl {
            self.recompute_mapping();
        }
        debug!(%id, kind = %event.kind, "event deleted");
        if save {
            self.save_undo_point("deleteEvent", false)?;
        }
        Ok(event)
    }

    /// Set or clear the level's starting beat
    pub fn set_start_beat(&mut self, beat: Option<f64>, save: bool) -> Result<()> {
        self.ensure_idle()?;
        self.document.properties_mut().starting_beat = beat;
        self.property_changed("startBeat", save)
    }

    /// Set or clear the level's audio offset
    pub fn set_offset(&mut self, offset: Option<f64>, save: bool) -> Result<()> {
        self.ensure_idle()?;
        self.document.properties_mut().offset = offset;
        self.property_changed("offset", save)
    }

    /// Set or clear the level's load beat
    pub fn set_load_beat(&mut self, beat: Option<f64>, save: bool) -> Result<()> {
        self.ensure_idle()?;
        self.document.properties_mut().load_beat = beat;
        self.property_changed("loadBeat", save)
    }

    fn property_changed(&mut self, kind: &str, save: bool) -> Result<()> {
        self.recompute_mapping();
        debug!(kind, first_beat = self.start.true_first_beat, "level property changed");
        if save {
            self.save_undo_point(kind, true)?;
        }
        Ok(())
    }

    // History

    /// Snapshot the document into the undo history
    pub fn save_undo_point(&mut self, kind: &str, coalesce: bool) -> Result<()> {
        self.history.save(kind, coalesce, &self.document)?;
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Restore the previous undo point. Returns false at the start of
    /// history. Every `EventId` obtained before the call is invalidated.
    pub fn undo(&mut self) -> Result<bool> {
        self.ensure_idle()?;
        match self.history.undo()? {
            Some(snapshot) => {
                self.restore(snapshot.level, snapshot.chart);
                info!(index = ?self.history.current_index(), "undo");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Restore the next undo point. Returns false at the end of history.
    /// Every `EventId` obtained before the call is invalidated.
    pub fn redo(&mut self) -> Result<bool> {
        self.ensure_idle()?;
        match self.history.redo()? {
            Some(snapshot) => {
                self.restore(snapshot.level, snapshot.chart);
                info!(index = ?self.history.current_index(), "redo");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn restore(&mut self, level: crate::document::Level, chart: crate::document::Chart) {
        self.document = Document::from_parts(level, chart);
        self.load_events(false);
    }

    // Notifications

    /// Receive a notice for every operation begin, continue, finish and cancel
    pub fn subscribe(&mut self) -> Receiver<OperationNotice> {
        let (tx, rx) = channel();
        self.listeners.add(tx);
        rx
    }

    fn notify(&mut self, notice: OperationNotice) {
        self.listeners.send(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Chart, Level, LevelProperties};

    const EPS: f64 = 1e-9;

    fn timeline() -> Timeline {
        let level = Level {
            properties: LevelProperties::default(),
            events: vec![
                Event::new("play", 0.0).with_bpm(120.0),
                Event::new("setBPM", 16.0).with_bpm(90.0),
                Event::new("block", 4.0),
                Event::new("bookmark", 8.0),
                Event::new("hold", 20.0).with_duration(4.0),
            ],
        };
        Timeline::new(Document::from_parts(level, Chart::default())).unwrap()
    }

    #[test]
    fn test_load_builds_mapping_and_history() {
        let tl = timeline();
        assert_eq!(tl.registry().len(), 5);
        assert!((tl.beat_to_time(16.0) - 8.0).abs() < EPS);
        assert!((tl.time_to_beat(2.0) - 4.0).abs() < EPS);
        assert_eq!(tl.beat_to_bpm(17.0), 90.0);
        assert_eq!(tl.history().len(), 1);
        assert!(!tl.can_undo());
    }

    #[test]
    fn test_rel_conversions() {
        let tl = timeline();
        // Boundaries run from beat 0 to the hold's end at beat 24
        let last = tl.beat_to_time(24.0);
        assert!((tl.time_to_rel(0.0)).abs() < EPS);
        assert!((tl.time_to_rel(last) - 100.0).abs() < EPS);
        assert!((tl.rel_to_time(50.0) - last / 2.0).abs() < EPS);
    }

    #[test]
    fn test_rel_with_empty_span() {
        let tl = Timeline::new(Document::from_parts(Level::default(), Chart::default())).unwrap();
        assert_eq!(tl.time_to_rel(5.0), 0.0);
        assert_eq!(tl.rel_to_time(50.0), 0.0);
    }

    #[test]
    fn test_events_near_time() {
        let tl = timeline();
        let near = tl.events_near_time(Bucket::Statics, 2.0, 0.5);
        assert_eq!(near.len(), 1);
        assert_eq!(tl.event(near[0]).unwrap().kind, "block");

        let markers = tl.events_in_time_range(Bucket::Markers, 0.0, 10.0);
        assert_eq!(markers.len(), 1);
        assert!(tl.events_in_time_range(Bucket::All, 100.0, 200.0).is_empty());
    }

    #[test]
    fn test_tick_to_beat() {
        let mut tl = timeline();
        tl.set_offset(Some(2.0), false).unwrap();
        assert_eq!(tl.tick_to_beat(8.0, 4.0), 0.0);
        assert_eq!(tl.start_data().true_first_beat, -2.0);
    }

    #[test]
    fn test_add_and_delete_control() {
        let mut tl = timeline();
        let id = tl
            .add_event(Event::new("setBPM", 8.0).with_bpm(60.0), false, true)
            .unwrap();
        assert!((tl.beat_to_time(10.0) - 6.0).abs() < EPS);
        assert_eq!(tl.control_after(id).map(|c| tl.event(c).unwrap().time), Some(16.0));
        assert_eq!(tl.history().len(), 2);

        let removed = tl.delete_event(id, true).unwrap();
        assert_eq!(removed.bpm, Some(60.0));
        assert!((tl.beat_to_time(10.0) - 5.0).abs() < EPS);
        assert!(matches!(
            tl.delete_event(id, false),
            Err(TimelineError::UnknownEvent(_))
        ));
    }

    #[test]
    fn test_mapping_for_and_before() {
        let tl = timeline();
        let inputs = tl.registry().tempo_control_inputs(tl.document());
        assert_eq!(&tl.mapping_for(&inputs), tl.mapping());

        // Dropping the second control leaves 120 BPM in effect past beat 16
        let first_only = tl.mapping_for(&inputs[..1]);
        assert!((first_only.beat_to_time(20.0) - 10.0).abs() < EPS);
        assert_eq!(tl.mapping_before(inputs[1].id), first_only);
    }

    #[test]
    fn test_property_edits_coalesce() {
        let mut tl = timeline();
        for offset in [1.0, 2.0, 3.0] {
            tl.set_offset(Some(offset), true).unwrap();
        }
        assert_eq!(tl.history().len(), 3);
        assert_eq!(tl.start_data().true_first_beat, -3.0);

        tl.undo().unwrap();
        assert_eq!(tl.document().properties().offset, Some(1.0));
    }

    #[test]
    fn test_undo_redo_rebuilds_registry() {
        let mut tl = timeline();
        tl.add_event(Event::new("block", 30.0), false, true).unwrap();
        assert_eq!(tl.registry().len(), 6);

        assert!(tl.undo().unwrap());
        assert_eq!(tl.registry().len(), 5);
        assert!(!tl.undo().unwrap());

        assert!(tl.redo().unwrap());
        assert_eq!(tl.registry().len(), 6);
        assert!(!tl.redo().unwrap());
        // Boundaries stay as loaded
        assert_eq!(tl.boundaries().last_beat, 24.0);
    }
}
