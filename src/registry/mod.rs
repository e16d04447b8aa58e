// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Event registry.
//!
//! Files every document event into the tempo-control, marker or static
//! bucket and keeps the `EventId -> TimelineEvent` lookup in sync with the
//! document's event lists.

use std::collections::HashMap;

use crate::document::{Document, Event, EventId};
use crate::mapping::{ControlPlacement, TempoControl};

/// Event types that define or redefine the tempo
pub const TEMPO_CONTROL_TYPES: &[&str] = &["play", "setBPM"];

/// Annotation event types. Markers are also filed as static events.
pub const MARKER_TYPES: &[&str] = &["tag", "bookmark", "showResults"];

/// Category an event is filed under, decided by its type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    TempoControl,
    Marker,
    Static,
}

impl EventCategory {
    /// Categorize an event type tag
    pub fn of(kind: &str) -> Self {
        if TEMPO_CONTROL_TYPES.contains(&kind) {
            EventCategory::TempoControl
        } else if MARKER_TYPES.contains(&kind) {
            EventCategory::Marker
        } else {
            EventCategory::Static
        }
    }
}

/// Selects one of the registry's buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    All,
    TempoControls,
    Markers,
    Statics,
}

/// Registry entry wrapping a document event
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineEvent {
    pub id: EventId,
    /// Whether the event lives in the chart rather than the level
    pub from_chart: bool,
    pub category: EventCategory,
    /// Effective beat; only meaningful for tempo controls
    pub real_beat: f64,
    /// Tempo control with no effect on the mapping
    pub skipped: bool,
}

/// Beat range covered by the document at initial load
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Boundaries {
    pub first_beat: f64,
    pub last_beat: f64,
}

impl Boundaries {
    fn extend(&mut self, beat: f64) {
        if beat < self.first_beat {
            self.first_beat = beat;
        }
        if beat > self.last_beat {
            self.last_beat = beat;
        }
    }
}

/// Categorized view over a document's events
#[derive(Debug, Clone, Default)]
pub struct EventRegistry {
    lookup: HashMap<EventId, TimelineEvent>,
    all: Vec<EventId>,
    controls: Vec<EventId>,
    markers: Vec<EventId>,
    statics: Vec<EventId>,
    boundaries: Boundaries,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an event and file it into its buckets.
    ///
    /// With `compute_boundaries`, the load boundaries grow to cover the
    /// event's beat and the end of its duration.
    pub fn register_event(
        &mut self,
        id: EventId,
        event: &Event,
        from_chart: bool,
        compute_boundaries: bool,
    ) -> TimelineEvent {
        let category = EventCategory::of(&event.kind);
        let entry = TimelineEvent {
            id,
            from_chart,
            category,
            real_beat: event.time,
            skipped: false,
        };
        self.lookup.insert(id, entry);
        self.all.push(id);
        match category {
            EventCategory::TempoControl => self.controls.push(id),
            EventCategory::Marker => {
                self.statics.push(id);
                self.markers.push(id);
            }
            EventCategory::Static => self.statics.push(id),
        }

        if compute_boundaries {
            self.boundaries.extend(event.time);
            if let Some(end) = event.end_beat() {
                self.boundaries.extend(end);
            }
        }
        entry
    }

    /// Rebuild every bucket from the document.
    ///
    /// Sorts the level and chart lists by beat first. Boundaries are reset
    /// only when `compute_boundaries` is set.
    pub fn load_events(&mut self, document: &mut Document, compute_boundaries: bool) {
        self.lookup.clear();
        self.all.clear();
        self.controls.clear();
        self.markers.clear();
        self.statics.clear();
        if compute_boundaries {
            self.boundaries = Boundaries::default();
        }

        document.sort_events();
        let level: Vec<EventId> = document.level_events().to_vec();
        let chart: Vec<EventId> = document.chart_events().to_vec();
        for (ids, from_chart) in [(level, false), (chart, true)] {
            for id in ids {
                if let Some(event) = document.event(id) {
                    self.register_event(id, event, from_chart, compute_boundaries);
                }
            }
        }
    }

    /// Remove an event from every bucket
    pub fn unregister(&mut self, id: EventId) -> Option<TimelineEvent> {
        let entry = self.lookup.remove(&id)?;
        self.all.retain(|e| *e != id);
        self.controls.retain(|e| *e != id);
        self.markers.retain(|e| *e != id);
        self.statics.retain(|e| *e != id);
        Some(entry)
    }

    pub fn get(&self, id: EventId) -> Option<&TimelineEvent> {
        self.lookup.get(&id)
    }

    pub fn contains(&self, id: EventId) -> bool {
        self.lookup.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    /// Handles in a bucket
    pub fn bucket(&self, bucket: Bucket) -> &[EventId] {
        match bucket {
            Bucket::All => &self.all,
            Bucket::TempoControls => &self.controls,
            Bucket::Markers => &self.markers,
            Bucket::Statics => &self.statics,
        }
    }

    pub fn all_events(&self) -> &[EventId] {
        &self.all
    }

    pub fn tempo_controls(&self) -> &[EventId] {
        &self.controls
    }

    pub fn markers(&self) -> &[EventId] {
        &self.markers
    }

    pub fn statics(&self) -> &[EventId] {
        &self.statics
    }

    pub fn boundaries(&self) -> Boundaries {
        self.boundaries
    }

    /// The tempo control following `id` in registry order
    pub fn control_after(&self, id: EventId) -> Option<EventId> {
        let pos = self.controls.iter().position(|c| *c == id)?;
        self.controls.get(pos + 1).copied()
    }

    /// Mapping inputs for every registered tempo control
    pub fn tempo_control_inputs(&self, document: &Document) -> Vec<TempoControl> {
        self.controls
            .iter()
            .filter_map(|&id| {
                document.event(id).map(|event| TempoControl {
                    id,
                    beat: event.time,
                    bpm: event.bpm,
                })
            })
            .collect()
    }

    /// Record where mapping computation placed each control, then order the
    /// control bucket by effective beat.
    pub fn apply_placements(&mut self, placements: &[ControlPlacement]) {
        for placement in placements {
            if let Some(entry) = self.lookup.get_mut(&placement.id) {
                entry.real_beat = placement.real_beat;
                entry.skipped = placement.skipped;
            }
        }
        let lookup = &self.lookup;
        let real_beat = |id: &EventId| lookup.get(id).map(|e| e.real_beat).unwrap_or_default();
        self.controls
            .sort_by(|a, b| real_beat(a).total_cmp(&real_beat(b)));
    }

    /// Re-sort the all, marker and static buckets by the events' current
    /// beats. The control bucket follows `apply_placements` instead.
    pub fn sort_by_beat(&mut self, document: &Document) {
        let beat = |id: &EventId| document.event(*id).map(|e| e.time).unwrap_or_default();
        for ids in [&mut self.all, &mut self.markers, &mut self.statics] {
            ids.sort_by(|a, b| beat(a).total_cmp(&beat(b)));
        }
    }
}
