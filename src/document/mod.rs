// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Level and chart documents.
//!
//! This module provides:
//! - The level/chart JSON shape (`Level`, `Chart`, `LevelProperties`)
//! - `Document`, an arena of events addressed by stable `EventId` handles
//! - Format version validation and scaffold generation for new levels

pub mod event;

pub use event::Event;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Level format versions this engine understands
pub const SUPPORTED_FORMAT_VERSIONS: &[i64] = &[14];

/// Errors raised while reading or writing documents
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Invalid level JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported level format version {0}")]
    UnsupportedVersion(i64),

    #[error("Chart is stored as an opaque blob and cannot hold events")]
    UnstructuredChart,
}

/// Level-wide properties
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LevelProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatversion: Option<i64>,
    /// Lead-in before beat 0; the first beat is `-offset` unless `startingBeat` is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Explicit first beat; wins over `offset`
    #[serde(rename = "startingBeat", default, skip_serializing_if = "Option::is_none")]
    pub starting_beat: Option<f64>,
    /// Tempo controls before this beat take effect at the first beat
    #[serde(rename = "loadBeat", default, skip_serializing_if = "Option::is_none")]
    pub load_beat: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Serialized level: properties plus its event list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Level {
    pub properties: LevelProperties,
    #[serde(default)]
    pub events: Vec<Event>,
}

/// Serialized chart. Older format versions store the chart as a string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Chart {
    Events(Vec<Event>),
    Blob(String),
}

impl Default for Chart {
    fn default() -> Self {
        Chart::Events(Vec::new())
    }
}

/// Stable handle to an event in a `Document`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u32);

impl EventId {
    pub(crate) fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw arena index
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
enum ChartEvents {
    Events(Vec<EventId>),
    Blob(String),
}

/// In-memory level + chart.
///
/// Events live in an arena; the level and chart lists hold handles in beat
/// order. Removing an event leaves a hole so every other handle stays valid.
#[derive(Debug, Clone)]
pub struct Document {
    properties: LevelProperties,
    slots: Vec<Option<Event>>,
    level_events: Vec<EventId>,
    chart: ChartEvents,
}

impl Document {
    /// Build a document from already-parsed level and chart data
    pub fn from_parts(level: Level, chart: Chart) -> Self {
        let mut doc = Self {
            properties: level.properties,
            slots: Vec::new(),
            level_events: Vec::new(),
            chart: match chart {
                Chart::Events(_) => ChartEvents::Events(Vec::new()),
                Chart::Blob(ref s) => ChartEvents::Blob(s.clone()),
            },
        };
        for event in level.events {
            let id = doc.alloc(event);
            doc.level_events.push(id);
        }
        if let Chart::Events(events) = chart {
            for event in events {
                let id = doc.alloc(event);
                if let ChartEvents::Events(ids) = &mut doc.chart {
                    ids.push(id);
                }
            }
        }
        doc
    }

    /// Parse level and chart JSON, rejecting unsupported format versions
    pub fn from_json(level_json: &str, chart_json: &str) -> Result<Self, DocumentError> {
        let level: Level = serde_json::from_str(level_json)?;
        let chart: Chart = serde_json::from_str(chart_json)?;
        validate_level(&level)?;
        Ok(Self::from_parts(level, chart))
    }

    /// Fresh level for an audio file of the given length: a `play` event at
    /// beat 0 and a `showResults` marker at the end of the track.
    pub fn scaffold(audio_file: &str, duration_secs: f64) -> Self {
        let play = Event::new("play", 0.0)
            .with_angle(0.0)
            .with_field("file", audio_file)
            .with_field("volume", 1);
        // Scaffolds play at 100 BPM, so one second is 100/60 beats.
        let results = Event::new("showResults", duration_secs * (100.0 / 60.0)).with_angle(0.0);
        let level = Level {
            properties: LevelProperties {
                formatversion: Some(14),
                offset: Some(8.0),
                speed: Some(70.0),
                ..Default::default()
            },
            events: vec![play, results],
        };
        Self::from_parts(level, Chart::default())
    }

    fn alloc(&mut self, event: Event) -> EventId {
        let id = EventId::from_raw(self.slots.len() as u32);
        self.slots.push(Some(event));
        id
    }

    /// Level properties
    pub fn properties(&self) -> &LevelProperties {
        &self.properties
    }

    /// Mutable level properties
    pub fn properties_mut(&mut self) -> &mut LevelProperties {
        &mut self.properties
    }

    /// Look up an event by handle
    pub fn event(&self, id: EventId) -> Option<&Event> {
        self.slots.get(id.index()).and_then(|slot| slot.as_ref())
    }

    /// Look up an event by handle for mutation
    pub fn event_mut(&mut self, id: EventId) -> Option<&mut Event> {
        self.slots.get_mut(id.index()).and_then(|slot| slot.as_mut())
    }

    /// Handles of the level's events in list order
    pub fn level_events(&self) -> &[EventId] {
        &self.level_events
    }

    /// Handles of the chart's events in list order (empty for blob charts)
    pub fn chart_events(&self) -> &[EventId] {
        match &self.chart {
            ChartEvents::Events(ids) => ids,
            ChartEvents::Blob(_) => &[],
        }
    }

    /// Whether the chart holds a structured event list
    pub fn has_structured_chart(&self) -> bool {
        matches!(self.chart, ChartEvents::Events(_))
    }

    /// Number of live events
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Whether the document has no events
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add an event to the level or the chart and return its handle
    pub fn insert(&mut self, event: Event, to_chart: bool) -> Result<EventId, DocumentError> {
        if to_chart && !self.has_structured_chart() {
            return Err(DocumentError::UnstructuredChart);
        }
        let id = self.alloc(event);
        if to_chart {
            if let ChartEvents::Events(ids) = &mut self.chart {
                ids.push(id);
            }
        } else {
            self.level_events.push(id);
        }
        self.sort_events();
        Ok(id)
    }

    /// Remove an event, returning it if it was present
    pub fn remove(&mut self, id: EventId) -> Option<Event> {
        let event = self.slots.get_mut(id.index())?.take()?;
        self.level_events.retain(|e| *e != id);
        if let ChartEvents::Events(ids) = &mut self.chart {
            ids.retain(|e| *e != id);
        }
        Some(event)
    }

    /// Stable-sort the level and chart lists by beat
    pub fn sort_events(&mut self) {
        let slots = &self.slots;
        let beat = |id: &EventId| {
            slots[id.index()]
                .as_ref()
                .map(|e| e.time)
                .unwrap_or_default()
        };
        self.level_events.sort_by(|a, b| beat(a).total_cmp(&beat(b)));
        if let ChartEvents::Events(ids) = &mut self.chart {
            ids.sort_by(|a, b| beat(a).total_cmp(&beat(b)));
        }
    }

    /// Serializable copy of the level
    pub fn to_level(&self) -> Level {
        Level {
            properties: self.properties.clone(),
            events: self.collect(&self.level_events),
        }
    }

    /// Serializable copy of the chart
    pub fn to_chart(&self) -> Chart {
        match &self.chart {
            ChartEvents::Events(ids) => Chart::Events(self.collect(ids)),
            ChartEvents::Blob(s) => Chart::Blob(s.clone()),
        }
    }

    fn collect(&self, ids: &[EventId]) -> Vec<Event> {
        ids.iter().filter_map(|id| self.event(*id).cloned()).collect()
    }

    /// Level and chart as JSON strings
    pub fn to_json(&self) -> Result<(String, String), DocumentError> {
        let level = serde_json::to_string(&self.to_level())?;
        let chart = serde_json::to_string(&self.to_chart())?;
        Ok((level, chart))
    }
}

/// Check that a level uses a supported format version
pub fn validate_level(level: &Level) -> Result<(), DocumentError> {
    let version = level.properties.formatversion.unwrap_or(-1);
    if !SUPPORTED_FORMAT_VERSIONS.contains(&version) {
        return Err(DocumentError::UnsupportedVersion(version));
    }
    Ok(())
}
