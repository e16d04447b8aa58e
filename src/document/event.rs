// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Level and chart events.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single level or chart event.
///
/// Only the fields the timing engine reasons about are typed. Everything
/// else the level format defines for a given `type` is carried verbatim in
/// `extra` so documents round-trip unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Event type tag (e.g. "play", "setBPM", "block")
    #[serde(rename = "type")]
    pub kind: String,
    /// Position in beats
    #[serde(default)]
    pub time: f64,
    /// Angle in degrees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle: Option<f64>,
    /// Length in beats; may be negative
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Tempo set by this event. `None` inherits the previous segment's tempo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpm: Option<f64>,
    /// Type-specific fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Event {
    /// Create an event of the given type at a beat
    pub fn new(kind: impl Into<String>, time: f64) -> Self {
        Self {
            kind: kind.into(),
            time,
            angle: None,
            duration: None,
            bpm: None,
            extra: Map::new(),
        }
    }

    /// Set the tempo field
    pub fn with_bpm(mut self, bpm: f64) -> Self {
        self.bpm = Some(bpm);
        self
    }

    /// Set the duration field
    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Set the angle field
    pub fn with_angle(mut self, angle: f64) -> Self {
        self.angle = Some(angle);
        self
    }

    /// Set a type-specific field
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Beat at which the event ends, if it has a duration
    pub fn end_beat(&self) -> Option<f64> {
        self.duration.map(|d| self.time + d)
    }

    /// One-line human readable summary, optionally prefixed with an index
    pub fn describe(&self, index: Option<usize>) -> String {
        let idx = index.map(|i| format!("[{}] ", i)).unwrap_or_default();
        let bpm = self
            .bpm
            .map(|b| format!("(bpm->{:.2}) ", b))
            .unwrap_or_default();
        let angle = self
            .angle
            .map(|a| format!("{:.1}", a))
            .unwrap_or_else(|| "-".to_string());
        let duration = self
            .duration
            .map(|d| format!(" (duration:{})", d))
            .unwrap_or_default();
        format!(
            "{}{}: {}(ang: {}) (beat: {}){}",
            idx, self.kind, bpm, angle, self.time, duration
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe(None))
    }
}
