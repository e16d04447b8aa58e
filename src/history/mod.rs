// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Undo/redo history.
//!
//! Every undo point is a full serialized snapshot of the level and chart,
//! passed through a pluggable codec. Restoring replaces the document
//! wholesale instead of patching it.

use std::fmt;
use std::io::{Read, Write};
use std::time::{Duration, Instant};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use thiserror::Error;

use crate::document::{Chart, Document, Level};

/// Default window within which same-kind saves are coalesced
pub const DEFAULT_COALESCE_WINDOW: Duration = Duration::from_secs(10);

/// Errors raised while saving or restoring snapshots
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("Snapshot serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Snapshot codec failed: {0}")]
    Codec(#[from] std::io::Error),

    #[error("Snapshot is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Encodes snapshot bytes for storage
pub trait SnapshotCodec: fmt::Debug {
    /// Short codec name for logs
    fn name(&self) -> &'static str;

    fn encode(&self, data: &[u8]) -> Result<Vec<u8>, HistoryError>;

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>, HistoryError>;
}

/// Gzip compression
#[derive(Debug, Clone, Copy)]
pub struct GzipCodec {
    level: Compression,
}

impl GzipCodec {
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl SnapshotCodec for GzipCodec {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn encode(&self, data: &[u8]) -> Result<Vec<u8>, HistoryError> {
        let mut encoder = GzEncoder::new(Vec::new(), self.level);
        encoder.write_all(data)?;
        Ok(encoder.finish()?)
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>, HistoryError> {
        let mut decoder = GzDecoder::new(data);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        Ok(out)
    }
}

/// Stores snapshots uncompressed
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainCodec;

impl SnapshotCodec for PlainCodec {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn encode(&self, data: &[u8]) -> Result<Vec<u8>, HistoryError> {
        Ok(data.to_vec())
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>, HistoryError> {
        Ok(data.to_vec())
    }
}

/// A saved document state
#[derive(Debug, Clone)]
pub struct UndoPoint {
    pub timestamp: Instant,
    /// What kind of edit produced this state (e.g. "setBPM")
    pub kind: String,
    pub level: Vec<u8>,
    pub chart: Vec<u8>,
}

/// A decoded undo point
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub level: Level,
    pub chart: Chart,
}

/// Linear undo history with a current index
#[derive(Debug)]
pub struct UndoHistory {
    points: Vec<UndoPoint>,
    current: Option<usize>,
    codec: Box<dyn SnapshotCodec>,
    coalesce_window: Duration,
    /// Maximum number of points kept; 0 keeps everything
    limit: usize,
}

impl Default for UndoHistory {
    fn default() -> Self {
        Self::new(Box::new(GzipCodec::default()))
    }
}

impl UndoHistory {
    /// Create an empty history using the given codec
    pub fn new(codec: Box<dyn SnapshotCodec>) -> Self {
        Self {
            points: Vec::new(),
            current: None,
            codec,
            coalesce_window: DEFAULT_COALESCE_WINDOW,
            limit: 0,
        }
    }

    /// Set the coalescing window
    pub fn with_coalesce_window(mut self, window: Duration) -> Self {
        self.coalesce_window = window;
        self
    }

    /// Cap the number of stored points; 0 means unlimited
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Save the document's current state
    pub fn save(&mut self, kind: &str, coalesce: bool, document: &Document) -> Result<(), HistoryError> {
        self.save_at(kind, coalesce, document, Instant::now())
    }

    /// Save with an explicit timestamp.
    ///
    /// With `coalesce`, if the current point and the one before it both have
    /// this `kind` and are younger than the coalescing window, the current
    /// point is replaced. This keeps the first and last state of a run of
    /// same-kind saves.
    pub fn save_at(
        &mut self,
        kind: &str,
        coalesce: bool,
        document: &Document,
        now: Instant,
    ) -> Result<(), HistoryError> {
        let level = self.codec.encode(&serde_json::to_vec(&document.to_level())?)?;
        let chart = self.codec.encode(&serde_json::to_vec(&document.to_chart())?)?;

        if coalesce {
            if let Some(i) = self.current.filter(|&i| i >= 1) {
                let recent = |p: &UndoPoint| now.duration_since(p.timestamp) < self.coalesce_window;
                let (prev, last) = (&self.points[i - 1], &self.points[i]);
                if prev.kind == kind && last.kind == kind && recent(prev) && recent(last) {
                    self.current = Some(i - 1);
                }
            }
        }

        let keep = self.current.map_or(0, |i| i + 1);
        self.points.truncate(keep);
        self.points.push(UndoPoint {
            timestamp: now,
            kind: kind.to_string(),
            level,
            chart,
        });

        if self.limit > 0 && self.points.len() > self.limit {
            let excess = self.points.len() - self.limit;
            self.points.drain(..excess);
        }
        self.current = Some(self.points.len() - 1);
        tracing::debug!(kind, points = self.points.len(), codec = self.codec.name(), "undo point saved");
        Ok(())
    }

    /// Whether an earlier point exists
    pub fn can_undo(&self) -> bool {
        self.current.map_or(false, |i| i > 0)
    }

    /// Whether a later point exists
    pub fn can_redo(&self) -> bool {
        self.current.map_or(false, |i| i + 1 < self.points.len())
    }

    /// Step back one point and return its snapshot
    pub fn undo(&mut self) -> Result<Option<Snapshot>, HistoryError> {
        match self.current {
            Some(i) if i > 0 => self.goto(i - 1).map(Some),
            _ => Ok(None),
        }
    }

    /// Step forward one point and return its snapshot
    pub fn redo(&mut self) -> Result<Option<Snapshot>, HistoryError> {
        match self.current {
            Some(i) if i + 1 < self.points.len() => self.goto(i + 1).map(Some),
            _ => Ok(None),
        }
    }

    fn goto(&mut self, index: usize) -> Result<Snapshot, HistoryError> {
        let snapshot = self.decode(&self.points[index])?;
        self.current = Some(index);
        Ok(snapshot)
    }

    fn decode(&self, point: &UndoPoint) -> Result<Snapshot, HistoryError> {
        let level = String::from_utf8(self.codec.decode(&point.level)?)?;
        let chart = String::from_utf8(self.codec.decode(&point.chart)?)?;
        Ok(Snapshot {
            level: serde_json::from_str(&level)?,
            chart: serde_json::from_str(&chart)?,
        })
    }

    /// Saved points, oldest first
    pub fn points(&self) -> &[UndoPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Index of the point matching the current document
    pub fn current_index(&self) -> Option<usize> {
        self.current
    }
}
