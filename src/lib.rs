// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Beat/time mapping engine for rhythm-game level editing.
//!
//! Levels place events on beats while the audio runs in seconds. The
//! [`Timeline`] keeps the two in step: it derives a monotone beat/time
//! mapping from the level's tempo-control events and offers interactive
//! edit operations that decide, per gesture, whether the rest of the level
//! keeps its beats or its times.

pub mod config;
pub mod document;
pub mod error;
pub mod history;
pub mod mapping;
pub mod registry;
pub mod timeline;

pub use config::EditorConfig;
pub use document::{Chart, Document, DocumentError, Event, EventId, Level, LevelProperties};
pub use error::{Result, TimelineError};
pub use history::{GzipCodec, HistoryError, PlainCodec, SnapshotCodec, UndoHistory};
pub use mapping::{Mapping, StartData, TimeBeatPoint};
pub use registry::{Bucket, EventCategory, EventRegistry, TimelineEvent};
pub use timeline::{
    OperationKind, OperationNotice, PreserveMode, RangeEdge, Remap, SelectionPoint, TimeBeat,
    Timeline,
};
