// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Error types for the timeline engine.

use thiserror::Error;

use crate::document::{DocumentError, EventId};
use crate::history::HistoryError;
use crate::timeline::OperationKind;

/// Errors raised by timeline queries, mutations and edit operations
#[derive(Error, Debug)]
pub enum TimelineError {
    /// Operation parameters violate the operation's contract
    #[error("Invalid operation parameters: {0}")]
    InvalidParameters(String),

    /// A `begin_*` call arrived while another operation is unfinished
    #[error("A {0} operation is already in progress")]
    OperationInProgress(OperationKind),

    /// A `continue_*`/`finish_*` call arrived with nothing in progress
    #[error("No operation is in progress")]
    NoOperation,

    /// A `continue_*`/`finish_*` call does not match the active operation
    #[error("Expected a {expected} operation, but a {active} operation is in progress")]
    OperationMismatch {
        expected: OperationKind,
        active: OperationKind,
    },

    /// Handle does not refer to a registered event
    #[error("Unknown event {0}")]
    UnknownEvent(EventId),

    /// Event exists but is not a tempo-control event
    #[error("Event {0} is not a tempo-control event")]
    NotTempoControl(EventId),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    History(#[from] HistoryError),
}

pub type Result<T> = std::result::Result<T, TimelineError>;
