use thiserror::Error;

use convoy_shared::{AnnotationId, ParticipantId, SessionCode};
use convoy_store::StoreError;

/// Top-level engine error.
#[derive(Error, Debug)]
pub enum ConvoyError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Position source error: {0}")]
    PositionSource(#[from] PositionSourceError),

    #[error("Simulation setup error: {0}")]
    SimulationSetup(#[from] SimulationSetupError),

    #[error("Invalid state: expected {expected}, was {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },
}

/// Rejected user input.  Surfaced immediately, blocks the action, never
/// retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Name required")]
    MissingName,

    #[error("Invalid session code: {0:?}")]
    InvalidCode(String),

    #[error("Room {0} not found! Check the code or host a new one")]
    RoomNotFound(SessionCode),

    #[error("Room {code} is full (max {capacity} participants)")]
    RoomFull { code: SessionCode, capacity: usize },

    #[error("Session code {0} is already hosted")]
    CodeTaken(SessionCode),

    #[error("Participant {0} leads this session and cannot join it as a guest")]
    LeaderIdentity(ParticipantId),

    #[error("Only the host can {0}")]
    NotHost(&'static str),

    #[error("Annotation text must not be empty")]
    EmptyText,

    #[error("Choose a map position before placing an annotation")]
    NotPlacing,

    #[error("Unknown annotation {0}")]
    UnknownAnnotation(AnnotationId),
}

/// The device denied or lost location.  Reported as a status message; the
/// session carries on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PositionSourceError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Position unavailable: {0}")]
    Unavailable(String),

    #[error("Timed out waiting for a position fix")]
    Timeout,
}

/// Geocoding or routing for a simulated drive failed.  Simulation is
/// disabled; the join proceeds without an automatic position source.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationSetupError {
    #[error("{0} not found")]
    PlaceNotFound(String),

    #[error("No route from {from} to {to}")]
    NoRoute { from: String, to: String },

    #[error("Route provider error: {0}")]
    Provider(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ConvoyError>;
