use thiserror::Error;

/// A stored document or user-supplied value failed to coerce into its
/// strict record type.
///
/// Missing or malformed fields are always reported, never defaulted, so that
/// corrupted documents stay visible.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid colour: {0:?} (expected #rrggbb)")]
    InvalidColor(String),

    #[error("Invalid coordinate: lat {lat}, lng {lng}")]
    InvalidCoordinate { lat: f64, lng: f64 },

    #[error("Invalid session code: {0:?}")]
    InvalidSessionCode(String),

    #[error("Invalid participant id: {0:?}")]
    InvalidParticipantId(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(i64),

    #[error("Invalid {field}: {reason}")]
    Malformed { field: &'static str, reason: String },
}
