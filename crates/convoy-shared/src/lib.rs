//! # convoy-shared
//!
//! Strongly typed building blocks shared by every Convoy crate: participant
//! and session identifiers, the fixed colour palette, geographic points with
//! great-circle distance, tuning constants and the decode error raised when a
//! stored document does not match its strict record shape.

pub mod constants;
pub mod error;
pub mod geo;
pub mod types;

pub use error::DecodeError;
pub use geo::{haversine_km, BoundingBox, GeoPoint};
pub use types::{AnnotationId, Color, PaletteColor, ParticipantId, SessionCode, PALETTE};
