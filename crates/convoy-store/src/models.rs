//! Strict record types for the documents held by the store.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to a UI layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use convoy_shared::{AnnotationId, Color, GeoPoint, ParticipantId, SessionCode};

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A convoy trip instance, created by its host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    /// Short human-typed code.
    pub code: SessionCode,
    /// The participant that created the session and leads it.
    pub host_id: ParticipantId,
    /// When the host created the session.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Participant
// ---------------------------------------------------------------------------

/// A participant document as read from the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    /// Stable per-device identity.
    pub id: ParticipantId,
    /// Human-readable callsign.
    pub display_name: String,
    /// Marker colour.
    pub color: Color,
    /// Whether this participant leads the session.
    pub is_leader: bool,
    /// Last published position.
    pub position: GeoPoint,
    /// Store timestamp of the last accepted write.  Never moves backwards.
    pub last_active: DateTime<Utc>,
    /// Recorded travel trail.  `Some` only for the leader.
    pub trail: Option<Vec<GeoPoint>>,
}

/// The record a participant writes when joining (an upsert).
///
/// `last_active` is stamped by the store, and any previous trail is reset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewParticipant {
    pub id: ParticipantId,
    pub display_name: String,
    pub color: Color,
    pub is_leader: bool,
    pub position: GeoPoint,
}

/// One accepted position sample: the new position and, for the leader, the
/// trail point to append.  Written as a single document update.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PositionUpdate {
    pub position: GeoPoint,
    pub trail_point: Option<GeoPoint>,
}

// ---------------------------------------------------------------------------
// Annotation
// ---------------------------------------------------------------------------

/// A host-placed point note visible to all participants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Annotation {
    /// Store-generated identifier.
    pub id: AnnotationId,
    /// Where the note is pinned.
    pub position: GeoPoint,
    /// Note text, never empty.
    pub text: String,
    /// When the note was created.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Cleanup
// ---------------------------------------------------------------------------

/// What an atomic session teardown removed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CleanupSummary {
    pub participants: usize,
    pub trail_points: usize,
    pub annotations: usize,
    pub session_removed: bool,
}
