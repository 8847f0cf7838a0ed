//! Viewport control.
//!
//! The camera is always in exactly one of three modes.  In auto-follow it
//! pans to every own-position update.  Focusing on a participant frames
//! that participant together with the user once.  Manual-free leaves the
//! viewport alone.  The controller is a pure state machine: it consumes
//! [`CameraEvent`]s and emits at most one [`CameraCommand`] per event for the
//! rendering layer to execute.

use serde::Serialize;

use convoy_shared::{BoundingBox, GeoPoint, ParticipantId};

use crate::config::Tuning;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CameraMode {
    AutoFollow,
    FocusedOnParticipant(ParticipantId),
    ManualFree,
}

impl CameraMode {
    pub fn name(&self) -> &'static str {
        match self {
            CameraMode::AutoFollow => "auto-follow",
            CameraMode::FocusedOnParticipant(_) => "focused",
            CameraMode::ManualFree => "manual",
        }
    }
}

/// Inputs the camera reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum CameraEvent {
    /// The user picked a participant on the map or in the roster.
    ParticipantSelected { id: ParticipantId, position: GeoPoint },
    SelectionDismissed,
    /// The user dragged the map.
    DragStarted,
    /// One-shot "locate me".
    LocateRequested,
    FollowToggled,
    OwnPositionChanged(GeoPoint),
    /// A participant left the session.
    ParticipantRemoved(ParticipantId),
}

/// Instructions for the map renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CameraCommand {
    PanTo(GeoPoint),
    FitBounds(BoundingBox),
    FlyTo { target: GeoPoint, zoom: u8 },
}

/// What the UI needs to render the follow toggle and selection highlight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CameraState {
    pub follow_enabled: bool,
    pub focus_target: Option<ParticipantId>,
}

#[derive(Debug, Clone)]
pub struct CameraController {
    self_id: ParticipantId,
    mode: CameraMode,
    own_position: GeoPoint,
    locate_zoom: u8,
}

impl CameraController {
    /// Starts in auto-follow.
    pub fn new(self_id: ParticipantId, own_position: GeoPoint, tuning: &Tuning) -> Self {
        Self {
            self_id,
            mode: CameraMode::AutoFollow,
            own_position,
            locate_zoom: tuning.locate_zoom,
        }
    }

    pub fn mode(&self) -> &CameraMode {
        &self.mode
    }

    pub fn state(&self) -> CameraState {
        CameraState {
            follow_enabled: self.mode == CameraMode::AutoFollow,
            focus_target: match &self.mode {
                CameraMode::FocusedOnParticipant(id) => Some(id.clone()),
                _ => None,
            },
        }
    }

    pub fn handle(&mut self, event: CameraEvent) -> Option<CameraCommand> {
        match event {
            CameraEvent::ParticipantSelected { id, position } => {
                // Selecting yourself is a no-op.
                if id == self.self_id {
                    return None;
                }
                let frame = BoundingBox::from_points([&self.own_position, &position])?;
                self.mode = CameraMode::FocusedOnParticipant(id);
                Some(CameraCommand::FitBounds(frame))
            }
            CameraEvent::SelectionDismissed => {
                if matches!(self.mode, CameraMode::FocusedOnParticipant(_)) {
                    self.mode = CameraMode::ManualFree;
                }
                None
            }
            CameraEvent::DragStarted => {
                self.mode = CameraMode::ManualFree;
                None
            }
            CameraEvent::LocateRequested => {
                self.mode = CameraMode::AutoFollow;
                Some(CameraCommand::FlyTo {
                    target: self.own_position,
                    zoom: self.locate_zoom,
                })
            }
            CameraEvent::FollowToggled => {
                if self.mode == CameraMode::AutoFollow {
                    self.mode = CameraMode::ManualFree;
                    None
                } else {
                    self.mode = CameraMode::AutoFollow;
                    Some(CameraCommand::PanTo(self.own_position))
                }
            }
            CameraEvent::OwnPositionChanged(position) => {
                self.own_position = position;
                (self.mode == CameraMode::AutoFollow).then_some(CameraCommand::PanTo(position))
            }
            CameraEvent::ParticipantRemoved(id) => {
                if self.mode == CameraMode::FocusedOnParticipant(id) {
                    self.mode = CameraMode::ManualFree;
                }
                None
            }
        }
    }
}
