//! The store contract consumed by the convoy engine.
//!
//! The engine only needs per-document upserts/updates/deletes, one
//! multi-document atomic batch for teardown, and a live change feed.
//! [`Database`] is the SQLite implementation; anything else honouring the
//! same contract can stand in for it.

use tokio::sync::broadcast;

use convoy_shared::{AnnotationId, GeoPoint, ParticipantId, SessionCode};

use crate::changes::StoreEvent;
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{
    Annotation, CleanupSummary, NewParticipant, Participant, PositionUpdate, Session,
};

pub trait ConvoyStore: Send + Sync {
    fn create_session(&self, session: &Session) -> Result<()>;
    fn session_exists(&self, code: &SessionCode) -> Result<bool>;
    /// Atomically remove the session and everything it owns.
    fn close_session(&self, code: &SessionCode) -> Result<CleanupSummary>;

    fn list_participants(&self, code: &SessionCode) -> Result<Vec<Participant>>;
    fn upsert_participant(&self, code: &SessionCode, new: &NewParticipant) -> Result<Participant>;
    fn update_position(
        &self,
        code: &SessionCode,
        id: &ParticipantId,
        update: &PositionUpdate,
    ) -> Result<Participant>;
    fn clear_trail(&self, code: &SessionCode, id: &ParticipantId) -> Result<Participant>;
    fn delete_participant(&self, code: &SessionCode, id: &ParticipantId) -> Result<bool>;

    fn list_annotations(&self, code: &SessionCode) -> Result<Vec<Annotation>>;
    fn create_annotation(&self, code: &SessionCode, position: GeoPoint, text: &str)
        -> Result<Annotation>;
    fn update_annotation_text(
        &self,
        code: &SessionCode,
        id: AnnotationId,
        text: &str,
    ) -> Result<Annotation>;
    fn delete_annotation(&self, code: &SessionCode, id: AnnotationId) -> Result<bool>;

    /// Live change-sets for every session held by the store.
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;

    /// Counter that moves whenever a writer outside this handle commits.
    /// Subscribers re-read the collections when it changes, since those
    /// writes never reach [`Self::subscribe`].  A store whose feed already
    /// carries every write keeps the default.
    fn data_version(&self) -> Result<i64> {
        Ok(0)
    }
}

impl ConvoyStore for Database {
    fn create_session(&self, session: &Session) -> Result<()> {
        Database::create_session(self, session)
    }

    fn session_exists(&self, code: &SessionCode) -> Result<bool> {
        match Database::get_session(self, code) {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn close_session(&self, code: &SessionCode) -> Result<CleanupSummary> {
        Database::close_session(self, code)
    }

    fn list_participants(&self, code: &SessionCode) -> Result<Vec<Participant>> {
        Database::list_participants(self, code)
    }

    fn upsert_participant(&self, code: &SessionCode, new: &NewParticipant) -> Result<Participant> {
        Database::upsert_participant(self, code, new)
    }

    fn update_position(
        &self,
        code: &SessionCode,
        id: &ParticipantId,
        update: &PositionUpdate,
    ) -> Result<Participant> {
        Database::update_position(self, code, id, update)
    }

    fn clear_trail(&self, code: &SessionCode, id: &ParticipantId) -> Result<Participant> {
        Database::clear_trail(self, code, id)
    }

    fn delete_participant(&self, code: &SessionCode, id: &ParticipantId) -> Result<bool> {
        Database::delete_participant(self, code, id)
    }

    fn list_annotations(&self, code: &SessionCode) -> Result<Vec<Annotation>> {
        Database::list_annotations(self, code)
    }

    fn create_annotation(
        &self,
        code: &SessionCode,
        position: GeoPoint,
        text: &str,
    ) -> Result<Annotation> {
        Database::create_annotation(self, code, position, text)
    }

    fn update_annotation_text(
        &self,
        code: &SessionCode,
        id: AnnotationId,
        text: &str,
    ) -> Result<Annotation> {
        Database::update_annotation_text(self, code, id, text)
    }

    fn delete_annotation(&self, code: &SessionCode, id: AnnotationId) -> Result<bool> {
        Database::delete_annotation(self, code, id)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        Database::subscribe(self)
    }

    fn data_version(&self) -> Result<i64> {
        Database::data_version(self)
    }
}
