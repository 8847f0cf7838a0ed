//! Host-managed point notes.
//!
//! Only the host may create, edit or delete annotations; every participant
//! sees them through the change feed.  Creating one is a two-step flow:
//! the host enters placing mode, then picks a map position and supplies the
//! text.  Deleting is also two-step: [`AnnotationStore::request_delete`]
//! hands out a [`PendingDeletion`] which must be passed back to
//! [`AnnotationStore::confirm_delete`].

use std::sync::Arc;

use tracing::{debug, info, warn};

use convoy_shared::{AnnotationId, GeoPoint, SessionCode};
use convoy_store::{Annotation, Change, ConvoyStore};

use crate::error::{Result, ValidationError};

/// Proof that the user was asked to confirm deleting an annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDeletion {
    id: AnnotationId,
}

impl PendingDeletion {
    pub fn id(&self) -> AnnotationId {
        self.id
    }
}

pub struct AnnotationStore {
    store: Arc<dyn ConvoyStore>,
    code: SessionCode,
    is_host: bool,
    placing: bool,
    /// Kept in creation order.
    annotations: Vec<Annotation>,
}

impl AnnotationStore {
    pub fn new(
        store: Arc<dyn ConvoyStore>,
        code: SessionCode,
        is_host: bool,
        initial: Vec<Annotation>,
    ) -> Self {
        Self {
            store,
            code,
            is_host,
            placing: false,
            annotations: initial,
        }
    }

    pub fn list(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id == id)
    }

    pub fn is_placing(&self) -> bool {
        self.placing
    }

    pub fn replace_all(&mut self, annotations: Vec<Annotation>) {
        self.annotations = annotations;
    }

    /// Mirror a store change.  Returns `true` if the local list changed.
    pub fn apply(&mut self, change: &Change) -> bool {
        match change {
            Change::AnnotationUpserted(a) => {
                self.upsert_local(a.clone());
                true
            }
            Change::AnnotationRemoved(id) => {
                let before = self.annotations.len();
                self.annotations.retain(|a| a.id != *id);
                self.annotations.len() < before
            }
            Change::SessionClosed(_) => {
                self.placing = false;
                let had_any = !self.annotations.is_empty();
                self.annotations.clear();
                had_any
            }
            Change::ParticipantUpserted(_) | Change::ParticipantRemoved(_) => false,
        }
    }

    // ------------------------------------------------------------------
    // Placing
    // ------------------------------------------------------------------

    pub fn begin_placing(&mut self) -> std::result::Result<(), ValidationError> {
        self.require_host("place annotations")?;
        self.placing = true;
        Ok(())
    }

    pub fn cancel_placing(&mut self) {
        self.placing = false;
    }

    /// Create an annotation at `at`.  Ends placing mode whatever the outcome
    /// of the write.
    ///
    /// A failed store write is logged and yields `Ok(None)`.
    pub fn place(&mut self, at: GeoPoint, text: &str) -> Result<Option<Annotation>> {
        self.require_host("place annotations")?;
        if !self.placing {
            return Err(ValidationError::NotPlacing.into());
        }
        let text = non_empty(text)?;
        self.placing = false;

        match self.store.create_annotation(&self.code, at, text) {
            Ok(annotation) => {
                info!(session = %self.code, id = %annotation.id, "annotation placed");
                self.upsert_local(annotation.clone());
                Ok(Some(annotation))
            }
            Err(e) => {
                warn!(session = %self.code, "annotation write dropped: {e}");
                Ok(None)
            }
        }
    }

    // ------------------------------------------------------------------
    // Edit / delete
    // ------------------------------------------------------------------

    pub fn update_text(&mut self, id: AnnotationId, text: &str) -> Result<Option<Annotation>> {
        self.require_host("edit annotations")?;
        self.require_known(id)?;
        let text = non_empty(text)?;

        match self.store.update_annotation_text(&self.code, id, text) {
            Ok(annotation) => {
                debug!(session = %self.code, id = %id, "annotation edited");
                self.upsert_local(annotation.clone());
                Ok(Some(annotation))
            }
            Err(e) => {
                warn!(session = %self.code, id = %id, "annotation edit dropped: {e}");
                Ok(None)
            }
        }
    }

    pub fn request_delete(
        &self,
        id: AnnotationId,
    ) -> std::result::Result<PendingDeletion, ValidationError> {
        self.require_host("delete annotations")?;
        self.require_known(id)?;
        Ok(PendingDeletion { id })
    }

    /// Returns `true` if the annotation was removed.
    pub fn confirm_delete(&mut self, pending: PendingDeletion) -> Result<bool> {
        self.require_host("delete annotations")?;
        let id = pending.id;

        match self.store.delete_annotation(&self.code, id) {
            Ok(removed) => {
                if removed {
                    info!(session = %self.code, id = %id, "annotation deleted");
                }
                self.annotations.retain(|a| a.id != id);
                Ok(removed)
            }
            Err(e) => {
                warn!(session = %self.code, id = %id, "annotation delete dropped: {e}");
                Ok(false)
            }
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn require_host(&self, action: &'static str) -> std::result::Result<(), ValidationError> {
        if self.is_host {
            Ok(())
        } else {
            Err(ValidationError::NotHost(action))
        }
    }

    fn require_known(&self, id: AnnotationId) -> std::result::Result<(), ValidationError> {
        match self.get(id) {
            Some(_) => Ok(()),
            None => Err(ValidationError::UnknownAnnotation(id)),
        }
    }

    fn upsert_local(&mut self, annotation: Annotation) {
        match self.annotations.iter_mut().find(|a| a.id == annotation.id) {
            Some(existing) => *existing = annotation,
            None => self.annotations.push(annotation),
        }
    }
}

fn non_empty(text: &str) -> std::result::Result<&str, ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Err(ValidationError::EmptyText)
    } else {
        Ok(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConvoyError;
    use convoy_store::Database;

    fn code() -> SessionCode {
        SessionCode::parse("TRIP").unwrap()
    }

    fn setup(is_host: bool) -> (Arc<Database>, AnnotationStore) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let annotations = AnnotationStore::new(db.clone(), code(), is_host, Vec::new());
        (db, annotations)
    }

    #[test]
    fn test_place_requires_placing_mode() {
        let (_db, mut notes) = setup(true);
        let err = notes.place(GeoPoint::new(1.0, 1.0), "Fuel").unwrap_err();
        assert!(matches!(
            err,
            ConvoyError::Validation(ValidationError::NotPlacing)
        ));
    }

    #[test]
    fn test_place_and_list() {
        let (db, mut notes) = setup(true);
        notes.begin_placing().unwrap();
        assert!(notes.is_placing());

        let placed = notes
            .place(GeoPoint::new(1.0, 1.0), "  Fuel stop ")
            .unwrap()
            .unwrap();
        assert_eq!(placed.text, "Fuel stop");
        assert!(!notes.is_placing());
        assert_eq!(notes.list().len(), 1);
        assert_eq!(db.list_annotations(&code()).unwrap().len(), 1);
    }

    #[test]
    fn test_empty_text_rejected() {
        let (db, mut notes) = setup(true);
        notes.begin_placing().unwrap();
        let err = notes.place(GeoPoint::new(1.0, 1.0), "   ").unwrap_err();
        assert!(matches!(
            err,
            ConvoyError::Validation(ValidationError::EmptyText)
        ));
        // Still placing; the user can retry.
        assert!(notes.is_placing());
        assert!(db.list_annotations(&code()).unwrap().is_empty());
    }

    #[test]
    fn test_guest_cannot_mutate() {
        let (db, mut notes) = setup(false);
        assert_eq!(
            notes.begin_placing(),
            Err(ValidationError::NotHost("place annotations"))
        );

        let existing = db
            .create_annotation(&code(), GeoPoint::new(1.0, 1.0), "Lunch")
            .unwrap();
        notes.apply(&Change::AnnotationUpserted(existing.clone()));

        assert!(notes.update_text(existing.id, "Dinner").is_err());
        assert!(notes.request_delete(existing.id).is_err());
        assert_eq!(db.list_annotations(&code()).unwrap()[0].text, "Lunch");
    }

    #[test]
    fn test_edit_and_confirmed_delete() {
        let (db, mut notes) = setup(true);
        notes.begin_placing().unwrap();
        let placed = notes
            .place(GeoPoint::new(1.0, 1.0), "Fuel")
            .unwrap()
            .unwrap();

        let edited = notes.update_text(placed.id, "Fuel + tea").unwrap().unwrap();
        assert_eq!(edited.text, "Fuel + tea");
        assert_eq!(notes.get(placed.id).unwrap().text, "Fuel + tea");

        let pending = notes.request_delete(placed.id).unwrap();
        // Nothing is deleted until confirmation.
        assert_eq!(db.list_annotations(&code()).unwrap().len(), 1);

        assert!(notes.confirm_delete(pending).unwrap());
        assert!(notes.list().is_empty());
        assert!(db.list_annotations(&code()).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_annotation() {
        let (_db, notes) = setup(true);
        let id = AnnotationId::new();
        assert_eq!(
            notes.request_delete(id),
            Err(ValidationError::UnknownAnnotation(id))
        );
    }

    #[test]
    fn test_apply_feed_changes() {
        let (db, mut notes) = setup(false);
        let a = db
            .create_annotation(&code(), GeoPoint::new(1.0, 1.0), "A")
            .unwrap();
        assert!(notes.apply(&Change::AnnotationUpserted(a.clone())));
        assert!(notes.apply(&Change::AnnotationUpserted(a.clone())));
        assert_eq!(notes.list().len(), 1);

        assert!(notes.apply(&Change::AnnotationRemoved(a.id)));
        assert!(!notes.apply(&Change::AnnotationRemoved(a.id)));
    }
}
