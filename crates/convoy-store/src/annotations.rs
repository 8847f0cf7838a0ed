//! CRUD operations for [`Annotation`] documents.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use convoy_shared::{AnnotationId, DecodeError, GeoPoint, SessionCode};

use crate::changes::Change;
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Annotation;

impl Database {
    /// Insert a new annotation with a store-generated id.
    pub fn create_annotation(
        &self,
        code: &SessionCode,
        position: GeoPoint,
        text: &str,
    ) -> Result<Annotation> {
        let annotation = Annotation {
            id: AnnotationId::new(),
            position,
            text: text.to_string(),
            created_at: Utc::now(),
        };

        self.conn()?.execute(
            "INSERT INTO annotations (id, session_code, lat, lng, text, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                annotation.id.0.to_string(),
                code.as_str(),
                annotation.position.lat,
                annotation.position.lng,
                annotation.text,
                annotation.created_at.to_rfc3339(),
            ],
        )?;

        self.feed()
            .publish(code, Change::AnnotationUpserted(annotation.clone()));
        Ok(annotation)
    }

    /// List a session's annotations, oldest first.
    pub fn list_annotations(&self, code: &SessionCode) -> Result<Vec<Annotation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, lat, lng, text, created_at
             FROM annotations
             WHERE session_code = ?1
             ORDER BY created_at ASC",
        )?;

        let rows = stmt.query_map(params![code.as_str()], read_annotation_row)?;

        let mut annotations = Vec::new();
        for row in rows {
            annotations.push(row?.decode()?);
        }
        Ok(annotations)
    }

    /// Replace an annotation's text.
    pub fn update_annotation_text(
        &self,
        code: &SessionCode,
        id: AnnotationId,
        text: &str,
    ) -> Result<Annotation> {
        let annotation = {
            let conn = self.conn()?;
            let affected = conn.execute(
                "UPDATE annotations SET text = ?3 WHERE session_code = ?1 AND id = ?2",
                params![code.as_str(), id.0.to_string(), text],
            )?;
            if affected == 0 {
                return Err(StoreError::NotFound);
            }
            fetch_annotation(&conn, code, id)?
        };

        self.feed()
            .publish(code, Change::AnnotationUpserted(annotation.clone()));
        Ok(annotation)
    }

    /// Delete an annotation.  Returns `true` if a row was deleted.
    pub fn delete_annotation(&self, code: &SessionCode, id: AnnotationId) -> Result<bool> {
        let affected = self.conn()?.execute(
            "DELETE FROM annotations WHERE session_code = ?1 AND id = ?2",
            params![code.as_str(), id.0.to_string()],
        )?;

        if affected > 0 {
            self.feed().publish(code, Change::AnnotationRemoved(id));
        }
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct AnnotationRow {
    id: String,
    lat: f64,
    lng: f64,
    text: String,
    created_at: String,
}

impl AnnotationRow {
    fn decode(self) -> Result<Annotation> {
        if self.text.trim().is_empty() {
            return Err(DecodeError::MissingField("text").into());
        }
        let created_at: DateTime<Utc> =
            DateTime::parse_from_rfc3339(&self.created_at)?.with_timezone(&Utc);

        Ok(Annotation {
            id: AnnotationId(Uuid::parse_str(&self.id)?),
            position: GeoPoint::checked(self.lat, self.lng)?,
            text: self.text,
            created_at,
        })
    }
}

fn read_annotation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AnnotationRow> {
    Ok(AnnotationRow {
        id: row.get(0)?,
        lat: row.get(1)?,
        lng: row.get(2)?,
        text: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn fetch_annotation(conn: &Connection, code: &SessionCode, id: AnnotationId) -> Result<Annotation> {
    conn.query_row(
        "SELECT id, lat, lng, text, created_at
         FROM annotations
         WHERE session_code = ?1 AND id = ?2",
        params![code.as_str(), id.0.to_string()],
        read_annotation_row,
    )
    .optional()?
    .ok_or(StoreError::NotFound)?
    .decode()
}
