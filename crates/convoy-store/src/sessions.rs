//! Session records and atomic session teardown.

use chrono::{DateTime, Utc};
use rusqlite::params;

use convoy_shared::{ParticipantId, SessionCode};

use crate::changes::Change;
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{CleanupSummary, Session};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Write the session record.  A stale record with the same code is
    /// replaced.
    pub fn create_session(&self, session: &Session) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO sessions (code, host_id, created_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(code) DO UPDATE SET
                 host_id    = excluded.host_id,
                 created_at = excluded.created_at",
            params![
                session.code.as_str(),
                session.host_id.as_str(),
                session.created_at.to_rfc3339(),
            ],
        )?;
        tracing::info!(session = %session.code, host = %session.host_id, "session created");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a session record by code.
    pub fn get_session(&self, code: &SessionCode) -> Result<Session> {
        let (code_str, host_str, created_str) = self
            .conn()?
            .query_row(
                "SELECT code, host_id, created_at FROM sessions WHERE code = ?1",
                params![code.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })?;

        let created_at: DateTime<Utc> =
            DateTime::parse_from_rfc3339(&created_str)?.with_timezone(&Utc);

        Ok(Session {
            code: SessionCode::parse(&code_str)?,
            host_id: ParticipantId::parse(&host_str)?,
            created_at,
        })
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Remove every participant, trail point and annotation of a session,
    /// plus the session record, in one all-or-nothing transaction.
    ///
    /// Subscribers see a single [`Change::SessionClosed`] event once the
    /// batch has committed; nothing is announced if it fails.
    pub fn close_session(&self, code: &SessionCode) -> Result<CleanupSummary> {
        let summary = {
            let mut conn = self.conn()?;
            let tx = conn.transaction()?;
            let trail_points = tx.execute(
                "DELETE FROM trail_points WHERE session_code = ?1",
                params![code.as_str()],
            )?;
            let participants = tx.execute(
                "DELETE FROM participants WHERE session_code = ?1",
                params![code.as_str()],
            )?;
            let annotations = tx.execute(
                "DELETE FROM annotations WHERE session_code = ?1",
                params![code.as_str()],
            )?;
            let sessions = tx.execute(
                "DELETE FROM sessions WHERE code = ?1",
                params![code.as_str()],
            )?;
            tx.commit()?;

            CleanupSummary {
                participants,
                trail_points,
                annotations,
                session_removed: sessions > 0,
            }
        };

        tracing::info!(
            session = %code,
            participants = summary.participants,
            annotations = summary.annotations,
            "session closed"
        );
        self.feed().publish(code, Change::SessionClosed(summary));
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewParticipant, PositionUpdate};
    use convoy_shared::{Color, GeoPoint};

    fn code() -> SessionCode {
        SessionCode::parse("TRIP").unwrap()
    }

    fn session() -> Session {
        Session {
            code: code(),
            host_id: ParticipantId::parse("host").unwrap(),
            created_at: Utc::now(),
        }
    }

    fn join(db: &Database, code: &SessionCode, id: &str, leader: bool) -> ParticipantId {
        let id = ParticipantId::parse(id).unwrap();
        db.upsert_participant(
            code,
            &NewParticipant {
                id: id.clone(),
                display_name: id.to_string(),
                color: Color::default(),
                is_leader: leader,
                position: GeoPoint::new(0.0, 0.0),
            },
        )
        .unwrap();
        id
    }

    #[test]
    fn test_create_and_get() {
        let db = Database::open_in_memory().unwrap();
        db.create_session(&session()).unwrap();

        let fetched = db.get_session(&code()).unwrap();
        assert_eq!(fetched.code, code());
        assert_eq!(fetched.host_id.as_str(), "host");
    }

    #[test]
    fn test_get_missing() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(db.get_session(&code()), Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_close_session_is_one_event() {
        let db = Database::open_in_memory().unwrap();
        db.create_session(&session()).unwrap();
        let host = join(&db, &code(), "host", true);
        join(&db, &code(), "a", false);
        join(&db, &code(), "b", false);
        let p = GeoPoint::new(0.5, 0.5);
        db.update_position(
            &code(),
            &host,
            &PositionUpdate {
                position: p,
                trail_point: Some(p),
            },
        )
        .unwrap();
        db.create_annotation(&code(), GeoPoint::new(0.1, 0.1), "Fuel")
            .unwrap();

        let other = SessionCode::parse("KEEP").unwrap();
        join(&db, &other, "x", true);

        let mut rx = db.subscribe();
        let summary = db.close_session(&code()).unwrap();
        assert_eq!(
            summary,
            CleanupSummary {
                participants: 3,
                trail_points: 1,
                annotations: 1,
                session_removed: true,
            }
        );

        let event = rx.recv().await.unwrap();
        assert_eq!(event.change, Change::SessionClosed(summary));
        assert!(rx.try_recv().is_err());

        assert!(db.list_participants(&code()).unwrap().is_empty());
        assert!(db.list_annotations(&code()).unwrap().is_empty());
        assert!(matches!(db.get_session(&code()), Err(StoreError::NotFound)));
        assert_eq!(db.list_participants(&other).unwrap().len(), 1);
    }
}
