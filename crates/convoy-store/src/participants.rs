//! CRUD operations for [`Participant`] documents and the leader's trail.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use convoy_shared::{Color, DecodeError, GeoPoint, ParticipantId, SessionCode};

use crate::changes::Change;
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{NewParticipant, Participant, PositionUpdate};

const PARTICIPANT_COLUMNS: &str = "id, display_name, color, is_leader, lat, lng, last_active_ms";

impl Database {
    // ------------------------------------------------------------------
    // Create / replace
    // ------------------------------------------------------------------

    /// Upsert a participant document on join.
    ///
    /// Replaces name, colour, role and position, resets any recorded trail
    /// and advances `last_active` to the store clock.
    pub fn upsert_participant(
        &self,
        code: &SessionCode,
        new: &NewParticipant,
    ) -> Result<Participant> {
        let now = Utc::now();
        let participant = {
            let mut conn = self.conn()?;
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO participants
                     (session_code, id, display_name, color, is_leader, lat, lng, last_active_ms, joined_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(session_code, id) DO UPDATE SET
                     display_name   = excluded.display_name,
                     color          = excluded.color,
                     is_leader      = excluded.is_leader,
                     lat            = excluded.lat,
                     lng            = excluded.lng,
                     last_active_ms = MAX(participants.last_active_ms, excluded.last_active_ms)",
                params![
                    code.as_str(),
                    new.id.as_str(),
                    new.display_name,
                    new.color.as_str(),
                    new.is_leader,
                    new.position.lat,
                    new.position.lng,
                    now.timestamp_millis(),
                    now.to_rfc3339(),
                ],
            )?;
            tx.execute(
                "DELETE FROM trail_points WHERE session_code = ?1 AND participant_id = ?2",
                params![code.as_str(), new.id.as_str()],
            )?;
            let participant = fetch_participant(&tx, code, &new.id)?;
            tx.commit()?;
            participant
        };

        tracing::debug!(
            session = %code,
            participant = %participant.id,
            leader = participant.is_leader,
            "participant upserted"
        );
        self.feed()
            .publish(code, Change::ParticipantUpserted(participant.clone()));
        Ok(participant)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single participant document.
    pub fn get_participant(&self, code: &SessionCode, id: &ParticipantId) -> Result<Participant> {
        let conn = self.conn()?;
        fetch_participant(&conn, code, id)
    }

    /// List every participant of a session, in join order.
    pub fn list_participants(&self, code: &SessionCode) -> Result<Vec<Participant>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PARTICIPANT_COLUMNS}
             FROM participants
             WHERE session_code = ?1
             ORDER BY joined_at ASC, id ASC"
        ))?;

        let rows = stmt.query_map(params![code.as_str()], read_participant_row)?;

        let mut raw = Vec::new();
        for row in rows {
            raw.push(row?);
        }

        let mut participants = Vec::with_capacity(raw.len());
        for row in raw {
            let trail = if row.is_leader {
                Some(fetch_trail(&conn, code, &row.id)?)
            } else {
                None
            };
            participants.push(row.decode(trail)?);
        }
        Ok(participants)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Apply one accepted position sample as a single document update.
    ///
    /// The trail point, if any, is only appended for the leader's document.
    /// Fails with [`StoreError::NotFound`] if the participant has no document.
    pub fn update_position(
        &self,
        code: &SessionCode,
        id: &ParticipantId,
        update: &PositionUpdate,
    ) -> Result<Participant> {
        let now_ms = Utc::now().timestamp_millis();
        let participant = {
            let mut conn = self.conn()?;
            let tx = conn.transaction()?;
            let affected = tx.execute(
                "UPDATE participants
                 SET lat = ?3, lng = ?4, last_active_ms = MAX(last_active_ms, ?5)
                 WHERE session_code = ?1 AND id = ?2",
                params![
                    code.as_str(),
                    id.as_str(),
                    update.position.lat,
                    update.position.lng,
                    now_ms,
                ],
            )?;
            if affected == 0 {
                return Err(StoreError::NotFound);
            }

            if let Some(point) = update.trail_point {
                tx.execute(
                    "INSERT INTO trail_points (session_code, participant_id, seq, lat, lng)
                     SELECT ?1, ?2,
                            (SELECT COALESCE(MAX(seq), 0) + 1 FROM trail_points
                             WHERE session_code = ?1 AND participant_id = ?2),
                            ?3, ?4
                     FROM participants
                     WHERE session_code = ?1 AND id = ?2 AND is_leader = 1",
                    params![code.as_str(), id.as_str(), point.lat, point.lng],
                )?;
            }

            let participant = fetch_participant(&tx, code, id)?;
            tx.commit()?;
            participant
        };

        self.feed()
            .publish(code, Change::ParticipantUpserted(participant.clone()));
        Ok(participant)
    }

    /// Reset a participant's trail to empty.
    pub fn clear_trail(&self, code: &SessionCode, id: &ParticipantId) -> Result<Participant> {
        let participant = {
            let mut conn = self.conn()?;
            let tx = conn.transaction()?;
            let cleared = tx.execute(
                "DELETE FROM trail_points WHERE session_code = ?1 AND participant_id = ?2",
                params![code.as_str(), id.as_str()],
            )?;
            let participant = fetch_participant(&tx, code, id)?;
            tx.commit()?;
            tracing::debug!(session = %code, participant = %id, cleared, "trail cleared");
            participant
        };

        self.feed()
            .publish(code, Change::ParticipantUpserted(participant.clone()));
        Ok(participant)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a participant document.  Returns `true` if one was deleted.
    pub fn delete_participant(&self, code: &SessionCode, id: &ParticipantId) -> Result<bool> {
        let affected = {
            let mut conn = self.conn()?;
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM trail_points WHERE session_code = ?1 AND participant_id = ?2",
                params![code.as_str(), id.as_str()],
            )?;
            let affected = tx.execute(
                "DELETE FROM participants WHERE session_code = ?1 AND id = ?2",
                params![code.as_str(), id.as_str()],
            )?;
            tx.commit()?;
            affected
        };

        if affected > 0 {
            self.feed()
                .publish(code, Change::ParticipantRemoved(id.clone()));
        }
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Participant columns exactly as stored, before coercion.
struct ParticipantRow {
    id: String,
    display_name: String,
    color: String,
    is_leader: bool,
    lat: f64,
    lng: f64,
    last_active_ms: i64,
}

impl ParticipantRow {
    fn decode(self, trail: Option<Vec<GeoPoint>>) -> std::result::Result<Participant, DecodeError> {
        if self.display_name.trim().is_empty() {
            return Err(DecodeError::MissingField("display_name"));
        }
        let last_active = DateTime::<Utc>::from_timestamp_millis(self.last_active_ms)
            .ok_or(DecodeError::InvalidTimestamp(self.last_active_ms))?;

        Ok(Participant {
            id: ParticipantId::parse(&self.id)?,
            display_name: self.display_name,
            color: Color::parse(&self.color)?,
            is_leader: self.is_leader,
            position: GeoPoint::checked(self.lat, self.lng)?,
            last_active,
            trail,
        })
    }
}

/// Map a `rusqlite::Row` to a [`ParticipantRow`].
fn read_participant_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ParticipantRow> {
    Ok(ParticipantRow {
        id: row.get(0)?,
        display_name: row.get(1)?,
        color: row.get(2)?,
        is_leader: row.get(3)?,
        lat: row.get(4)?,
        lng: row.get(5)?,
        last_active_ms: row.get(6)?,
    })
}

fn fetch_participant(
    conn: &Connection,
    code: &SessionCode,
    id: &ParticipantId,
) -> Result<Participant> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {PARTICIPANT_COLUMNS}
                 FROM participants
                 WHERE session_code = ?1 AND id = ?2"
            ),
            params![code.as_str(), id.as_str()],
            read_participant_row,
        )
        .optional()?
        .ok_or(StoreError::NotFound)?;

    let trail = if row.is_leader {
        Some(fetch_trail(conn, code, &row.id)?)
    } else {
        None
    };
    Ok(row.decode(trail)?)
}

fn fetch_trail(conn: &Connection, code: &SessionCode, participant_id: &str) -> Result<Vec<GeoPoint>> {
    let mut stmt = conn.prepare(
        "SELECT lat, lng
         FROM trail_points
         WHERE session_code = ?1 AND participant_id = ?2
         ORDER BY seq ASC",
    )?;

    let rows = stmt.query_map(params![code.as_str(), participant_id], |row| {
        Ok((row.get::<_, f64>(0)?, row.get::<_, f64>(1)?))
    })?;

    let mut trail = Vec::new();
    for row in rows {
        let (lat, lng) = row?;
        trail.push(GeoPoint::checked(lat, lng)?);
    }
    Ok(trail)
}
