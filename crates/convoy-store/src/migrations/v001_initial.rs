//! v001 -- Initial schema creation.
//!
//! Creates the four tables: `sessions`, `participants`, `trail_points` and
//! `annotations`.  Participants and annotations are scoped by session code
//! rather than by a foreign key, because guests may write into a session
//! whose record is owned by the host.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Sessions
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS sessions (
    code       TEXT PRIMARY KEY NOT NULL,   -- upper-case alphanumeric
    host_id    TEXT NOT NULL,
    created_at TEXT NOT NULL                -- RFC-3339
);

-- ----------------------------------------------------------------
-- Participants
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS participants (
    session_code   TEXT NOT NULL,
    id             TEXT NOT NULL,
    display_name   TEXT NOT NULL,
    color          TEXT NOT NULL,           -- #rrggbb
    is_leader      INTEGER NOT NULL DEFAULT 0,
    lat            REAL NOT NULL,
    lng            REAL NOT NULL,
    last_active_ms INTEGER NOT NULL,        -- unix millis, monotonic per row
    joined_at      TEXT NOT NULL,           -- RFC-3339

    PRIMARY KEY (session_code, id)
);

CREATE INDEX IF NOT EXISTS idx_participants_session
    ON participants(session_code, joined_at);

-- ----------------------------------------------------------------
-- Trail points (leader only, append-only)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS trail_points (
    session_code   TEXT NOT NULL,
    participant_id TEXT NOT NULL,
    seq            INTEGER NOT NULL,        -- arrival order
    lat            REAL NOT NULL,
    lng            REAL NOT NULL,

    PRIMARY KEY (session_code, participant_id, seq),
    FOREIGN KEY (session_code, participant_id)
        REFERENCES participants(session_code, id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Annotations
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS annotations (
    id           TEXT PRIMARY KEY NOT NULL, -- UUID v4
    session_code TEXT NOT NULL,
    lat          REAL NOT NULL,
    lng          REAL NOT NULL,
    text         TEXT NOT NULL,
    created_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_annotations_session
    ON annotations(session_code, created_at);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
