//! v001 -- Initial schema creation.
//!
//! Creates the `reports` table and the indexes backing the feed and profile
//! queries.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Reports
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS reports (
    id                 TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    submission_key     TEXT NOT NULL UNIQUE,        -- UUID v4, idempotency key
    author_id          TEXT NOT NULL,
    disaster_type      TEXT NOT NULL,
    location           TEXT NOT NULL,
    description        TEXT NOT NULL,
    image_ref          TEXT,                        -- NULL once media is purged
    created_at         TEXT NOT NULL,               -- RFC-3339, microseconds, UTC
    verification_state TEXT NOT NULL DEFAULT 'Unverified'
);

CREATE INDEX IF NOT EXISTS idx_reports_created
    ON reports(created_at DESC, id DESC);

CREATE INDEX IF NOT EXISTS idx_reports_author_created
    ON reports(author_id, created_at DESC, id DESC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
