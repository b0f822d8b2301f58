//! v002 -- Severity and coordinates on reports.

use rusqlite::Connection;

const UP_SQL: &str = r#"
ALTER TABLE reports ADD COLUMN severity  TEXT NOT NULL DEFAULT 'medium';
ALTER TABLE reports ADD COLUMN latitude  REAL;
ALTER TABLE reports ADD COLUMN longitude REAL;
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
