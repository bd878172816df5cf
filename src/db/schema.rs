//! Database schema and migrations for dropgate.
//!
//! Scripts are written in the SQL subset shared by SQLite and PostgreSQL and
//! are applied in order when the database is opened.

/// Database migrations.
///
/// Each migration is a SQL script that will be executed in order.
/// The schema_version table tracks which migrations have been applied.
pub const MIGRATIONS: &[&str] = &[
    // v1: stored files
    r#"
-- One row per stored file, keyed by its token
CREATE TABLE IF NOT EXISTS files (
    token          TEXT PRIMARY KEY,
    sha512         TEXT NOT NULL,
    original_name  TEXT NOT NULL,          -- client-supplied, display only
    size_bytes     BIGINT NOT NULL CHECK (size_bytes >= 0),
    stored_path    TEXT NOT NULL,          -- derived from token
    created_at     TEXT NOT NULL,          -- fixed-width UTC
    expires_at     TEXT NOT NULL,
    CHECK (expires_at > created_at)
);

CREATE INDEX IF NOT EXISTS idx_files_expires_at ON files(expires_at);
"#,
];
