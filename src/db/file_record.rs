//! Stored file metadata repository.

use chrono::{DateTime, Datelike, Utc};

use super::DbPool;
use crate::datetime::{from_storage, to_storage};
use crate::{GatewayError, Result};

/// Last year the fixed-width timestamp encoding can represent.
const MAX_YEAR: i32 = 9999;

/// Metadata for one stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Access token, unique.
    pub token: String,
    /// Lowercase hex SHA-512 of the received bytes.
    pub content_hash: String,
    /// Client-supplied name. Display only.
    pub original_name: String,
    /// Payload length in bytes.
    pub size_bytes: u64,
    /// Absolute path of the stored file.
    pub stored_path: String,
    /// Insertion time.
    pub created_at: DateTime<Utc>,
    /// Expiry time. Strictly after `created_at`.
    pub expires_at: DateTime<Utc>,
}

impl FileRecord {
    /// Whether the record is expired at `now`. Expiry is inclusive.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(sqlx::FromRow)]
struct FileRecordRow {
    token: String,
    sha512: String,
    original_name: String,
    size_bytes: i64,
    stored_path: String,
    created_at: String,
    expires_at: String,
}

impl TryFrom<FileRecordRow> for FileRecord {
    type Error = GatewayError;

    fn try_from(row: FileRecordRow) -> Result<Self> {
        let parse = |value: &str| {
            from_storage(value)
                .ok_or_else(|| GatewayError::Database(format!("invalid timestamp: {value}")))
        };

        Ok(Self {
            created_at: parse(&row.created_at)?,
            expires_at: parse(&row.expires_at)?,
            size_bytes: u64::try_from(row.size_bytes)
                .map_err(|_| GatewayError::Database(format!("invalid size: {}", row.size_bytes)))?,
            token: row.token,
            content_hash: row.sha512,
            original_name: row.original_name,
            stored_path: row.stored_path,
        })
    }
}

/// A record removed by the reaper, with the file it pointed at.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ExpiredFile {
    /// Token of the removed record.
    pub token: String,
    /// Path of the file to delete.
    pub stored_path: String,
}

/// Repository for file record operations.
pub struct FileRecordRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> FileRecordRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Insert a record. Fails if the token already exists.
    pub async fn insert(&self, record: &FileRecord) -> Result<()> {
        if record.expires_at <= record.created_at {
            return Err(GatewayError::Validation(
                "expires_at must be after created_at".into(),
            ));
        }
        if record.expires_at.year() > MAX_YEAR {
            return Err(GatewayError::Validation(format!(
                "expires_at beyond year {MAX_YEAR}"
            )));
        }
        let size_bytes = i64::try_from(record.size_bytes).map_err(|_| {
            GatewayError::Validation(format!("size too large: {}", record.size_bytes))
        })?;

        sqlx::query(
            "INSERT INTO files (token, sha512, original_name, size_bytes, stored_path, created_at, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&record.token)
        .bind(&record.content_hash)
        .bind(&record.original_name)
        .bind(size_bytes)
        .bind(&record.stored_path)
        .bind(to_storage(&record.created_at))
        .bind(to_storage(&record.expires_at))
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Get a record by token.
    pub async fn get_by_token(&self, token: &str) -> Result<Option<FileRecord>> {
        let row = sqlx::query_as::<_, FileRecordRow>(
            "SELECT token, sha512, original_name, size_bytes, stored_path, created_at, expires_at
             FROM files WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(self.pool)
        .await?;

        row.map(FileRecord::try_from).transpose()
    }

    /// Delete every record with `expires_at <= now` and return what was removed.
    ///
    /// Selection and deletion happen in one statement, so a record is
    /// returned to at most one caller.
    pub async fn reap_expired(&self, now: DateTime<Utc>) -> Result<Vec<ExpiredFile>> {
        let expired = sqlx::query_as::<_, ExpiredFile>(
            "DELETE FROM files WHERE expires_at <= $1 RETURNING token, stored_path",
        )
        .bind(to_storage(&now))
        .fetch_all(self.pool)
        .await?;

        Ok(expired)
    }

    /// Count stored records.
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::db::Database;
    use chrono::{Duration, TimeZone};

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap()
    }

    fn record(token: &str, created: DateTime<Utc>, ttl: Duration) -> FileRecord {
        FileRecord {
            token: token.to_string(),
            content_hash: "ab".repeat(64),
            original_name: "hello.txt".to_string(),
            size_bytes: 5,
            stored_path: format!("/data/{token}"),
            created_at: created,
            expires_at: created + ttl,
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = FileRecordRepository::new(db.pool());

        let rec = record("tok1", at(1, 0), Duration::days(1));
        repo.insert(&rec).await.unwrap();

        let found = repo.get_by_token("tok1").await.unwrap().unwrap();
        assert_eq!(found, rec);
        assert_eq!(found.expires_at, at(2, 0));
    }

    #[tokio::test]
    async fn test_get_unknown_token() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = FileRecordRepository::new(db.pool());

        assert!(repo.get_by_token("nope").await.unwrap().is_none());
        assert!(repo.get_by_token("../../etc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_duplicate_token_fails() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = FileRecordRepository::new(db.pool());

        repo.insert(&record("dup", at(1, 0), Duration::days(1)))
            .await
            .unwrap();
        let result = repo.insert(&record("dup", at(1, 1), Duration::days(1))).await;
        assert!(matches!(result, Err(GatewayError::Database(_))));
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_insert_rejects_non_positive_ttl() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = FileRecordRepository::new(db.pool());

        let result = repo.insert(&record("zero", at(1, 0), Duration::zero())).await;
        assert!(matches!(result, Err(GatewayError::Validation(_))));
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_insert_rejects_expiry_past_year_9999() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = FileRecordRepository::new(db.pool());

        let result = repo
            .insert(&record("far", at(1, 0), Duration::days(3_000_000)))
            .await;
        assert!(matches!(result, Err(GatewayError::Validation(_))));
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_microsecond_precision_preserved() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = FileRecordRepository::new(db.pool());

        let created = at(1, 0) + Duration::microseconds(123_456);
        repo.insert(&record("precise", created, Duration::days(7)))
            .await
            .unwrap();

        let found = repo.get_by_token("precise").await.unwrap().unwrap();
        assert_eq!(found.created_at, created);
    }

    #[tokio::test]
    async fn test_reap_expired_boundary_inclusive() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = FileRecordRepository::new(db.pool());

        repo.insert(&record("old", at(1, 0), Duration::hours(1)))
            .await
            .unwrap();
        repo.insert(&record("edge", at(1, 0), Duration::hours(2)))
            .await
            .unwrap();
        repo.insert(&record("fresh", at(1, 0), Duration::days(1)))
            .await
            .unwrap();

        let mut reaped = repo.reap_expired(at(1, 2)).await.unwrap();
        reaped.sort_by(|a, b| a.token.cmp(&b.token));

        assert_eq!(
            reaped,
            vec![
                ExpiredFile {
                    token: "edge".into(),
                    stored_path: "/data/edge".into(),
                },
                ExpiredFile {
                    token: "old".into(),
                    stored_path: "/data/old".into(),
                },
            ]
        );
        assert!(repo.get_by_token("old").await.unwrap().is_none());
        assert!(repo.get_by_token("fresh").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reap_expired_returns_each_record_once() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = FileRecordRepository::new(db.pool());

        repo.insert(&record("old", at(1, 0), Duration::hours(1)))
            .await
            .unwrap();

        assert_eq!(repo.reap_expired(at(3, 0)).await.unwrap().len(), 1);
        assert!(repo.reap_expired(at(3, 0)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reap_expired_empty() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = FileRecordRepository::new(db.pool());

        assert!(repo.reap_expired(at(1, 0)).await.unwrap().is_empty());
    }

    #[test]
    fn test_is_expired_at() {
        let rec = record("t", at(1, 0), Duration::days(1));
        assert!(!rec.is_expired_at(at(1, 23)));
        assert!(rec.is_expired_at(at(2, 0)));
        assert!(rec.is_expired_at(at(3, 0)));
    }
}
