//! Download side of the exchange (`scp -f <token>`).

use std::fmt;
use std::path::Path;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing::{debug, info};

use super::record::{FileHeader, DEFAULT_MODE};
use super::{AckChannel, ProtocolError, CHUNK_SIZE};
use crate::datetime::Clock;
use crate::db::{Database, FileRecord, FileRecordRepository};
use crate::error::StorageError;
use crate::storage::FileStorage;
use crate::Result;

/// Summary of a file about to be served, shown on the side channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadNotice {
    pub original_name: String,
    pub size_bytes: u64,
    pub content_hash: String,
}

impl From<&FileRecord> for DownloadNotice {
    fn from(record: &FileRecord) -> Self {
        Self {
            original_name: record.original_name.clone(),
            size_bytes: record.size_bytes,
            content_hash: record.content_hash.clone(),
        }
    }
}

impl fmt::Display for DownloadNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Filename: {}", self.original_name)?;
        writeln!(f, "Size: {}", self.size_bytes)?;
        write!(f, "SHA512: {}", self.content_hash)
    }
}

/// Source end of a download session. Serves exactly one file.
pub struct Sender<'a> {
    storage: &'a FileStorage,
    db: &'a Database,
    clock: &'a dyn Clock,
}

impl<'a> Sender<'a> {
    pub fn new(storage: &'a FileStorage, db: &'a Database, clock: &'a dyn Clock) -> Self {
        Self { storage, db, clock }
    }

    /// Resolve a token to a servable record.
    ///
    /// Expiry is checked against the clock here, whether or not the reaper
    /// has removed the record yet.
    pub async fn resolve(&self, token: &str) -> Result<FileRecord> {
        let record = FileRecordRepository::new(self.db.pool())
            .get_by_token(token)
            .await?
            .ok_or(StorageError::NotFound)?;

        if record.is_expired_at(self.clock.now()) {
            debug!(token = %token, "token expired");
            return Err(StorageError::Expired.into());
        }
        if !self.storage.exists(Path::new(&record.stored_path)) {
            return Err(StorageError::Missing.into());
        }

        Ok(record)
    }

    /// Stream a resolved record to the peer.
    ///
    /// The file disappearing or shrinking mid-stream is terminal; nothing is
    /// retried.
    pub async fn send<R, W>(
        &self,
        channel: &mut AckChannel<R, W>,
        record: &FileRecord,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut file = self.storage.open(Path::new(&record.stored_path)).await?;

        channel.expect_ack().await?;

        let header = FileHeader {
            mode: DEFAULT_MODE.to_string(),
            size: record.size_bytes,
            name: record.token.clone(),
        };
        channel.write_all(&header.encode()).await?;
        channel.expect_ack().await?;

        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut sent: u64 = 0;
        while sent < record.size_bytes {
            let want = buf
                .len()
                .min(usize::try_from(record.size_bytes - sent).unwrap_or(usize::MAX));
            let n = file.read(&mut buf[..want]).await?;
            if n == 0 {
                return Err(ProtocolError::SizeMismatch {
                    expected: record.size_bytes,
                    actual: sent,
                }
                .into());
            }
            channel.write_unflushed(&buf[..n]).await?;
            sent += n as u64;
        }

        channel.send_ack().await?;
        channel.expect_ack().await?;

        info!(token = %record.token, size = sent, "served file");
        Ok(())
    }
}
