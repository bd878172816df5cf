//! Upload side of the exchange (`scp -t`).

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha512};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, trace, warn};

use super::record::{FileHeader, Record};
use super::{AckChannel, ProtocolError, ACK_OK, CHUNK_SIZE};
use crate::datetime::{to_rfc3339, Clock};
use crate::db::{Database, FileRecord, FileRecordRepository};
use crate::storage::{remove_if_exists, FileStorage};
use crate::token::generate_token;
use crate::{GatewayError, Result};

/// Report for one stored file, shown to the uploader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub token: String,
    pub content_hash: String,
    pub expires_at: DateTime<Utc>,
    pub original_name: String,
    pub size_bytes: u64,
    pub mode: String,
}

impl fmt::Display for Receipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "RECEIPT")?;
        writeln!(f, "token={}", self.token)?;
        writeln!(f, "sha512={}", self.content_hash)?;
        writeln!(f, "expires_at={}", to_rfc3339(&self.expires_at))?;
        writeln!(f, "original_name={}", self.original_name)?;
        writeln!(f, "size_bytes={}", self.size_bytes)?;
        write!(f, "mode={}", self.mode)
    }
}

/// Sink end of an upload session.
///
/// Receipts accumulate as files are registered, so a session that fails on
/// its second file still reports the first.
pub struct Receiver<'a> {
    storage: &'a FileStorage,
    db: &'a Database,
    clock: &'a dyn Clock,
    ttl: Duration,
    token_source: fn() -> String,
    receipts: Vec<Receipt>,
}

impl<'a> Receiver<'a> {
    pub fn new(
        storage: &'a FileStorage,
        db: &'a Database,
        clock: &'a dyn Clock,
        ttl: Duration,
    ) -> Self {
        Self {
            storage,
            db,
            clock,
            ttl,
            token_source: generate_token,
            receipts: Vec::new(),
        }
    }

    /// Replace the token generator.
    pub fn with_token_source(mut self, token_source: fn() -> String) -> Self {
        self.token_source = token_source;
        self
    }

    /// Receipts for the files registered so far.
    pub fn receipts(&self) -> &[Receipt] {
        &self.receipts
    }

    pub fn into_receipts(self) -> Vec<Receipt> {
        self.receipts
    }

    /// Run the session until the peer closes the stream between records.
    pub async fn run<R, W>(&mut self, channel: &mut AckChannel<R, W>) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        channel.send_ack().await?;

        loop {
            let line = match channel.read_line().await {
                Ok(line) => line,
                Err(ProtocolError::EndOfStream) => break,
                Err(e) => return Err(e.into()),
            };

            match Record::parse(&line)? {
                Record::Timestamp => {
                    trace!("timestamp record");
                    channel.send_ack().await?;
                }
                Record::CreateFile(header) => self.receive_file(channel, header).await?,
                Record::EndDirectory => {
                    trace!("end-directory record");
                    channel.send_ack().await?;
                }
                Record::Blank => {}
            }
        }

        debug!(files = self.receipts.len(), "upload stream closed");
        Ok(())
    }

    async fn receive_file<R, W>(
        &mut self,
        channel: &mut AckChannel<R, W>,
        header: FileHeader,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        channel.send_ack().await?;

        let token = (self.token_source)();
        debug!(token = %token, name = %header.name, size = header.size, "receiving file");

        let stored = match self.store_payload(channel, &token, header.size).await {
            Ok(hash) => self.storage.persist(&token).await.map(|path| (hash, path)),
            Err(e) => Err(e),
        };
        let (content_hash, stored_path) = match stored {
            Ok(stored) => stored,
            Err(e) => {
                if let Err(cleanup) = self.storage.discard_temp(&token).await {
                    warn!(token = %token, error = %cleanup, "failed to remove temporary file");
                }
                return Err(e);
            }
        };

        match self
            .register(channel, &token, content_hash, &header, &stored_path)
            .await
        {
            Ok(receipt) => {
                self.receipts.push(receipt);
                Ok(())
            }
            Err(e) => {
                if let Err(cleanup) = remove_if_exists(&stored_path).await {
                    warn!(token = %token, error = %cleanup, "failed to remove unregistered file");
                }
                Err(e)
            }
        }
    }

    /// Stream exactly `size` payload bytes into the token's temporary file
    /// and check the terminator. Returns the hex digest.
    async fn store_payload<R, W>(
        &self,
        channel: &mut AckChannel<R, W>,
        token: &str,
        size: u64,
    ) -> Result<String>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut file = self.storage.create_temp(token).await?;
        let mut hasher = Sha512::new();
        let mut buf = vec![0u8; CHUNK_SIZE.min(usize::try_from(size).unwrap_or(CHUNK_SIZE))];
        let mut remaining = size;

        while remaining > 0 {
            let want = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
            let n = channel.read_some(&mut buf[..want]).await?;
            hasher.update(&buf[..n]);
            file.write_all(&buf[..n]).await?;
            remaining -= n as u64;
        }

        file.flush().await?;
        file.sync_all().await?;
        let actual = file.metadata().await?.len();
        drop(file);

        if actual != size {
            return Err(ProtocolError::SizeMismatch {
                expected: size,
                actual,
            }
            .into());
        }

        match channel.read_byte().await? {
            ACK_OK => Ok(format!("{:x}", hasher.finalize())),
            other => Err(ProtocolError::MissingTerminator(other).into()),
        }
    }

    /// Acknowledge the payload and insert its record.
    async fn register<R, W>(
        &self,
        channel: &mut AckChannel<R, W>,
        token: &str,
        content_hash: String,
        header: &FileHeader,
        stored_path: &Path,
    ) -> Result<Receipt>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        channel.send_ack().await?;

        let created_at = self.clock.now();
        let record = FileRecord {
            token: token.to_string(),
            content_hash,
            original_name: header.name.clone(),
            size_bytes: header.size,
            stored_path: stored_path.to_string_lossy().into_owned(),
            created_at,
            expires_at: created_at.checked_add_signed(self.ttl).ok_or_else(|| {
                GatewayError::Validation(format!("ttl out of range: {}", self.ttl))
            })?,
        };

        FileRecordRepository::new(self.db.pool()).insert(&record).await?;
        info!(
            token = %record.token,
            size = record.size_bytes,
            path = %record.stored_path,
            expires_at = %to_rfc3339(&record.expires_at),
            "stored file"
        );

        Ok(Receipt {
            token: record.token,
            content_hash: record.content_hash,
            expires_at: record.expires_at,
            original_name: record.original_name,
            size_bytes: record.size_bytes,
            mode: header.mode.clone(),
        })
    }
}
