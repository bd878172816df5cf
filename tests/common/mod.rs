//! Test helpers for end-to-end tests.
//!
//! Provides TestEnv (scratch data directory, in-memory store, fixed clock)
//! and a scripted scp peer speaking over an in-memory duplex pipe.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use dropgate::config::Config;
use dropgate::{Database, FileStorage, FixedClock, Gateway, Mode, OriginalCommand};

/// Pipe buffer size for the duplex stream.
pub const PIPE_SIZE: usize = 64 * 1024;

/// Session start time used by every test.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// A gateway deployment in a temporary directory.
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub config: Config,
    pub storage: FileStorage,
    pub db: Arc<Database>,
    pub clock: Arc<FixedClock>,
}

/// Result of one gateway session.
pub struct SessionOutput {
    pub code: i32,
    pub side: String,
}

impl SessionOutput {
    /// Value of the first `key=` line on the side channel.
    pub fn field(&self, key: &str) -> Option<String> {
        let prefix = format!("{key}=");
        self.side
            .lines()
            .find_map(|l| l.strip_prefix(prefix.as_str()))
            .map(str::to_string)
    }
}

impl TestEnv {
    /// Create an environment with a TTL of `ttl_days`.
    pub async fn new(ttl_days: u32) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = Config::default();
        config.storage.data_dir = temp_dir.path().join("data").to_string_lossy().into_owned();
        config.storage.ttl_days = ttl_days;
        config.validate().expect("Invalid test config");

        let storage = FileStorage::new(config.data_dir()).expect("Failed to create storage");
        let db = Database::open_in_memory()
            .await
            .expect("Failed to create test database");

        Self {
            temp_dir,
            config,
            storage,
            db: Arc::new(db),
            clock: Arc::new(FixedClock::new(epoch())),
        }
    }

    /// Run one gateway session against a peer on the other end of a pipe.
    ///
    /// `peer` receives the client half and must drop it when done.
    pub async fn session<F, Fut, T>(&self, mode: Mode, command: &str, peer: F) -> (SessionOutput, T)
    where
        F: FnOnce(DuplexStream) -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let (client, server) = tokio::io::duplex(PIPE_SIZE);
        let (reader, writer) = tokio::io::split(server);
        let command = OriginalCommand::parse(command);
        let gateway = Gateway::new(&self.config, &self.storage, &self.db, self.clock.as_ref());

        let mut side = Vec::new();
        let (code, peer_result) = tokio::join!(
            gateway.run(mode, &command, reader, writer, &mut side),
            peer(client)
        );

        (
            SessionOutput {
                code,
                side: String::from_utf8(side).expect("side channel is not UTF-8"),
            },
            peer_result,
        )
    }
}

/// Read one status byte from the gateway.
pub async fn read_status(stream: &mut DuplexStream) -> u8 {
    stream.read_u8().await.expect("gateway closed the stream")
}

/// Upload `files` the way `scp -t` drives the sink, then close.
///
/// Returns every status byte received.
pub async fn scp_upload(mut stream: DuplexStream, files: Vec<(String, Vec<u8>)>) -> Vec<u8> {
    let mut statuses = vec![read_status(&mut stream).await];

    for (name, contents) in files {
        stream
            .write_all(format!("C0644 {} {}\n", contents.len(), name).as_bytes())
            .await
            .unwrap();
        statuses.push(read_status(&mut stream).await);

        stream.write_all(&contents).await.unwrap();
        stream.write_all(&[0]).await.unwrap();
        statuses.push(read_status(&mut stream).await);
    }

    drop(stream);
    statuses
}

/// Download one file the way `scp -f` drives the source.
///
/// Returns the header line and the payload.
pub async fn scp_download(mut stream: DuplexStream) -> Option<(String, Vec<u8>)> {
    stream.write_all(&[0]).await.ok()?;

    let mut header = Vec::new();
    loop {
        let byte = stream.read_u8().await.ok()?;
        if byte == b'\n' {
            break;
        }
        header.push(byte);
    }
    let header = String::from_utf8(header).ok()?;
    let size: usize = header.split(' ').nth(1)?.parse().ok()?;
    stream.write_all(&[0]).await.ok()?;

    let mut payload = vec![0u8; size];
    stream.read_exact(&mut payload).await.ok()?;
    if stream.read_u8().await.ok()? != 0 {
        return None;
    }
    stream.write_all(&[0]).await.ok()?;

    Some((header, payload))
}
