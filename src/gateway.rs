//! Session driver for the forced command.
//!
//! One invocation serves one session: the mode argument selects upload or
//! download, the SSH original command must carry the matching scp flag, and
//! the outcome is reported on a side channel (stderr) as receipts, a download
//! notice or a single `ERROR:` line. The wire stream (stdin/stdout) only
//! ever carries protocol bytes.

use std::str::FromStr;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::datetime::Clock;
use crate::db::Database;
use crate::error::EXIT_OK;
use crate::protocol::{
    AckChannel, DownloadNotice, OriginalCommand, Receiver, Sender, FLAG_FROM, FLAG_TO,
};
use crate::storage::FileStorage;
use crate::{GatewayError, Result};

/// Usage line for a bad mode argument.
pub const USAGE: &str = "usage: dropgate [put|get]";

/// Session kind selected by the forced command's argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Upload (`scp -t`).
    Put,
    /// Download (`scp -f <token>`).
    Get,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Put => "put",
            Mode::Get => "get",
        }
    }
}

impl Mode {
    /// Parse the process arguments (program name first). Exactly one
    /// argument, `put` or `get`, is accepted.
    pub fn from_args<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let args: Vec<String> = args.into_iter().skip(1).collect();
        match args.as_slice() {
            [arg] => arg.parse(),
            _ => Err(GatewayError::Usage(USAGE.to_string())),
        }
    }
}

impl FromStr for Mode {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "put" => Ok(Mode::Put),
            "get" => Ok(Mode::Get),
            _ => Err(GatewayError::Usage(USAGE.to_string())),
        }
    }
}

/// Everything a session needs, borrowed from the process.
pub struct Gateway<'a> {
    config: &'a Config,
    storage: &'a FileStorage,
    db: &'a Database,
    clock: &'a dyn Clock,
}

impl<'a> Gateway<'a> {
    pub fn new(
        config: &'a Config,
        storage: &'a FileStorage,
        db: &'a Database,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            config,
            storage,
            db,
            clock,
        }
    }

    /// Run one session and return the process exit code.
    ///
    /// `reader`/`writer` carry the wire protocol; `side` receives the
    /// human-readable report.
    pub async fn run<R, W, E>(
        &self,
        mode: Mode,
        command: &OriginalCommand,
        reader: R,
        writer: W,
        side: &mut E,
    ) -> i32
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
        E: AsyncWrite + Unpin,
    {
        info!(
            mode = mode.as_str(),
            command = %command.raw(),
            flags = %command.flags_display(),
            data_dir = %self.storage.base_path().display(),
            "session start"
        );

        let mut channel = AckChannel::new(reader, writer);
        let result = match check_command(mode, command) {
            Ok(()) => match mode {
                Mode::Put => self.upload(&mut channel, side).await,
                Mode::Get => self.download(command, &mut channel, side).await,
            },
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => EXIT_OK,
            Err(e) => {
                error!(mode = mode.as_str(), error = %e, "session failed");
                report(side, &error_line(mode, &e)).await;
                e.exit_code()
            }
        }
    }

    async fn upload<R, W, E>(
        &self,
        channel: &mut AckChannel<R, W>,
        side: &mut E,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
        E: AsyncWrite + Unpin,
    {
        let ttl = self.config.storage.ttl();
        let mut receiver = Receiver::new(self.storage, self.db, self.clock, ttl);
        let result = receiver.run(channel).await;

        for receipt in receiver.receipts() {
            report(side, &format!("{receipt}\n")).await;
        }
        result
    }

    async fn download<R, W, E>(
        &self,
        command: &OriginalCommand,
        channel: &mut AckChannel<R, W>,
        side: &mut E,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
        E: AsyncWrite + Unpin,
    {
        let token = command.download_token().ok_or_else(missing_token)?;

        let sender = Sender::new(self.storage, self.db, self.clock);
        let record = sender.resolve(token).await?;

        report(side, &DownloadNotice::from(&record).to_string()).await;
        sender.send(channel, &record).await
    }
}

/// Check that the original command matches the mode.
///
/// Needs neither the store nor the wire, so the binary runs it before
/// opening either.
pub fn check_command(mode: Mode, command: &OriginalCommand) -> Result<()> {
    match mode {
        Mode::Put if !command.has_flag(FLAG_TO) => Err(GatewayError::Usage(
            "only scp upload is allowed (scp -t)".to_string(),
        )),
        Mode::Get if !command.has_flag(FLAG_FROM) => Err(GatewayError::Usage(
            "only scp download is allowed (scp -f <token>)".to_string(),
        )),
        Mode::Get if command.download_token().is_none() => Err(missing_token()),
        _ => Ok(()),
    }
}

fn missing_token() -> GatewayError {
    GatewayError::Usage("missing token".to_string())
}

/// The `ERROR:` line for a failed session.
pub fn error_line(mode: Mode, err: &GatewayError) -> String {
    match (mode, err) {
        (_, GatewayError::Usage(msg)) => format!("ERROR: {msg}"),
        (_, GatewayError::Storage(e)) => format!("ERROR: {e}"),
        (Mode::Put, e) => format!("ERROR: upload failed: {e}"),
        (Mode::Get, e) => format!("ERROR: download failed: {e}"),
    }
}

/// Write a report line to the side channel. Failures are logged only.
async fn report<E>(side: &mut E, text: &str)
where
    E: AsyncWrite + Unpin,
{
    let line = format!("{text}\n");
    if let Err(e) = side.write_all(line.as_bytes()).await {
        debug!("failed to write to side channel: {}", e);
        return;
    }
    if let Err(e) = side.flush().await {
        debug!("failed to flush side channel: {}", e);
    }
}
