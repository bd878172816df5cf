//! SCP wire protocol for dropgate.
//!
//! Implements the two ends of the SCP "source/sink" exchange that a stock
//! `scp` client speaks over an SSH channel:
//! - [`Receiver`]: the sink (`scp -t`), accepting uploads
//! - [`Sender`]: the source (`scp -f`), serving one stored file

mod channel;
pub mod command;
mod receiver;
mod record;
mod sender;

pub use channel::{AckChannel, ACK_OK, MAX_LINE_LENGTH};
pub use command::{OriginalCommand, FLAG_FROM, FLAG_TO};
pub use receiver::{Receipt, Receiver};
pub use record::{parse_create_file, FileHeader, Record, DEFAULT_MODE};
pub use sender::{DownloadNotice, Sender};

/// Payload chunk size for both directions (1 MiB).
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Result type for wire-level operations.
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

/// Errors that can occur on the wire.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// I/O error on the session stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer closed the stream between records.
    #[error("end of stream")]
    EndOfStream,

    /// Peer closed the stream in the middle of a record, payload or handshake.
    #[error("unexpected EOF while reading {context}")]
    UnexpectedEof {
        /// What was being read.
        context: &'static str,
    },

    /// Peer answered with something other than the "ok" byte.
    #[error("peer did not acknowledge (got 0x{0:02X})")]
    BadAck(u8),

    /// Payload was not followed by the "ok" byte.
    #[error("missing file terminator (got 0x{0:02X})")]
    MissingTerminator(u8),

    /// Create-file header could not be parsed.
    #[error("bad C record: {0:?}")]
    MalformedRecord(String),

    /// Record kind this gateway does not handle.
    #[error("unsupported scp record: {0:?}")]
    UnsupportedRecord(String),

    /// Control line exceeded the length limit.
    #[error("record longer than {0} bytes")]
    RecordTooLong(usize),

    /// Bytes written differ from the declared size.
    #[error("size mismatch: declared {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Declared size.
        expected: u64,
        /// Bytes actually stored.
        actual: u64,
    },
}
