//! dropgate - SCP file-drop gateway
//!
//! A forced-command target for the host SSH daemon. Upload sessions
//! (`scp -t`) store each received file under a random token with a
//! time-to-live; download sessions (`scp -f <token>`) serve one stored file.
//! A separate reaper process removes files once they expire.

pub mod config;
pub mod datetime;
pub mod db;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod protocol;
pub mod reaper;
pub mod storage;
pub mod token;

pub use config::Config;
pub use datetime::{Clock, FixedClock, SystemClock};
pub use db::{Database, ExpiredFile, FileRecord, FileRecordRepository};
pub use error::{GatewayError, Result, StorageError};
pub use gateway::{Gateway, Mode};
pub use protocol::{AckChannel, OriginalCommand, ProtocolError, Receipt, Receiver, Sender};
pub use reaper::{CleanupReaper, ReapSummary};
pub use storage::FileStorage;
