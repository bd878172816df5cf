//! SCP control records.

use super::{ProtocolError, ProtocolResult};

/// Mode presented in served headers. Stored records do not keep the upload mode.
pub const DEFAULT_MODE: &str = "0644";

/// Largest declared size accepted (the store keeps sizes as signed 64-bit).
pub const MAX_FILE_SIZE: u64 = i64::MAX as u64;

/// A `C<mode> <size> <name>` create-file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// Permission bits as sent by the peer. Opaque.
    pub mode: String,
    /// Declared payload length in bytes.
    pub size: u64,
    /// Client-supplied name. Untrusted, display only.
    pub name: String,
}

impl FileHeader {
    /// Encode as a wire line, newline included.
    pub fn encode(&self) -> Vec<u8> {
        format!("C{} {} {}\n", self.mode, self.size, self.name).into_bytes()
    }
}

/// One control line received from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// `T...` modification/access times. Ignored.
    Timestamp,
    /// `C...` start of a file.
    CreateFile(FileHeader),
    /// `E` end of directory. Ignored.
    EndDirectory,
    /// Whitespace-only line.
    Blank,
}

impl Record {
    /// Classify and parse a received line.
    pub fn parse(line: &[u8]) -> ProtocolResult<Self> {
        match line.first() {
            Some(b'T') => Ok(Record::Timestamp),
            Some(b'C') => parse_create_file(line).map(Record::CreateFile),
            Some(b'E') => Ok(Record::EndDirectory),
            _ if line.iter().all(u8::is_ascii_whitespace) => Ok(Record::Blank),
            _ => Err(ProtocolError::UnsupportedRecord(
                String::from_utf8_lossy(line).trim_end().to_string(),
            )),
        }
    }
}

/// Parse `C<mode> <size> <filename>`; the filename may contain spaces.
pub fn parse_create_file(line: &[u8]) -> ProtocolResult<FileHeader> {
    let text = String::from_utf8_lossy(line);
    let trimmed = text.trim();
    let malformed = || ProtocolError::MalformedRecord(trimmed.to_string());

    let rest = trimmed.strip_prefix('C').ok_or_else(malformed)?;
    let mut parts = rest.splitn(3, ' ');
    let mode = parts.next().ok_or_else(malformed)?;
    let size = parts
        .next()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|&n| n <= MAX_FILE_SIZE)
        .ok_or_else(malformed)?;
    let name = parts.next().ok_or_else(malformed)?;

    Ok(FileHeader {
        mode: mode.to_string(),
        size,
        name: name.to_string(),
    })
}
