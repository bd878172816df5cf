//! The one-byte acknowledgment channel.
//!
//! The SCP peer drives a strict half-duplex exchange: every control record
//! and every payload is answered with a single status byte. The channel
//! therefore reads only what it is asked for (line reads go byte by byte)
//! and flushes every write immediately.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{ProtocolError, ProtocolResult};

/// The "ok" status byte.
pub const ACK_OK: u8 = 0x00;

/// Upper bound on a control record line, newline included.
pub const MAX_LINE_LENGTH: usize = 4096;

/// Acknowledgment protocol primitives over a session's byte stream.
pub struct AckChannel<R, W> {
    reader: R,
    writer: W,
}

impl<R, W> AckChannel<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Wrap a reader/writer pair (stdin/stdout in production).
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Release the underlying reader and writer.
    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }

    /// Read exactly `n` bytes.
    pub async fn read_exact(&mut self, n: usize) -> ProtocolResult<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.fill(&mut buf, "read_exact").await?;
        Ok(buf)
    }

    /// Fill `buf` completely from the stream.
    async fn fill(&mut self, buf: &mut [u8], context: &'static str) -> ProtocolResult<()> {
        match self.reader.read_exact(buf).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(ProtocolError::UnexpectedEof { context })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read up to `buf.len()` bytes, failing on end of stream.
    ///
    /// Used for payload streaming, where the caller bounds `buf` to the
    /// bytes still owed by the peer.
    pub async fn read_some(&mut self, buf: &mut [u8]) -> ProtocolResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let n = self.reader.read(buf).await?;
        if n == 0 {
            return Err(ProtocolError::UnexpectedEof {
                context: "file data",
            });
        }
        Ok(n)
    }

    /// Read one newline-terminated line (newline included).
    ///
    /// Returns [`ProtocolError::EndOfStream`] if the stream ends before any
    /// byte of the line was read. A final line without a newline is returned
    /// as-is.
    pub async fn read_line(&mut self) -> ProtocolResult<Vec<u8>> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            let n = self.reader.read(&mut byte).await?;
            if n == 0 {
                if line.is_empty() {
                    return Err(ProtocolError::EndOfStream);
                }
                return Ok(line);
            }
            line.push(byte[0]);
            if byte[0] == b'\n' {
                return Ok(line);
            }
            if line.len() >= MAX_LINE_LENGTH {
                return Err(ProtocolError::RecordTooLong(MAX_LINE_LENGTH));
            }
        }
    }

    /// Read a single byte.
    pub async fn read_byte(&mut self) -> ProtocolResult<u8> {
        let mut buf = [0u8; 1];
        self.fill(&mut buf, "status byte").await?;
        Ok(buf[0])
    }

    /// Send the "ok" byte.
    pub async fn send_ack(&mut self) -> ProtocolResult<()> {
        self.write_all(&[ACK_OK]).await
    }

    /// Read one byte and require it to be the "ok" byte.
    pub async fn expect_ack(&mut self) -> ProtocolResult<()> {
        match self.read_byte().await? {
            ACK_OK => Ok(()),
            other => Err(ProtocolError::BadAck(other)),
        }
    }

    /// Write and flush raw bytes.
    pub async fn write_all(&mut self, data: &[u8]) -> ProtocolResult<()> {
        self.writer.write_all(data).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Write raw bytes without flushing (payload streaming).
    pub async fn write_unflushed(&mut self, data: &[u8]) -> ProtocolResult<()> {
        self.writer.write_all(data).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(input: &[u8]) -> AckChannel<&[u8], Vec<u8>> {
        AckChannel::new(input, Vec::new())
    }

    #[tokio::test]
    async fn test_read_exact() {
        let mut ch = channel(b"hello world");
        assert_eq!(ch.read_exact(5).await.unwrap(), b"hello");
        assert_eq!(ch.read_exact(6).await.unwrap(), b" world");
    }

    #[tokio::test]
    async fn test_read_exact_eof() {
        let mut ch = channel(b"");
        assert!(matches!(
            ch.read_exact(1).await,
            Err(ProtocolError::UnexpectedEof { .. })
        ));

        let mut ch = channel(b"abc");
        assert!(matches!(
            ch.read_exact(4).await,
            Err(ProtocolError::UnexpectedEof { .. })
        ));
    }

    #[tokio::test]
    async fn test_read_line_does_not_consume_past_newline() {
        let mut ch = channel(b"C0644 5 a.txt\nhello");
        assert_eq!(ch.read_line().await.unwrap(), b"C0644 5 a.txt\n");
        assert_eq!(ch.read_exact(5).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_read_line_eof() {
        let mut ch = channel(b"");
        assert!(matches!(
            ch.read_line().await,
            Err(ProtocolError::EndOfStream)
        ));
    }

    #[tokio::test]
    async fn test_read_line_partial_final_line() {
        let mut ch = channel(b"E");
        assert_eq!(ch.read_line().await.unwrap(), b"E");
        assert!(matches!(
            ch.read_line().await,
            Err(ProtocolError::EndOfStream)
        ));
    }

    #[tokio::test]
    async fn test_read_line_too_long() {
        let long = vec![b'x'; MAX_LINE_LENGTH + 10];
        let mut ch = channel(&long);
        assert!(matches!(
            ch.read_line().await,
            Err(ProtocolError::RecordTooLong(MAX_LINE_LENGTH))
        ));
    }

    #[tokio::test]
    async fn test_read_some_eof() {
        let mut ch = channel(b"ab");
        let mut buf = [0u8; 8];
        let n = ch.read_some(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ab");
        assert!(matches!(
            ch.read_some(&mut buf).await,
            Err(ProtocolError::UnexpectedEof { .. })
        ));
    }

    #[tokio::test]
    async fn test_send_ack() {
        let mut ch = channel(b"");
        ch.send_ack().await.unwrap();
        ch.send_ack().await.unwrap();
        assert_eq!(ch.into_inner().1, vec![ACK_OK, ACK_OK]);
    }

    #[tokio::test]
    async fn test_expect_ack_ok() {
        let mut ch = channel(&[ACK_OK]);
        assert!(ch.expect_ack().await.is_ok());
    }

    #[tokio::test]
    async fn test_expect_ack_error_byte() {
        let mut ch = channel(&[0x01]);
        assert!(matches!(
            ch.expect_ack().await,
            Err(ProtocolError::BadAck(0x01))
        ));
    }

    #[tokio::test]
    async fn test_expect_ack_eof() {
        let mut ch = channel(b"");
        assert!(matches!(
            ch.expect_ack().await,
            Err(ProtocolError::UnexpectedEof { .. })
        ));
    }
}
