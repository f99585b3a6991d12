//! Length-prefixed framing codec for the ingest link.
//!
//! Each message: a 4-byte unsigned big-endian length header, followed by
//! exactly that many payload bytes. A frame whose declared length exceeds
//! `MAX_FRAME_LEN` is rejected with [`FramingError::TooLarge`]; the
//! caller may continue reading frames on the same connection, matching
//! the source implementation's behavior of logging and continuing rather
//! than dropping the connection outright.

use crate::error::FramingError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const MAX_FRAME_LEN: u32 = 1_000_000;

/// Read exactly one frame from `reader`.
///
/// Returns `Err(FramingError::Eof)` if the stream ends before the 4-byte
/// length header can be read (a clean disconnect). Returns
/// `Err(FramingError::TooLarge)` if the declared length exceeds
/// `MAX_FRAME_LEN`; the caller should log and attempt to read the next
/// frame on the same connection rather than closing it, per spec.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, FramingError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(FramingError::Eof);
        }
        Err(e) => return Err(FramingError::Io(e)),
    }
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(FramingError::TooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            FramingError::Eof
        } else {
            FramingError::Io(e)
        }
    })?;
    Ok(payload)
}

/// Encode a payload with its 4-byte big-endian length prefix.
///
/// Used by test harnesses and the ingest-side client rather than the
/// Processor itself (the Processor only decodes frames).
#[must_use]
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Write one framed message to `writer` and flush it.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> std::io::Result<()> {
    writer.write_all(&encode(payload)).await?;
    writer.flush().await
}
