//! Frame-delimited reads and writes over a byte stream.
//!
//! TCP delivers a byte stream, not messages. [`read_frame`] restores message
//! boundaries by reading the 8-byte total length first and then exactly the
//! remaining bytes of that frame.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ProtocolError, ProtocolResult};
use crate::{LENGTH_PREFIX_SIZE, MAX_FRAME_SIZE};

/// Reads one complete frame, length prefix included.
///
/// Returns `Ok(None)` if the stream ends before the first byte of a frame.
/// EOF anywhere inside a frame is an error.
pub async fn read_frame<R>(reader: &mut R) -> ProtocolResult<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut len_buf = [0u8; LENGTH_PREFIX_SIZE];
    let first = reader.read(&mut len_buf).await?;
    if first == 0 {
        return Ok(None);
    }
    if first < LENGTH_PREFIX_SIZE {
        reader.read_exact(&mut len_buf[first..]).await?;
    }

    let total = u64::from_be_bytes(len_buf);
    if total > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: total,
            max: MAX_FRAME_SIZE,
        });
    }
    if total < LENGTH_PREFIX_SIZE as u64 {
        return Err(ProtocolError::Truncated {
            expected: LENGTH_PREFIX_SIZE,
            received: total as usize,
        });
    }

    let mut frame = vec![0u8; total as usize];
    frame[..LENGTH_PREFIX_SIZE].copy_from_slice(&len_buf);
    reader.read_exact(&mut frame[LENGTH_PREFIX_SIZE..]).await?;
    Ok(Some(frame))
}

/// Writes one complete frame and flushes the writer.
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> ProtocolResult<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}
