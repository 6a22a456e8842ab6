//! Length-prefixed framing.
//!
//! A frame is a 4-byte big-endian length followed by that many bytes of JSON.
//! The length is checked against the caller's ceiling before any payload
//! buffer is allocated.

use std::future::Future;
use std::io::ErrorKind;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{DaemonError, ProtocolErrorKind};

/// Size of the frame length header.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Read one frame and return its payload.
///
/// EOF before the header is a clean close (`ConnectionClosed`); EOF inside
/// the payload means the peer sent a truncated frame.
pub async fn read_message<R>(reader: &mut R, max_size: usize) -> Result<Vec<u8>, DaemonError>
where
    R: AsyncReadExt + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_SIZE];
    if let Err(e) = reader.read_exact(&mut header).await {
        return Err(match e.kind() {
            ErrorKind::UnexpectedEof => DaemonError::Protocol {
                kind: ProtocolErrorKind::ConnectionClosed,
            },
            _ => DaemonError::Io(e),
        });
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > max_size {
        return Err(DaemonError::Protocol {
            kind: ProtocolErrorKind::MessageTooLarge {
                size: len,
                max: max_size,
            },
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await.map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => DaemonError::Protocol {
            kind: ProtocolErrorKind::InvalidMessageFormat {
                message: format!("frame truncated, expected {} bytes", len),
            },
        },
        _ => DaemonError::Io(e),
    })?;

    Ok(payload)
}

/// Write `data` as one frame and flush.
pub async fn write_message<W>(writer: &mut W, data: &[u8]) -> Result<(), DaemonError>
where
    W: AsyncWriteExt + Unpin,
{
    let len = u32::try_from(data.len()).map_err(|_| DaemonError::Protocol {
        kind: ProtocolErrorKind::MessageTooLarge {
            size: data.len(),
            max: u32::MAX as usize,
        },
    })?;

    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + data.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(data);
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

async fn with_deadline<T, F>(limit: Duration, io: F) -> Result<T, DaemonError>
where
    F: Future<Output = Result<T, DaemonError>>,
{
    tokio::time::timeout(limit, io)
        .await
        .unwrap_or_else(|_| {
            Err(DaemonError::Protocol {
                kind: ProtocolErrorKind::ConnectionTimeout,
            })
        })
}

/// [`read_message`] bounded by `limit`; expiry yields `ConnectionTimeout`.
pub async fn read_message_with_timeout<R>(
    reader: &mut R,
    max_size: usize,
    limit: Duration,
) -> Result<Vec<u8>, DaemonError>
where
    R: AsyncReadExt + Unpin,
{
    with_deadline(limit, read_message(reader, max_size)).await
}

/// [`write_message`] bounded by `limit`.
pub async fn write_message_with_timeout<W>(
    writer: &mut W,
    data: &[u8],
    limit: Duration,
) -> Result<(), DaemonError>
where
    W: AsyncWriteExt + Unpin,
{
    with_deadline(limit, write_message(writer, data)).await
}
