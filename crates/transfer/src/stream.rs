//! The raw, strictly sequential image streaming loop.

use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::{DEFAULT_BLOCK_SIZE, DEFAULT_IO_TIMEOUT, TransferError, TransferSession};

/// Tuning for the streaming loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    /// Bytes per read/write.
    pub block_size: usize,
    /// Deadline applied to every individual read and write (`None` = unbounded).
    pub io_timeout: Option<Duration>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            io_timeout: Some(DEFAULT_IO_TIMEOUT),
        }
    }
}

async fn bounded<T, F>(limit: Option<Duration>, op: F) -> Result<T, TransferError>
where
    F: Future<Output = std::io::Result<T>>,
{
    match limit {
        Some(limit) => match tokio::time::timeout(limit, op).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(TransferError::Timeout(limit)),
        },
        None => Ok(op.await?),
    }
}

/// Copies `source` to `conn` block by block until EOF.
///
/// Returns the number of bytes written to the connection.
pub async fn send_from<R, W>(
    source: &mut R,
    conn: &mut W,
    opts: &StreamOptions,
) -> Result<u64, TransferError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; opts.block_size.max(1)];
    let mut sent = 0u64;

    loop {
        let n = bounded(opts.io_timeout, source.read(&mut buf)).await?;
        if n == 0 {
            break;
        }
        bounded(opts.io_timeout, conn.write_all(&buf[..n])).await?;
        sent += n as u64;
        trace!(sent, "block sent");
    }

    bounded(opts.io_timeout, conn.flush()).await?;
    Ok(sent)
}

/// Appends bytes from `conn` to `sink` until the session's declared size is
/// reached or the connection yields no more data.
///
/// Reads never ask for more than the remaining declared bytes, so anything
/// the sender pushes past that point is left unread. Whatever was appended
/// before an error is flushed and stays recorded in `session`.
pub async fn receive_into<R, W>(
    conn: &mut R,
    sink: &mut W,
    session: &mut TransferSession,
    opts: &StreamOptions,
) -> Result<(), TransferError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; opts.block_size.max(1)];

    let result = async {
        while !session.is_complete() {
            let want = session.remaining().min(buf.len() as u64) as usize;
            let n = bounded(opts.io_timeout, conn.read(&mut buf[..want])).await?;
            if n == 0 {
                debug!(
                    received = session.local_size(),
                    declared = session.declared_size(),
                    "connection closed before declared size"
                );
                break;
            }
            bounded(opts.io_timeout, sink.write_all(&buf[..n])).await?;
            session.record(n as u64);
            trace!(local_size = session.local_size(), "block received");
        }
        Ok::<(), TransferError>(())
    }
    .await;

    let flushed = bounded(opts.io_timeout, sink.flush()).await;
    result.and(flushed)
}
