//! Stream limit governor: bounded newline-delimited reads.
//!
//! A bare `read_line` on a pipe allocates without limit when the peer never
//! sends a newline. These helpers cap one logical message at a configured
//! byte count and report the overflow explicitly instead.

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error::FramingError;

/// Upper bound on how long [`skip_line`] keeps discarding bytes.
const SKIP_TIMEOUT: Duration = Duration::from_secs(30);

/// Read a single line, enforcing a byte limit.
///
/// Raw bytes are accumulated into a `Vec<u8>` so multi-byte UTF-8
/// characters that straddle internal buffer boundaries are not corrupted.
/// The terminating newline, if any, is included in `buf`.
///
/// # Returns
///
/// - `Ok(n)` where `n > 0`: a line was read into `buf`. At EOF the final
///   line may lack its newline.
/// - `Ok(0)`: EOF with nothing buffered
/// - `Err(FramingError::MessageTooLarge)`: the limit was reached before a
///   newline. The bytes already consumed are lost; the reader is left
///   mid-message, so the caller either gives up on the stream or calls
///   [`skip_line`].
/// - `Err(FramingError::Io)`: underlying I/O error
pub async fn bounded_read_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max_bytes: usize,
) -> Result<usize, FramingError> {
    let mut total = 0usize;
    loop {
        let available = reader.fill_buf().await?;

        if available.is_empty() {
            return Ok(total);
        }

        match available.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                let to_consume = pos + 1;
                if total + to_consume > max_bytes {
                    reader.consume(to_consume);
                    return Err(FramingError::MessageTooLarge {
                        max_bytes,
                        observed: total + to_consume,
                    });
                }

                buf.extend_from_slice(&available[..to_consume]);
                total += to_consume;
                reader.consume(to_consume);
                return Ok(total);
            }
            None => {
                let len = available.len();
                if total + len > max_bytes {
                    reader.consume(len);
                    return Err(FramingError::MessageTooLarge {
                        max_bytes,
                        observed: total + len,
                    });
                }

                buf.extend_from_slice(available);
                total += len;
                reader.consume(len);
            }
        }
    }
}

/// Discard bytes until just past the next newline, or EOF.
///
/// Used after an overflow on streams where losing one line is acceptable.
/// Gives up after a timeout so a stalled peer cannot hang the caller.
/// Returns the number of bytes discarded.
pub async fn skip_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> usize {
    let mut skipped = 0usize;
    let drain = async {
        loop {
            match reader.fill_buf().await {
                Ok([]) => return,
                Ok(buf) => {
                    if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                        reader.consume(pos + 1);
                        skipped += pos + 1;
                        return;
                    }
                    let len = buf.len();
                    reader.consume(len);
                    skipped += len;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "IO error while skipping oversized line");
                    return;
                }
            }
        }
    };
    if tokio::time::timeout(SKIP_TIMEOUT, drain).await.is_err() {
        tracing::warn!("skipping oversized line timed out");
    }
    skipped
}
