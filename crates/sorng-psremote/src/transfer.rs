//! Chunked file delivery over script invocations.
//!
//! Payloads at or under the chunk threshold go out in one write. Larger
//! payloads are split into fixed-size chunks that are appended strictly in
//! order; afterwards the remote file is re-hashed and compared against the
//! digest of the whole local payload.

use crate::checksum;
use crate::error::{PsRemoteError, PsRemoteResult};
use crate::execution::PsScriptExecutor;
use crate::scripts::PsScriptTemplates;
use crate::types::{PsScriptInvocation, PsTransferReport, PsTransferRequest, PsValue, SessionHandle};
use chrono::Utc;
use log::{debug, info, warn};
use std::time::Instant;

/// One planned write call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkWrite<'a> {
    pub index: usize,
    pub bytes: &'a [u8],
    pub append: bool,
    pub overwrite: bool,
}

/// Reject contradictory flags and unusable chunk parameters.
pub fn validate(request: &PsTransferRequest<'_>) -> PsRemoteResult<()> {
    if request.append && request.overwrite {
        return Err(PsRemoteError::invalid_argument(
            "append and overwrite are mutually exclusive",
        ));
    }
    if request.chunk_size == 0 {
        return Err(PsRemoteError::invalid_argument(
            "Chunk size must be greater than zero",
        ));
    }
    if request.remote_path.trim().is_empty() {
        return Err(PsRemoteError::invalid_argument("Remote path is empty"));
    }
    Ok(())
}

/// Consecutive `chunk_size` slices; the last holds the remainder.
pub fn split_into_chunks(payload: &[u8], chunk_size: usize) -> Vec<&[u8]> {
    payload.chunks(chunk_size.max(1)).collect()
}

/// Writes needed to deliver `request`, in send order.
///
/// Chunked deliveries force append on every chunk; only the first chunk
/// carries the caller's overwrite flag.
pub fn plan_writes<'a>(request: &PsTransferRequest<'a>) -> Vec<ChunkWrite<'a>> {
    if request.contents.len() <= request.chunk_threshold {
        return vec![ChunkWrite {
            index: 0,
            bytes: request.contents,
            append: request.append,
            overwrite: request.overwrite,
        }];
    }
    split_into_chunks(request.contents, request.chunk_size)
        .into_iter()
        .enumerate()
        .map(|(index, bytes)| ChunkWrite {
            index,
            bytes,
            append: true,
            overwrite: index == 0 && request.overwrite,
        })
        .collect()
}

/// Sends files through a [`PsScriptExecutor`].
pub struct PsFileTransfer<'a> {
    executor: &'a PsScriptExecutor,
}

impl<'a> PsFileTransfer<'a> {
    pub fn new(executor: &'a PsScriptExecutor) -> Self {
        Self { executor }
    }

    /// Deliver the payload into `session` and verify it.
    ///
    /// A checksum mismatch surfaces as `RemoteExecutionFailed` after all
    /// bytes have been written.
    pub async fn send(
        &self,
        request: &PsTransferRequest<'_>,
        session: &SessionHandle,
    ) -> PsRemoteResult<PsTransferReport> {
        validate(request)?;
        let started_at = Utc::now();
        let clock = Instant::now();
        let path = request.remote_path;

        if !request.append && !request.overwrite {
            self.executor
                .execute(
                    &PsScriptInvocation::new(session, PsScriptTemplates::ASSERT_PATH_ABSENT)
                        .arg(path),
                )
                .await?;
        }

        let writes = plan_writes(request);
        let chunked = request.contents.len() > request.chunk_threshold;
        info!(
            "Sending {} bytes to {}:{} in {} write(s)",
            request.contents.len(),
            session.target_name(),
            path,
            writes.len()
        );

        for write in &writes {
            debug!(
                "Writing chunk {}/{} ({} bytes, append={}, overwrite={})",
                write.index + 1,
                writes.len(),
                write.bytes.len(),
                write.append,
                write.overwrite
            );
            self.executor
                .execute(
                    &PsScriptInvocation::new(session, PsScriptTemplates::WRITE_FILE)
                        .arg(path)
                        .arg(PsValue::Bytes(write.bytes.to_vec()))
                        .arg(write.append)
                        .arg(write.overwrite),
                )
                .await?;
        }

        let expected = checksum::digest(request.contents);
        let verified = self
            .executor
            .execute(
                &PsScriptInvocation::new(session, PsScriptTemplates::VERIFY_CHECKSUM)
                    .arg(path)
                    .arg(expected.as_str()),
            )
            .await;
        if let Err(e) = verified {
            warn!("{} bytes written to {} but verification failed", request.contents.len(), path);
            return Err(e);
        }

        let elapsed_ms = clock.elapsed().as_millis() as u64;
        info!(
            "Sent {} bytes to {} in {}ms (sha256 {})",
            request.contents.len(),
            path,
            elapsed_ms,
            expected
        );

        Ok(PsTransferReport {
            remote_path: path.to_string(),
            total_bytes: request.contents.len() as u64,
            chunk_count: writes.len(),
            chunked,
            checksum: expected,
            started_at,
            elapsed_ms,
        })
    }
}
