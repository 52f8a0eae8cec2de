use crate::assemble::assemble;
use crate::dispatch::{dispatch_concurrent, Halted};
use crate::error::{Error, Result};
use crate::options::UploadOptions;
use crate::part::{upload_part, RetryPolicy};
use crate::plan::{plan, ChunkDescriptor};
use crate::storage::{PartReceipt, RemoteStorage, UploadHandle, UploadMetadata, UploadedFile};
use bytes::Bytes;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

#[derive(Clone, Debug)]
pub struct MultipartUploadRequest {
    pub body: Bytes,
    pub filename: String,
    pub metadata: UploadMetadata,
}

impl MultipartUploadRequest {
    pub fn new(body: impl Into<Bytes>, filename: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            filename: filename.into(),
            metadata: UploadMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: UploadMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum UploadState {
    Planned,
    InProgress,
    Completing,
    Completed,
    Failed,
    Cancelled,
}

impl UploadState {
    fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    fn can_become(self, next: Self) -> bool {
        use UploadState::*;
        match (self, next) {
            (Planned, InProgress) | (InProgress, Completing) | (Completing, Completed) => true,
            (Planned, Cancelled) | (InProgress, Cancelled) => true,
            (state, Failed) => !state.is_terminal(),
            _ => false,
        }
    }
}

/// Bookkeeping of one upload, owned by the coordinator alone.
#[derive(Debug)]
pub(crate) struct UploadSession {
    upload_id: Option<String>,
    filename: String,
    total_chunks: usize,
    parts: Vec<PartReceipt>,
    state: UploadState,
}

impl UploadSession {
    fn new(filename: impl Into<String>, total_chunks: usize) -> Self {
        Self {
            upload_id: None,
            filename: filename.into(),
            total_chunks,
            parts: Vec::new(),
            state: UploadState::Planned,
        }
    }

    fn transition(&mut self, next: UploadState) -> Result<()> {
        if !self.state.can_become(next) {
            return Err(Error::Configuration(format!(
                "invalid upload state transition {:?} -> {:?}",
                self.state, next
            )));
        }
        debug!(filename = %self.filename, from = ?self.state, to = ?next, "upload state changed");
        self.state = next;
        Ok(())
    }

    fn open(&mut self, upload_id: String) -> Result<()> {
        self.transition(UploadState::InProgress)?;
        self.upload_id = Some(upload_id);
        Ok(())
    }

    /// Keeps `receipt` for the manifest and returns the percentage of parts
    /// done, capped at 100 and rounded to two decimals.
    fn record(&mut self, receipt: PartReceipt) -> f64 {
        self.parts.push(receipt);
        let percentage = 100.0 * self.parts.len() as f64 / self.total_chunks as f64;
        (percentage.min(100.0) * 100.0).round() / 100.0
    }

    /// Moves to a terminal state matching `e`, unless already terminal.
    fn fail(&mut self, e: &Error) {
        let next = if e.is_cancelled() {
            UploadState::Cancelled
        } else {
            UploadState::Failed
        };
        if self.state.can_become(next) {
            self.state = next;
        } else if !self.state.is_terminal() {
            self.state = UploadState::Failed;
        }
        debug!(upload_id = ?self.upload_id, state = ?self.state, error = %e, "upload stopped");
    }
}

/// Uploads `request.body` as `request.filename` in parts of
/// `options.chunk_size`, at most `options.max_concurrency` at a time.
///
/// The remote session is left open when a part fails or the upload is
/// cancelled; no abort is sent.
pub async fn multipart_upload<S>(
    storage: Arc<S>,
    request: MultipartUploadRequest,
    options: &UploadOptions,
) -> Result<UploadedFile>
where
    S: RemoteStorage + ?Sized + 'static,
{
    let span = info_span!("multipart_upload", filename = %request.filename);
    async move {
        options.validate()?;
        let descriptors = plan(request.body.len(), options.chunk_size)?;

        let mut session = UploadSession::new(request.filename.clone(), descriptors.len());
        match run(&storage, request, descriptors, options, &mut session).await {
            Ok(file) => {
                info!(file = %file.file, parts = session.total_chunks, "upload completed");
                Ok(file)
            }
            Err(e) => {
                session.fail(&e);
                Err(e)
            }
        }
    }
    .instrument(span)
    .await
}

async fn run<S>(
    storage: &Arc<S>,
    request: MultipartUploadRequest,
    descriptors: Vec<ChunkDescriptor>,
    options: &UploadOptions,
    session: &mut UploadSession,
) -> Result<UploadedFile>
where
    S: RemoteStorage + ?Sized + 'static,
{
    if options.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let MultipartUploadRequest {
        body,
        filename,
        metadata,
    } = request;
    let upload_id = storage.start_multipart_upload(&filename, &metadata).await?;
    debug!(%upload_id, parts = descriptors.len(), "multipart upload started");
    session.open(upload_id.clone())?;

    let handle = Arc::new(UploadHandle {
        upload_id,
        filename,
        metadata,
    });
    let policy = RetryPolicy::from(options);
    let halt = match &options.cancel {
        Some(cancel) => cancel.child_token(),
        None => CancellationToken::new(),
    };

    let tasks = descriptors.into_iter().map(|descriptor| {
        let storage = storage.clone();
        let handle = handle.clone();
        let body = body.clone();
        let halt = halt.clone();
        async move { upload_part(&*storage, &handle, descriptor, &body, policy, &halt).await }
    });

    dispatch_concurrent(
        tasks,
        options.max_concurrency,
        options.cancel.as_ref(),
        &halt,
        |receipt: PartReceipt| {
            let part_number = receipt.part_number;
            let percentage = session.record(receipt);
            debug!(part_number, percentage, "part uploaded");
            if let Some(on_progress) = &options.on_progress {
                on_progress(percentage);
            }
        },
    )
    .await
    .map_err(|halted| match halted {
        // a part woken by the caller's cancellation reports `Cancelled` too
        Halted::Failed(e) if !e.is_cancelled() => e,
        Halted::Failed(_) | Halted::Cancelled => Error::Cancelled,
    })?;

    if options.is_cancelled() {
        return Err(Error::Cancelled);
    }

    session.transition(UploadState::Completing)?;
    let manifest = assemble(&session.parts, session.total_chunks)?;
    let file = complete(&**storage, &handle, &manifest, options).await?;
    session.transition(UploadState::Completed)?;
    Ok(file)
}

async fn complete<S>(
    storage: &S,
    handle: &UploadHandle,
    manifest: &[PartReceipt],
    options: &UploadOptions,
) -> Result<UploadedFile>
where
    S: RemoteStorage + ?Sized,
{
    let mut attempt = 1;
    loop {
        match storage.complete_multipart_upload(handle, manifest).await {
            Ok(file) => return Ok(file),
            Err(e) if e.is_limit_exceeded() || attempt >= options.finalize_attempts => {
                return Err(e.into())
            }
            Err(e) => {
                warn!(attempt, error = %e, "completing multipart upload failed, retrying");
                tokio::time::sleep(options.finalize_delay).await;
                attempt += 1;
            }
        }
    }
}
