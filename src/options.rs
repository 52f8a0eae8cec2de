use crate::error::{Error, Result};
use crate::DEFAULT_CHUNK_SIZE;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Receives the completed percentage, rounded to two decimals.
pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

/// Settings for a single upload. Read-only once the upload starts.
#[derive(Clone)]
pub struct UploadOptions {
    pub chunk_size: usize,
    pub max_concurrency: NonZeroUsize,
    /// Attempts per part, the first one included.
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Attempts of the final completion call.
    pub finalize_attempts: u32,
    pub finalize_delay: Duration,
    pub on_progress: Option<ProgressCallback>,
    pub cancel: Option<CancellationToken>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_concurrency: NonZeroUsize::new(3).unwrap_or(NonZeroUsize::MIN),
            max_retries: 5,
            retry_delay: Duration::from_secs(2),
            finalize_attempts: 3,
            finalize_delay: Duration::from_secs(1),
            on_progress: None,
            cancel: None,
        }
    }
}

impl UploadOptions {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: NonZeroUsize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_finalize_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.finalize_attempts = attempts;
        self.finalize_delay = delay;
        self
    }

    pub fn with_progress<F>(mut self, on_progress: F) -> Self
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(on_progress));
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Configuration(
                "chunk size must be greater than zero".to_owned(),
            ));
        }
        if self.max_retries == 0 {
            return Err(Error::Configuration(
                "at least one attempt per part is required".to_owned(),
            ));
        }
        if self.finalize_attempts == 0 {
            return Err(Error::Configuration(
                "at least one completion attempt is required".to_owned(),
            ));
        }
        Ok(())
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map_or(false, CancellationToken::is_cancelled)
    }
}

impl fmt::Debug for UploadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadOptions")
            .field("chunk_size", &self.chunk_size)
            .field("max_concurrency", &self.max_concurrency)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("finalize_attempts", &self.finalize_attempts)
            .field("finalize_delay", &self.finalize_delay)
            .field("on_progress", &self.on_progress.is_some())
            .field("cancel", &self.cancel)
            .finish()
    }
}
