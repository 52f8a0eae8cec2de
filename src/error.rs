use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Message prefix the files API uses when an account quota is exhausted.
pub const LIMIT_EXCEEDED_PREFIX: &str = "You have exceeded the maximum limit";

/// Failure of a single call against the remote storage.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("storage backend error: {0}")]
    Backend(#[source] BoxError),
}

impl StorageError {
    /// Quota failures are final: retrying cannot change the outcome.
    pub fn is_limit_exceeded(&self) -> bool {
        matches!(self, Self::Api { message, .. } if message.starts_with(LIMIT_EXCEEDED_PREFIX))
    }
}

impl<E> From<rusoto_core::RusotoError<E>> for StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(e: rusoto_core::RusotoError<E>) -> Self {
        Self::Backend(Box::new(e))
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// Rejected before any network activity.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("could not upload part number {part_number}: {source}")]
    PartUpload {
        part_number: u32,
        #[source]
        source: StorageError,
    },

    #[error("incomplete upload: {}", describe_parts(.missing, .duplicate))]
    IncompleteUpload { missing: Vec<u32>, duplicate: Vec<u32> },

    #[error("upload cancelled")]
    Cancelled,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("upload worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl Error {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The part a failure is attributed to, if any.
    pub fn part_number(&self) -> Option<u32> {
        match self {
            Self::PartUpload { part_number, .. } => Some(*part_number),
            _ => None,
        }
    }
}

fn describe_parts(missing: &[u32], duplicate: &[u32]) -> String {
    let mut out = Vec::new();
    if !missing.is_empty() {
        out.push(format!("missing parts {:?}", missing));
    }
    if !duplicate.is_empty() {
        out.push(format!("duplicate parts {:?}", duplicate));
    }
    out.join(", ")
}
