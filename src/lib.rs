//! Chunked multipart uploads with bounded parallelism.
//!
//! A payload is split into parts by [`plan`], the parts are sent through a
//! [`RemoteStorage`] by at most `max_concurrency` workers, each retrying its
//! part on transient failures, and the ordered manifest of part receipts
//! completes the upload.
//!
//! ```rust,ignore
//! use chunked_mpu::{multipart_upload, HttpConfig, HttpStorage, MultipartUploadRequest, UploadOptions};
//! use std::sync::Arc;
//!
//! let storage = Arc::new(HttpStorage::new(HttpConfig::new(
//!     "https://api.example.com",
//!     "token",
//! ))?);
//! let file = multipart_upload(
//!     storage,
//!     MultipartUploadRequest::new(data, "/uploads/report.pdf"),
//!     &UploadOptions::default().with_progress(|p| println!("{}%", p)),
//! )
//! .await?;
//! println!("{}", file.file);
//! ```

mod assemble;
mod body;
mod dispatch;
mod error;
mod http;
mod options;
mod part;
mod plan;
mod s3;
mod storage;
mod upload;

pub use assemble::assemble;
pub use body::collect_body;
pub use error::{Error, Result, StorageError, LIMIT_EXCEEDED_PREFIX};
pub use http::{HttpConfig, HttpStorage};
pub use options::{ProgressCallback, UploadOptions};
pub use part::RetryPolicy;
pub use plan::{plan, ChunkDescriptor};
pub use s3::S3Storage;
pub use storage::{
    Destination, PartReceipt, RemoteStorage, UploadHandle, UploadMetadata, UploadedFile,
};
pub use tokio_util::sync::CancellationToken;
pub use upload::{multipart_upload, MultipartUploadRequest};

/// Smallest size of every part but the last.
pub const MIN_PART_SIZE: usize = 5 << 20;

pub const DEFAULT_CHUNK_SIZE: usize = 7 << 20;
