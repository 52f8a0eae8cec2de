use crate::error::StorageError;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Dashboard widget field a file is uploaded for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Destination {
    pub dashboard: String,
    pub widget: String,
    pub field_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadMetadata {
    pub content_type: Option<String>,
    pub is_public: Option<bool>,
    pub destination: Option<Destination>,
}

/// An open multipart upload on the remote side.
#[derive(Clone, Debug)]
pub struct UploadHandle {
    pub upload_id: String,
    pub filename: String,
    pub metadata: UploadMetadata,
}

/// Acknowledgement of one uploaded part.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartReceipt {
    #[serde(rename = "PartNumber")]
    pub part_number: u32,
    #[serde(rename = "ETag")]
    pub e_tag: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub file: String,
}

#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// Opens a multipart upload and returns its id.
    async fn start_multipart_upload(
        &self,
        filename: &str,
        metadata: &UploadMetadata,
    ) -> Result<String, StorageError>;

    /// Uploads one part and returns its integrity tag.
    async fn upload_part(
        &self,
        handle: &UploadHandle,
        part_number: u32,
        body: Bytes,
    ) -> Result<String, StorageError>;

    /// `parts` is in ascending part number order.
    async fn complete_multipart_upload(
        &self,
        handle: &UploadHandle,
        parts: &[PartReceipt],
    ) -> Result<UploadedFile, StorageError>;
}
