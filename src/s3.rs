use crate::error::StorageError;
use crate::storage::{PartReceipt, RemoteStorage, UploadHandle, UploadMetadata, UploadedFile};
use async_trait::async_trait;
use bytes::Bytes;
use md5::{Digest, Md5};
use rusoto_core::ByteStream;
use rusoto_s3::{
    CompleteMultipartUploadRequest, CompletedMultipartUpload, CompletedPart,
    CreateMultipartUploadRequest, UploadPartRequest, S3,
};

/// [`RemoteStorage`] over an S3-compatible bucket. Filenames are used as
/// object keys.
pub struct S3Storage<C> {
    client: C,
    bucket: String,
}

impl<C> S3Storage<C>
where
    C: S3,
{
    pub fn new(client: C, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }
}

fn into_byte_stream(body: Bytes) -> ByteStream {
    ByteStream::new(futures::stream::iter(Some(Ok(body))))
}

fn content_md5(body: &[u8]) -> String {
    base64::encode(Md5::digest(body))
}

#[async_trait]
impl<C> RemoteStorage for S3Storage<C>
where
    C: S3 + Send + Sync,
{
    async fn start_multipart_upload(
        &self,
        filename: &str,
        metadata: &UploadMetadata,
    ) -> Result<String, StorageError> {
        self.client
            .create_multipart_upload(CreateMultipartUploadRequest {
                acl: metadata
                    .is_public
                    .filter(|is_public| *is_public)
                    .map(|_| "public-read".to_owned()),
                bucket: self.bucket.clone(),
                content_type: metadata.content_type.clone(),
                key: filename.to_owned(),
                ..CreateMultipartUploadRequest::default()
            })
            .await?
            .upload_id
            .ok_or_else(|| StorageError::InvalidResponse("missing UploadId".to_owned()))
    }

    async fn upload_part(
        &self,
        handle: &UploadHandle,
        part_number: u32,
        body: Bytes,
    ) -> Result<String, StorageError> {
        let content_md5 = content_md5(&body);
        let content_length = body.len() as i64;
        self.client
            .upload_part(UploadPartRequest {
                body: Some(into_byte_stream(body)),
                bucket: self.bucket.clone(),
                content_length: Some(content_length),
                content_md5: Some(content_md5),
                key: handle.filename.clone(),
                part_number: part_number as i64,
                upload_id: handle.upload_id.clone(),
                ..UploadPartRequest::default()
            })
            .await?
            .e_tag
            .ok_or_else(|| StorageError::InvalidResponse("missing ETag".to_owned()))
    }

    async fn complete_multipart_upload(
        &self,
        handle: &UploadHandle,
        parts: &[PartReceipt],
    ) -> Result<UploadedFile, StorageError> {
        let output = self
            .client
            .complete_multipart_upload(CompleteMultipartUploadRequest {
                bucket: self.bucket.clone(),
                key: handle.filename.clone(),
                multipart_upload: Some(CompletedMultipartUpload {
                    parts: Some(
                        parts
                            .iter()
                            .map(|part| CompletedPart {
                                e_tag: Some(part.e_tag.clone()),
                                part_number: Some(part.part_number as i64),
                            })
                            .collect(),
                    ),
                }),
                upload_id: handle.upload_id.clone(),
                ..CompleteMultipartUploadRequest::default()
            })
            .await?;
        Ok(UploadedFile {
            file: output
                .location
                .unwrap_or_else(|| format!("s3://{}/{}", self.bucket, handle.filename)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{content_md5, into_byte_stream};
    use bytes::Bytes;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_content_md5() {
        assert_eq!(content_md5(b""), "1B2M2Y8AsgTpgAmY7PhCfg==");
        assert_eq!(
            content_md5(b"The quick brown fox jumps over the lazy dog"),
            "nhB9nTcrtoJr2B01QqQZ1g=="
        );
    }

    #[tokio::test]
    async fn test_into_byte_stream() {
        let mut read = Vec::new();
        into_byte_stream(Bytes::from_static(&[0, 1, 2, 3, 4]))
            .into_async_read()
            .read_to_end(&mut read)
            .await
            .unwrap();
        assert_eq!(read, vec![0, 1, 2, 3, 4]);
    }
}
