//! [`RemoteStorage`] over the REST files API.

use crate::error::StorageError;
use crate::storage::{
    Destination, PartReceipt, RemoteStorage, UploadHandle, UploadMetadata, UploadedFile,
};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Clone, Debug)]
pub struct HttpConfig {
    /// Base URL of the API, without a trailing slash
    pub endpoint: String,
    /// Sent as the `token` header of every request
    pub token: String,
    pub timeout: Duration,
    pub user_agent: String,
}

impl HttpConfig {
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: token.into(),
            timeout: Duration::from_secs(60),
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

pub struct HttpStorage {
    client: reqwest::Client,
    config: HttpConfig,
}

impl HttpStorage {
    pub fn new(config: HttpConfig) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    fn url(&self, destination: Option<&Destination>) -> String {
        let endpoint = self.config.endpoint.trim_end_matches('/');
        match destination {
            Some(d) => format!("{}/data/files/{}/{}", endpoint, d.dashboard, d.widget),
            None => format!("{}/files", endpoint),
        }
    }

    fn post(&self, destination: Option<&Destination>) -> reqwest::RequestBuilder {
        self.client
            .post(self.url(destination))
            .header("token", &self.config.token)
    }

    async fn post_json<B, T>(&self, destination: Option<&Destination>, body: &B) -> Result<T, StorageError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.post(destination).json(body).send().await?;
        read_result(response).await
    }
}

/// `{"status": bool, "result": T, "message": String}`
#[derive(Deserialize)]
struct Envelope<T> {
    status: Option<bool>,
    result: Option<T>,
    message: Option<String>,
}

async fn read_result<T>(response: reqwest::Response) -> Result<T, StorageError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    let text = response.text().await?;

    let envelope = serde_json::from_str::<Envelope<T>>(&text);
    if !status.is_success() {
        let message = envelope
            .ok()
            .and_then(|envelope| envelope.message)
            .unwrap_or(text);
        return Err(StorageError::Api {
            status: status.as_u16(),
            message,
        });
    }

    let envelope = envelope.map_err(|e| StorageError::InvalidResponse(e.to_string()))?;
    if envelope.status == Some(false) {
        return Err(StorageError::Api {
            status: status.as_u16(),
            message: envelope.message.unwrap_or_default(),
        });
    }
    envelope
        .result
        .ok_or_else(|| StorageError::InvalidResponse("missing result".to_owned()))
}

#[derive(Serialize)]
struct StartRequest<'a> {
    multipart_action: &'static str,
    filename: &'a str,
    public: Option<bool>,
    #[serde(rename = "contentType")]
    content_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    field_id: Option<&'a str>,
}

#[derive(Serialize)]
struct CompleteRequest<'a> {
    multipart_action: &'static str,
    upload_id: &'a str,
    filename: &'a str,
    parts: &'a [PartReceipt],
    #[serde(skip_serializing_if = "Option::is_none")]
    field_id: Option<&'a str>,
}

#[derive(Deserialize)]
struct PartResult {
    #[serde(rename = "ETag")]
    e_tag: Option<String>,
}

fn field_id(metadata: &UploadMetadata) -> Option<&str> {
    metadata.destination.as_ref().map(|d| d.field_id.as_str())
}

#[async_trait]
impl RemoteStorage for HttpStorage {
    async fn start_multipart_upload(
        &self,
        filename: &str,
        metadata: &UploadMetadata,
    ) -> Result<String, StorageError> {
        let request = StartRequest {
            multipart_action: "start",
            filename,
            public: metadata.is_public,
            content_type: metadata.content_type.as_deref(),
            field_id: field_id(metadata),
        };
        self.post_json(metadata.destination.as_ref(), &request).await
    }

    async fn upload_part(
        &self,
        handle: &UploadHandle,
        part_number: u32,
        body: Bytes,
    ) -> Result<String, StorageError> {
        let len = body.len() as u64;
        let file = Part::stream_with_length(body, len)
            .file_name(handle.filename.clone())
            .mime_str("application/octet-stream")?;
        let mut form = Form::new()
            .text("filename", handle.filename.clone())
            .text("upload_id", handle.upload_id.clone())
            .text("part", part_number.to_string())
            .text("multipart_action", "upload")
            .part("file", file);
        if let Some(field_id) = field_id(&handle.metadata) {
            form = form.text("field_id", field_id.to_owned());
        }

        debug!(upload_id = %handle.upload_id, part_number, len, "sending part");
        let response = self
            .post(handle.metadata.destination.as_ref())
            .multipart(form)
            .send()
            .await?;
        read_result::<PartResult>(response)
            .await?
            .e_tag
            .ok_or_else(|| StorageError::InvalidResponse("missing ETag".to_owned()))
    }

    async fn complete_multipart_upload(
        &self,
        handle: &UploadHandle,
        parts: &[PartReceipt],
    ) -> Result<UploadedFile, StorageError> {
        let request = CompleteRequest {
            multipart_action: "end",
            upload_id: &handle.upload_id,
            filename: &handle.filename,
            parts,
            field_id: field_id(&handle.metadata),
        };
        self.post_json(handle.metadata.destination.as_ref(), &request)
            .await
    }
}
