use crate::error::{Error, Result};
use crate::options::UploadOptions;
use crate::plan::ChunkDescriptor;
use crate::storage::{PartReceipt, RemoteStorage, UploadHandle};
use bytes::Bytes;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl From<&UploadOptions> for RetryPolicy {
    fn from(options: &UploadOptions) -> Self {
        Self {
            max_attempts: options.max_retries,
            delay: options.retry_delay,
        }
    }
}

/// Uploads `body[descriptor.range()]` as one part, retrying transient
/// failures. Once `halt` fires no further attempt is started and the part
/// reports [`Error::Cancelled`]; a call already in flight is left to finish.
pub(crate) async fn upload_part<S>(
    storage: &S,
    handle: &UploadHandle,
    descriptor: ChunkDescriptor,
    body: &Bytes,
    policy: RetryPolicy,
    halt: &CancellationToken,
) -> Result<PartReceipt>
where
    S: RemoteStorage + ?Sized,
{
    let part_number = descriptor.part_number;
    let body = body.slice(descriptor.range());

    let mut attempt = 1;
    loop {
        debug!(part_number, attempt, len = body.len(), "uploading part");
        let e = match storage.upload_part(handle, part_number, body.clone()).await {
            Ok(e_tag) => return Ok(PartReceipt { part_number, e_tag }),
            Err(e) => e,
        };

        if halt.is_cancelled() {
            debug!(part_number, attempt, error = %e, "part halted after failed attempt");
            return Err(Error::Cancelled);
        }
        if e.is_limit_exceeded() || attempt >= policy.max_attempts {
            return Err(Error::PartUpload {
                part_number,
                source: e,
            });
        }
        warn!(part_number, attempt, error = %e, "part upload failed, retrying");

        tokio::select! {
            _ = tokio::time::sleep(policy.delay) => {}
            _ = halt.cancelled() => return Err(Error::Cancelled),
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::{upload_part, RetryPolicy};
    use crate::error::{Error, StorageError, LIMIT_EXCEEDED_PREFIX};
    use crate::plan::ChunkDescriptor;
    use crate::storage::{PartReceipt, RemoteStorage, UploadHandle, UploadMetadata, UploadedFile};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    /// Replays a fixed list of outcomes, one per attempt.
    struct Scripted {
        outcomes: Mutex<Vec<Result<String, StorageError>>>,
        bodies: Mutex<Vec<Bytes>>,
    }

    impl Scripted {
        fn new(mut outcomes: Vec<Result<String, StorageError>>) -> Self {
            outcomes.reverse();
            Self {
                outcomes: Mutex::new(outcomes),
                bodies: Mutex::new(Vec::new()),
            }
        }

        fn attempts(&self) -> usize {
            self.bodies.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl RemoteStorage for Scripted {
        async fn start_multipart_upload(
            &self,
            _: &str,
            _: &UploadMetadata,
        ) -> Result<String, StorageError> {
            unreachable!()
        }

        async fn upload_part(
            &self,
            _: &UploadHandle,
            _: u32,
            body: Bytes,
        ) -> Result<String, StorageError> {
            self.bodies.lock().unwrap().push(body);
            self.outcomes.lock().unwrap().pop().unwrap()
        }

        async fn complete_multipart_upload(
            &self,
            _: &UploadHandle,
            _: &[PartReceipt],
        ) -> Result<UploadedFile, StorageError> {
            unreachable!()
        }
    }

    fn handle() -> UploadHandle {
        UploadHandle {
            upload_id: "upload".to_owned(),
            filename: "file.bin".to_owned(),
            metadata: UploadMetadata::default(),
        }
    }

    fn transient() -> Result<String, StorageError> {
        Err(StorageError::Api {
            status: 503,
            message: "Service Unavailable".to_owned(),
        })
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            delay: Duration::from_secs(2),
        }
    }

    const DESCRIPTOR: ChunkDescriptor = ChunkDescriptor {
        offset: 2,
        length: 3,
        part_number: 4,
    };

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_success() {
        let storage = Scripted::new(vec![transient(), transient(), Ok("tag".to_owned())]);
        let body = Bytes::from_static(b"0123456789");

        let receipt = upload_part(
            &storage,
            &handle(),
            DESCRIPTOR,
            &body,
            policy(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(
            receipt,
            PartReceipt {
                part_number: 4,
                e_tag: "tag".to_owned(),
            }
        );
        assert_eq!(storage.attempts(), 3);
        assert!(storage
            .bodies
            .lock()
            .unwrap()
            .iter()
            .all(|b| b == &Bytes::from_static(b"234")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted() {
        let storage = Scripted::new((0..5).map(|_| transient()).collect());
        let e = upload_part(
            &storage,
            &handle(),
            DESCRIPTOR,
            &Bytes::from_static(b"0123456789"),
            policy(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert_eq!(storage.attempts(), 5);
        assert!(matches!(
            e,
            Error::PartUpload {
                part_number: 4,
                source: StorageError::Api { status: 503, .. },
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_exceeded() {
        let storage = Scripted::new(vec![Err(StorageError::Api {
            status: 400,
            message: format!("{} of 1000 files", LIMIT_EXCEEDED_PREFIX),
        })]);
        let e = upload_part(
            &storage,
            &handle(),
            DESCRIPTOR,
            &Bytes::from_static(b"0123456789"),
            policy(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert_eq!(storage.attempts(), 1);
        assert_eq!(e.part_number(), Some(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_halted() {
        let storage = Scripted::new(vec![transient(), Ok("tag".to_owned())]);
        let halt = CancellationToken::new();
        halt.cancel();

        let e = upload_part(
            &storage,
            &handle(),
            DESCRIPTOR,
            &Bytes::from_static(b"0123456789"),
            policy(),
            &halt,
        )
        .await
        .unwrap_err();

        // the first attempt still runs, no retry follows
        assert_eq!(storage.attempts(), 1);
        assert!(e.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_halted_during_backoff() {
        let storage = Scripted::new(vec![transient(), Ok("tag".to_owned())]);
        let halt = CancellationToken::new();

        let body = Bytes::from_static(b"0123456789");
        let handle = handle();
        let upload = upload_part(&storage, &handle, DESCRIPTOR, &body, policy(), &halt);
        let fire = async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            halt.cancel();
        };
        let (result, ()) = tokio::join!(upload, fire);

        // woken from the 2s backoff before the second attempt
        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(storage.attempts(), 1);
    }
}
