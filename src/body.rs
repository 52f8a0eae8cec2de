use bytes::{Bytes, BytesMut};
use futures::{Stream, TryStreamExt};

/// Buffers a streamed body so it can be planned and sliced into parts.
pub async fn collect_body<B, E>(body: B) -> Result<Bytes, E>
where
    B: Stream<Item = Result<Bytes, E>>,
{
    let buf = body
        .try_fold(BytesMut::new(), |mut buf, chunk| async move {
            buf.extend_from_slice(&chunk);
            Ok(buf)
        })
        .await?;
    Ok(buf.freeze())
}
