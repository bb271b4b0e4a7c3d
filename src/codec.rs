use log::warn;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::{self, JoinError};

const BUFFER_SIZE: usize = 1024 * 8;
const CHANNEL_BUFFER: usize = 16;

/// A trait for documents that are decoded incrementally, one chunk at a time.
pub trait Decoder: Default {
    type Output;

    /// Consumes the next chunk of input.
    fn feed(&mut self, chunk: &[u8]);

    /// Produces the decoded document once the input is exhausted.
    fn finish(self) -> Self::Output;
}

/// Decodes a document from an async stream.
///
/// The decoder lives on a blocking thread and receives chunks as they are
/// read, so it does not need to be `Send`. A read error is treated as the
/// end of the document: whatever was decoded up to that point is returned.
pub async fn decode<D, S>(stream: &mut S) -> Result<D::Output, JoinError>
where
    D: Decoder + 'static,
    D::Output: Send + 'static,
    S: AsyncRead + Unpin,
{
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(CHANNEL_BUFFER);
    let decoding = task::spawn_blocking(move || {
        let mut decoder = D::default();
        while let Some(chunk) = rx.blocking_recv() {
            decoder.feed(&chunk);
        }
        decoder.finish()
    });

    let mut buf = [0; BUFFER_SIZE];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(read) => {
                if tx.send(buf[0..read].to_vec()).await.is_err() {
                    break;
                }
            }
            Err(err) => {
                warn!("stopped reading document: {}", err);
                break;
            }
        }
    }
    drop(tx);
    decoding.await
}
