use courier_core::Result;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// Serialized access to the outbound stream.
///
/// Each message is written as one line and flushed while the lock is held,
/// so concurrent handlers never interleave bytes.
pub struct OutboundWriter {
    inner: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
}

impl OutboundWriter {
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            inner: Mutex::new(Box::new(writer)),
        }
    }

    pub async fn send<T: Serialize>(&self, message: &T) -> Result<()> {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');

        let mut writer = self.inner.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }
}
