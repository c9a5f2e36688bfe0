//! ObjectOutputStream - データ fd + メタデータ fd のペア
//!
//! - メタデータは `set_metadata` で 1 回だけ JSON を書き、その fd はすぐ close
//! - データは `AsyncWrite` で書く。メタデータより先に本文は書けない
//! - `close()` は冪等（2 回目以降は何もしない）
//!
//! `metadata()` はゲートウェイから渡された出力先オブジェクトのメタデータで、
//! `set_metadata` で書き出す内容とは別物です。

use std::collections::HashMap;
use std::fs::File as StdFile;
use std::io;
use std::os::fd::OwnedFd;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::domain::StorletError;

pub const METADATA_TWICE: &str = "Sending metadata twice is not allowed";
pub const BODY_BEFORE_METADATA: &str = "Body should be sent after metadata is sent";

#[derive(Debug)]
pub struct ObjectOutputStream {
    data: Option<File>,
    metadata_sink: Option<File>,
    metadata_sent: bool,
    origin: HashMap<String, String>,
}

impl ObjectOutputStream {
    pub fn new(data_fd: OwnedFd, metadata_fd: OwnedFd) -> Self {
        Self {
            data: Some(File::from_std(StdFile::from(data_fd))),
            metadata_sink: Some(File::from_std(StdFile::from(metadata_fd))),
            metadata_sent: false,
            origin: HashMap::new(),
        }
    }

    /// Attach the origin metadata the gateway sent with the descriptor.
    pub fn with_origin(mut self, origin: HashMap<String, String>) -> Self {
        self.origin = origin;
        self
    }

    /// Origin metadata of the target object.
    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.origin
    }

    /// Write the object's metadata once and close the metadata descriptor.
    pub async fn set_metadata(
        &mut self,
        metadata: &HashMap<String, String>,
    ) -> Result<(), StorletError> {
        if self.metadata_sent {
            return Err(StorletError::user(METADATA_TWICE));
        }
        let mut sink = self
            .metadata_sink
            .take()
            .ok_or_else(|| StorletError::user("metadata sink is already closed"))?;
        self.metadata_sent = true;

        let body = serde_json::to_vec(metadata)?;
        sink.write_all(&body).await?;
        sink.flush().await?;
        Ok(())
    }

    pub fn metadata_sent(&self) -> bool {
        self.metadata_sent
    }

    pub fn is_closed(&self) -> bool {
        self.data.is_none() && self.metadata_sink.is_none()
    }

    /// Flush and close both descriptors.
    pub async fn close(&mut self) -> io::Result<()> {
        self.metadata_sink.take();
        if let Some(mut data) = self.data.take() {
            data.flush().await?;
        }
        Ok(())
    }
}

fn closed() -> io::Error {
    io::Error::other("output stream is closed")
}

impl AsyncWrite for ObjectOutputStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if !self.metadata_sent {
            return Poll::Ready(Err(io::Error::other(BODY_BEFORE_METADATA)));
        }
        match self.data.as_mut() {
            Some(data) => Pin::new(data).poll_write(cx, buf),
            None => Poll::Ready(Err(closed())),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.data.as_mut() {
            Some(data) => Pin::new(data).poll_flush(cx),
            None => Poll::Ready(Err(closed())),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.data.as_mut() {
            Some(data) => Pin::new(data).poll_shutdown(cx),
            None => Poll::Ready(Ok(())),
        }
    }
}
