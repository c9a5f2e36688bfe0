//! InputStream - 入力オブジェクト（全体 or バイト範囲）
//!
//! `transport.start` / `transport.end` があれば `[start, end)` だけを読ませます。
//! - 構築時に `start` まで seek する（読み込みはしない）
//! - `end - start` バイト渡したら、下の fd に続きがあっても EOF
//!
//! # 学習ポイント
//! - `tokio::io::Take` で上限付き読み込みを表現
//! - `Option<...>` を take() して close を冪等にする

use std::collections::HashMap;
use std::fs::File as StdFile;
use std::io::{self, Seek, SeekFrom};
use std::os::fd::OwnedFd;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf, Take};

use crate::domain::StorletError;

#[derive(Debug)]
pub struct InputStream {
    reader: Option<Take<File>>,
    metadata: HashMap<String, String>,
    range: Option<(u64, u64)>,
}

impl InputStream {
    /// Stream over the whole descriptor.
    pub fn new(fd: OwnedFd, metadata: HashMap<String, String>) -> Self {
        let file = File::from_std(StdFile::from(fd));
        Self {
            reader: Some(file.take(u64::MAX)),
            metadata,
            range: None,
        }
    }

    /// Stream exposing only bytes `[start, end)` of the descriptor.
    pub fn ranged(
        fd: OwnedFd,
        metadata: HashMap<String, String>,
        start: u64,
        end: u64,
    ) -> Result<Self, StorletError> {
        if start > end {
            return Err(StorletError::validation(format!(
                "range start={start} is past end={end}"
            )));
        }
        let mut file = StdFile::from(fd);
        file.seek(SeekFrom::Start(start))?;
        Ok(Self {
            reader: Some(File::from_std(file).take(end - start)),
            metadata,
            range: Some((start, end)),
        })
    }

    /// Origin metadata of the object.
    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    pub fn range(&self) -> Option<(u64, u64)> {
        self.range
    }

    pub async fn read_to_end_bytes(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.read_to_end(&mut buf).await?;
        Ok(buf)
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }

    /// Close the descriptor. Closing twice is a no-op.
    pub fn close(&mut self) {
        self.reader.take();
    }
}

impl AsyncRead for InputStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.reader.as_mut() {
            Some(reader) => Pin::new(reader).poll_read(cx, buf),
            None => Poll::Ready(Err(io::Error::other("input stream is closed"))),
        }
    }
}
