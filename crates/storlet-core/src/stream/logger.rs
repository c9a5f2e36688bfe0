//! StorletLogger - storlet 向けのテキストログ fd
//!
//! `tracing` とは別物で、呼び出し元に返す追記専用のテキストです。
//! - `emit`: 1 回で 1 行（末尾に改行）
//! - `debug` / `info` / `warn` / `error`: `<storlet> <LEVEL>: <msg>` の形の 1 行
//!
//! 1 行ごとに flush します。実行ユニットが猶予期間切れで強制停止され
//! `close()` まで届かなくても、書き終えた行は fd に残ります。
//!
//! ログ書き込みの失敗で storlet を落とさないよう、`emit` はエラーを返さず
//! `tracing::warn!` に記録するだけにしています。

use std::fs::File as StdFile;
use std::os::fd::OwnedFd;

use tokio::fs::File;
use tokio::io::AsyncWriteExt;

#[derive(Debug)]
pub struct StorletLogger {
    sink: Option<File>,
    name: String,
}

impl StorletLogger {
    pub fn new(fd: OwnedFd) -> Self {
        Self {
            sink: Some(File::from_std(StdFile::from(fd))),
            name: String::new(),
        }
    }

    /// Logger for requests that carry no logger descriptor.
    pub fn discard() -> Self {
        Self {
            sink: None,
            name: String::new(),
        }
    }

    /// Storlet name used as the prefix of leveled lines.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn emit(&mut self, message: &str) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        let mut line = String::with_capacity(message.len() + 1);
        line.push_str(message);
        line.push('\n');
        let written = match sink.write_all(line.as_bytes()).await {
            Ok(()) => sink.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            tracing::warn!(error = %e, "failed to write storlet log line");
        }
    }

    pub async fn debug(&mut self, message: &str) {
        self.leveled("DEBUG", message).await;
    }

    pub async fn info(&mut self, message: &str) {
        self.leveled("INFO", message).await;
    }

    pub async fn warn(&mut self, message: &str) {
        self.leveled("WARN", message).await;
    }

    pub async fn error(&mut self, message: &str) {
        self.leveled("ERROR", message).await;
    }

    async fn leveled(&mut self, level: &str, message: &str) {
        let line = format!("{} {level}: {message}", self.name);
        self.emit(&line).await;
    }

    /// Flush and close the descriptor. Idempotent.
    pub async fn close(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.flush().await {
                tracing::warn!(error = %e, "failed to flush storlet log");
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sink.is_none()
    }
}
