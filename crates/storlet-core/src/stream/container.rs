//! ContainerHandle - 実行中に出力オブジェクトを追加で要求するハンドル
//!
//! `object_output_stream(name)` の流れ:
//! 1. 新しい要求キーを払い出してテーブルに登録
//! 2. `{"object_name", "container_name", "key"}` を fd に書く（ゲートウェイが読む）
//! 3. Descriptor コマンドで fd ペアが届くまで待つ
//!
//! 待っている future を drop すれば（キャンセル）テーブルのエントリも消えます。

use std::fs::File as StdFile;
use std::os::fd::OwnedFd;
use std::sync::Arc;

use serde::Serialize;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::domain::StorletError;
use crate::ports::IdGenerator;

use super::output::ObjectOutputStream;
use super::request_table::ObjectRequestTable;

/// Origin metadata key naming the container a handle writes into.
pub const CONTAINER_NAME_KEY: &str = "storlet_container_name";

#[derive(Serialize)]
struct ObjectRequestMessage<'a> {
    object_name: &'a str,
    container_name: &'a str,
    key: String,
}

pub struct ContainerHandle {
    sink: Option<File>,
    container_name: String,
    table: Arc<ObjectRequestTable>,
    ids: Arc<dyn IdGenerator>,
}

impl std::fmt::Debug for ContainerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerHandle")
            .field("container_name", &self.container_name)
            .field("closed", &self.sink.is_none())
            .finish()
    }
}

impl ContainerHandle {
    pub fn new(
        fd: OwnedFd,
        container_name: impl Into<String>,
        table: Arc<ObjectRequestTable>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            sink: Some(File::from_std(StdFile::from(fd))),
            container_name: container_name.into(),
            table,
            ids,
        }
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    /// Request a new output object named `object_name` in this container.
    pub async fn object_output_stream(
        &mut self,
        object_name: &str,
    ) -> Result<ObjectOutputStream, StorletError> {
        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| StorletError::user("container handle is closed"))?;

        let pending = self.table.insert(self.ids.generate_request_key())?;
        let message = serde_json::to_vec(&ObjectRequestMessage {
            object_name,
            container_name: &self.container_name,
            key: pending.key().to_string(),
        })?;
        sink.write_all(&message).await?;
        sink.flush().await?;

        tracing::debug!(key = %pending.key(), object_name, "requested output object");
        pending.wait().await
    }

    /// Close the request descriptor. Idempotent.
    pub async fn close(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.flush().await {
                tracing::warn!(error = %e, "failed to flush container handle");
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sink.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RequestKey;
    use crate::ports::{SystemClock, UlidGenerator};
    use std::io::{Read, Seek, SeekFrom};
    use std::time::Duration;

    #[tokio::test]
    async fn request_is_written_and_fulfilled() {
        let table = Arc::new(ObjectRequestTable::new());
        let file = tempfile::tempfile().unwrap();
        let mut handle = ContainerHandle::new(
            OwnedFd::from(file.try_clone().unwrap()),
            "results",
            Arc::clone(&table),
            Arc::new(UlidGenerator::new(SystemClock)),
        );

        let requester = tokio::spawn(async move {
            let stream = handle.object_output_stream("copy").await;
            handle.close().await;
            stream
        });

        // 要求が fd に書かれるまで待つ
        let mut file = file;
        let mut written = String::new();
        while written.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
            file.seek(SeekFrom::Start(0)).unwrap();
            file.read_to_string(&mut written).unwrap();
        }
        assert_eq!(table.len(), 1);
        let message: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(message["object_name"], "copy");
        assert_eq!(message["container_name"], "results");
        let key: RequestKey = message["key"].as_str().unwrap().parse().unwrap();

        let delivered = ObjectOutputStream::new(
            OwnedFd::from(tempfile::tempfile().unwrap()),
            OwnedFd::from(tempfile::tempfile().unwrap()),
        );
        table.fulfill(&key, delivered).unwrap();

        assert!(requester.await.unwrap().is_ok());
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn cancelled_request_leaves_no_entry() {
        let table = Arc::new(ObjectRequestTable::new());
        let mut handle = ContainerHandle::new(
            OwnedFd::from(tempfile::tempfile().unwrap()),
            "results",
            Arc::clone(&table),
            Arc::new(UlidGenerator::new(SystemClock)),
        );

        let outcome = tokio::time::timeout(
            Duration::from_millis(20),
            handle.object_output_stream("never"),
        )
        .await;

        assert!(outcome.is_err());
        assert!(table.is_empty());
    }
}
