//! 一度書いたら閉じる応答用 fd
//!
//! - `ControlChannel`: service-out。`{"status", "message"}` を書いて close
//! - `TaskIdSink`: output-task-id。タスク ID の生バイトを書いて close
//!
//! どちらも `self` を消費するので、2 回書くことは型で防がれます。
//! close（= drop）が呼び出し側への「応答完了」の合図です。

use std::fs::File as StdFile;
use std::os::fd::OwnedFd;

use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::codec;
use crate::domain::{CommandResponse, StorletError, TaskId};

async fn write_once(fd: OwnedFd, bytes: &[u8]) -> Result<(), StorletError> {
    let mut file = File::from_std(StdFile::from(fd));
    file.write_all(bytes).await?;
    file.flush().await?;
    Ok(())
}

#[derive(Debug)]
pub struct ControlChannel {
    fd: OwnedFd,
}

impl ControlChannel {
    pub fn new(fd: OwnedFd) -> Self {
        Self { fd }
    }

    pub async fn respond(self, response: &CommandResponse) -> Result<(), StorletError> {
        write_once(self.fd, &codec::encode_response(response)?).await
    }
}

#[derive(Debug)]
pub struct TaskIdSink {
    fd: OwnedFd,
}

impl TaskIdSink {
    pub fn new(fd: OwnedFd) -> Self {
        Self { fd }
    }

    pub async fn report(self, task_id: &TaskId) -> Result<(), StorletError> {
        write_once(self.fd, task_id.to_string().as_bytes()).await
    }
}
