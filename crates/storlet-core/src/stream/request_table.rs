//! ObjectRequestTable - コンテナハンドルの要求/応答ランデブー
//!
//! ContainerHandle が「新しい出力オブジェクトがほしい」と要求し、
//! 後から届く Descriptor コマンドがその出力ストリームを渡す、という
//! 1 対 1 の受け渡しをキーごとの oneshot チャネルで表現します。
//!
//! ```text
//! ContainerHandle                 table                    Descriptor task
//!   insert(key) ───────────────▶ {key: Sender}
//!   wait() ... (await)
//!                                 fulfill(key, stream) ◀── (fd pair 受信)
//!   ◀──────────── stream ─────── remove(key)
//! ```
//!
//! # 不変条件
//! - エントリは要求時に挿入され、ちょうど 1 回 fulfill される
//! - 待ち手が受け取るか、待ち手が drop されたら（キャンセル）エントリは消える
//!
//! ロックは `std::sync::Mutex`。`Drop` から同期的に消す必要があり、
//! ロック中に await することもないためです。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::domain::{RequestKey, StorletError};

use super::output::ObjectOutputStream;

type Slot = oneshot::Sender<ObjectOutputStream>;

#[derive(Debug, Default)]
pub struct ObjectRequestTable {
    pending: Mutex<HashMap<RequestKey, Slot>>,
}

impl ObjectRequestTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RequestKey, Slot>> {
        // 保持中に panic しても map 自体は壊れない
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a pending request. The returned guard removes the entry on drop.
    pub fn insert(self: &Arc<Self>, key: RequestKey) -> Result<PendingObjectRequest, StorletError> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.lock();
        if pending.contains_key(&key) {
            return Err(StorletError::validation(format!(
                "object request {key} is already pending"
            )));
        }
        pending.insert(key, tx);
        Ok(PendingObjectRequest {
            key,
            table: Arc::clone(self),
            receiver: rx,
        })
    }

    /// Hand `stream` to the waiter of `key`.
    pub fn fulfill(&self, key: &RequestKey, stream: ObjectOutputStream) -> Result<(), StorletError> {
        let slot = self
            .lock()
            .remove(key)
            .ok_or_else(|| StorletError::validation(format!("no pending object request {key}")))?;
        slot.send(stream).map_err(|_| {
            StorletError::validation(format!("waiter of object request {key} has gone away"))
        })
    }

    pub fn remove(&self, key: &RequestKey) -> bool {
        self.lock().remove(key).is_some()
    }

    pub fn contains(&self, key: &RequestKey) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Waiting side of one object request.
#[derive(Debug)]
pub struct PendingObjectRequest {
    key: RequestKey,
    table: Arc<ObjectRequestTable>,
    receiver: oneshot::Receiver<ObjectOutputStream>,
}

impl PendingObjectRequest {
    pub fn key(&self) -> RequestKey {
        self.key
    }

    pub async fn wait(mut self) -> Result<ObjectOutputStream, StorletError> {
        (&mut self.receiver).await.map_err(|_| {
            StorletError::user(format!("object request {} was abandoned", self.key))
        })
    }
}

impl Drop for PendingObjectRequest {
    fn drop(&mut self) {
        self.table.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::OwnedFd;
    use std::time::Duration;
    use ulid::Ulid;

    fn key() -> RequestKey {
        RequestKey::from_ulid(Ulid::new())
    }

    fn stream() -> ObjectOutputStream {
        ObjectOutputStream::new(
            OwnedFd::from(tempfile::tempfile().unwrap()),
            OwnedFd::from(tempfile::tempfile().unwrap()),
        )
    }

    #[tokio::test]
    async fn fulfill_before_wait_is_delivered() {
        let table = Arc::new(ObjectRequestTable::new());
        let k = key();
        let pending = table.insert(k).unwrap();
        assert!(table.contains(&k));

        table.fulfill(&k, stream()).unwrap();
        assert!(table.is_empty());

        let got = pending.wait().await.unwrap();
        assert!(!got.metadata_sent());
    }

    #[tokio::test]
    async fn wait_before_fulfill_is_delivered() {
        let table = Arc::new(ObjectRequestTable::new());
        let k = key();
        let pending = table.insert(k).unwrap();

        let waiter = tokio::spawn(pending.wait());
        tokio::time::sleep(Duration::from_millis(10)).await;
        table.fulfill(&k, stream()).unwrap();

        assert!(waiter.await.unwrap().is_ok());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn unknown_key_is_validation_error() {
        let table = ObjectRequestTable::new();
        let err = table.fulfill(&key(), stream()).unwrap_err();
        assert!(matches!(err, StorletError::Validation(_)));
    }

    #[test]
    fn dropped_waiter_removes_entry() {
        let table = Arc::new(ObjectRequestTable::new());
        let k = key();
        let pending = table.insert(k).unwrap();
        drop(pending);

        assert!(table.is_empty());
        assert!(table.fulfill(&k, stream()).is_err());
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let table = Arc::new(ObjectRequestTable::new());
        let k = key();
        let _pending = table.insert(k).unwrap();
        assert!(table.insert(k).is_err());
        assert_eq!(table.len(), 1);
    }
}
