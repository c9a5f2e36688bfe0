//! ExecutionManager - 実行中タスクのレジストリとワーカープール
//!
//! # 役割
//! - `submit`: ID を払い出してレジストリに登録し、ユニットをプールに投入して即座に返す
//! - `cancel_task`: ID で探してキャンセル信号を送り、レジストリから外す
//! - `cleanup_task`: 正常終了したユニットの ID を外す
//! - `terminate`: 新規受付を止め、猶予期間だけ待ってから残りを強制停止
//!
//! # 学習ポイント
//! - プールは `Semaphore`（同時実行数の上限）+ `JoinSet`（所有とまとめての停止）
//! - キャンセルはタスクごとの `watch` チャネル。ユニット側は `select!` で
//!   次の await ポイントで気づく（協調的・ベストエフォート）
//! - 登録は spawn より前。だから返した ID に対する Cancel が
//!   「未登録」と競合することはない
//! - 後始末は Drop ガードで行うので、ユーザーロジックが panic しても
//!   レジストリに古いエントリが残らない
//!
//! cancel と完了が同時に起きた場合はどちらが勝ってもよく、
//! どちらでもエントリは 1 回だけ消えます。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;

use crate::domain::{StorletError, TaskId};
use crate::ports::IdGenerator;

/// Grace period `terminate` waits for in-flight units.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(3);

/// A runnable body handed to the pool.
///
/// Implementations must finish their own teardown (closing streams) even
/// when `cancel` fires.
#[async_trait]
pub trait ExecutionUnit: Send + 'static {
    async fn run(self: Box<Self>, cancel: CancelSignal);
}

/// Receiving side of a per-task cancellation request.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Wrap a receiver whose `true` means "cancel".
    pub fn from_receiver(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested.
    ///
    /// If the sender goes away without cancelling (normal cleanup), this
    /// never resolves.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

type Entries = HashMap<TaskId, watch::Sender<bool>>;

#[derive(Debug, Default)]
struct TaskRegistry {
    entries: Mutex<Entries>,
}

impl TaskRegistry {
    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, id: &TaskId) -> Option<watch::Sender<bool>> {
        self.lock().remove(id)
    }
}

/// Removes the registry entry when the spawned unit finishes or is aborted.
struct CleanupGuard {
    registry: Arc<TaskRegistry>,
    id: TaskId,
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if self.registry.remove(&self.id).is_some() {
            tracing::debug!(task_id = %self.id, "task cleaned up");
        }
    }
}

pub struct ExecutionManager {
    registry: Arc<TaskRegistry>,
    workers: Arc<Semaphore>,
    joins: Mutex<JoinSet<()>>,
    ids: Arc<dyn IdGenerator>,
    accepting: AtomicBool,
    pool_size: usize,
    grace_period: Duration,
}

impl ExecutionManager {
    /// Allocate the pool and an empty registry.
    pub fn new(pool_size: usize, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            registry: Arc::new(TaskRegistry::default()),
            workers: Arc::new(Semaphore::new(pool_size.max(1))),
            joins: Mutex::new(JoinSet::new()),
            ids,
            accepting: AtomicBool::new(true),
            pool_size: pool_size.max(1),
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    fn joins(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.joins.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register and enqueue `unit`; returns without waiting for it.
    pub fn submit(&self, unit: Box<dyn ExecutionUnit>) -> Result<TaskId, StorletError> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(StorletError::ShuttingDown);
        }

        let (tx, rx) = watch::channel(false);
        let id = {
            let mut entries = self.registry.lock();
            let mut id = self.ids.generate_task_id();
            while entries.contains_key(&id) {
                id = self.ids.generate_task_id();
            }
            entries.insert(id, tx);
            id
        };

        let guard = CleanupGuard {
            registry: Arc::clone(&self.registry),
            id,
        };
        let workers = Arc::clone(&self.workers);
        let signal = CancelSignal::from_receiver(rx);

        let mut joins = self.joins();
        reap(&mut joins);
        joins.spawn(async move {
            let _guard = guard;
            let mut waiter = signal.clone();
            // キャンセル済みなら空きを待たずにファイナライザへ
            let _permit = tokio::select! {
                biased;
                _ = waiter.cancelled() => None,
                permit = workers.acquire_owned() => permit.ok(),
            };
            unit.run(signal).await;
        });

        tracing::debug!(task_id = %id, "task submitted");
        Ok(id)
    }

    /// Request cancellation of `task_id`.
    ///
    /// Returns `false` when no such task is registered, including ids that
    /// do not parse.
    pub fn cancel_task(&self, task_id: &str) -> bool {
        let Ok(id) = task_id.parse::<TaskId>() else {
            return false;
        };
        match self.registry.remove(&id) {
            Some(cancel) => {
                // 受信側がもういなくても問題ない
                let _ = cancel.send(true);
                tracing::info!(task_id = %id, "task cancelled");
                true
            }
            None => false,
        }
    }

    /// Remove a completed task. Returns whether it was still registered.
    pub fn cleanup_task(&self, id: &TaskId) -> bool {
        self.registry.remove(id).is_some()
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.registry.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.registry.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Stop accepting work, drain for the grace period, then abort the rest.
    ///
    /// Returns `true` when every unit finished within the grace period.
    pub async fn terminate(&self) -> bool {
        self.accepting.store(false, Ordering::Release);
        let mut joins = std::mem::take(&mut *self.joins());

        let drained = tokio::time::timeout(self.grace_period, async {
            while let Some(result) = joins.join_next().await {
                log_join_error(result);
            }
        })
        .await
        .is_ok();

        if !drained {
            tracing::warn!(
                remaining = joins.len(),
                grace_period = ?self.grace_period,
                "grace period expired, aborting remaining tasks"
            );
            joins.shutdown().await;
        }
        drained
    }
}

fn reap(joins: &mut JoinSet<()>) {
    while let Some(result) = joins.try_join_next() {
        log_join_error(result);
    }
}

fn log_join_error(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            tracing::error!(error = %e, "execution unit panicked");
        }
    }
}
