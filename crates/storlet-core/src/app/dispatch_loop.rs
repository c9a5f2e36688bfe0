//! DispatchLoop - 制御ループ
//!
//! ```text
//! Listening ──▶ Decoding ──▶ Dispatching ──┬──▶ Listening
//!                                          └──▶ Terminated (Halt / 致命的エラー)
//! ```
//!
//! # 学習ポイント
//! - 1 つの async タスクで逐次処理する（エンベロープは到着順に 1 つずつ）
//! - 止まるのは `listen()` の待ちだけ。Execute はプールに渡してすぐ戻る
//! - 終了時は必ず `ExecutionManager::terminate()` を通る
//!
//! # 失敗時の扱い
//! | 失敗                       | Lenient              | Strict         |
//! |----------------------------|----------------------|----------------|
//! | TransportError             | ループ終了           | ループ終了     |
//! | デコード失敗               | ログして継続         | ループ終了     |
//! | Task を作れない（検証失敗）| NACK して継続        | NACK して終了  |
//!
//! NACK は service-out が特定できたときだけ送ります。そのため factory に
//! 渡す前に service-out の fd を複製しておき、成功したらすぐ閉じます
//! （複製を持ったままだと呼び出し側に EOF が届かない）。

use std::os::fd::OwnedFd;

use tracing::Instrument;

use crate::codec;
use crate::domain::{CommandResponse, RawEnvelope, StorletError};
use crate::ports::Transport;
use crate::stream::ControlChannel;
use crate::task::{LoopAction, TaskContext, TaskFactory};

use super::config::FailurePolicy;

pub struct DispatchLoop<T> {
    transport: T,
    factory: TaskFactory,
    ctx: TaskContext,
    policy: FailurePolicy,
    container_id: String,
}

impl<T: Transport> DispatchLoop<T> {
    pub fn new(
        transport: T,
        factory: TaskFactory,
        ctx: TaskContext,
        policy: FailurePolicy,
        container_id: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            factory,
            ctx,
            policy,
            container_id: container_id.into(),
        }
    }

    pub fn context(&self) -> &TaskContext {
        &self.ctx
    }

    /// Serve until Halt or a fatal error, then drain the pool.
    pub async fn run(mut self) -> Result<(), StorletError> {
        let span = tracing::info_span!(
            "dispatch",
            storlet = %self.ctx.storlet.name(),
            container_id = %self.container_id,
        );

        async move {
            tracing::info!("dispatch loop started");
            let result = self.serve().await;
            match &result {
                Ok(()) => tracing::info!("dispatch loop halted"),
                Err(e) => tracing::error!(error = %e, kind = ?e.kind(), "dispatch loop terminated"),
            }
            let drained = self.ctx.manager.terminate().await;
            tracing::info!(drained, "execution manager terminated");
            result
        }
        .instrument(span)
        .await
    }

    async fn serve(&mut self) -> Result<(), StorletError> {
        loop {
            self.transport.listen().await?;
            let raw = match self.transport.receive().await {
                Ok(raw) => raw,
                Err(e @ StorletError::Transport(_)) => return Err(e),
                Err(e) => {
                    self.reject(e, None).await?;
                    continue;
                }
            };
            if self.dispatch(raw).await? == LoopAction::Halt {
                return Ok(());
            }
        }
    }

    async fn dispatch(&self, raw: RawEnvelope) -> Result<LoopAction, StorletError> {
        let request = match codec::decode(raw) {
            Ok(request) => request,
            Err(e) => return self.reject(e, None).await,
        };

        let command = request.command.clone();
        let nack = request
            .service_out_slot()
            .and_then(|slot| request.fds.get(slot))
            .and_then(|fd| fd.try_clone().ok());

        let task = match self.factory.create(request) {
            Ok(task) => task,
            Err(e) => return self.reject(e, nack).await,
        };
        drop(nack);

        tracing::debug!(%command, task = task.name(), "dispatching");
        Ok(task.exec(&self.ctx).await)
    }

    async fn reject(
        &self,
        err: StorletError,
        nack: Option<OwnedFd>,
    ) -> Result<LoopAction, StorletError> {
        tracing::error!(error = %err, kind = ?err.kind(), "request rejected");

        if let Some(fd) = nack {
            let response = CommandResponse::failure(err.to_string());
            if let Err(e) = ControlChannel::new(fd).respond(&response).await {
                tracing::warn!(error = %e, "failed to send rejection");
            }
        }

        match self.policy {
            FailurePolicy::Lenient => Ok(LoopAction::Continue),
            FailurePolicy::Strict => Err(err),
        }
    }
}
