//! Task Model - デコード・検証済みのコマンド
//!
//! 閉じた enum で表現し、`exec` 1 回で終わります（別の variant に遷移しない）。
//! ディスパッチは `Task::exec` の 1 呼び出しで、型の検査はしません。
//!
//! | variant    | 実行場所            | 応答                              | ループ |
//! |------------|---------------------|-----------------------------------|--------|
//! | Halt       | 制御タスク上        | service-out に OK                 | 停止   |
//! | Ping       | 制御タスク上        | service-out に OK                 | 継続   |
//! | Cancel     | 制御タスク上        | OK / "Task id <id> is not found"  | 継続   |
//! | Execute    | ワーカープール      | task-id fd と service-out         | 継続   |
//! | Descriptor | 制御タスク上        | なし（ランデブーを完了させる）    | 継続   |

pub mod execution;
pub mod factory;

use std::collections::HashMap;
use std::sync::Arc;

use crate::app::execution::ExecutionManager;
use crate::domain::{CommandResponse, RequestKey};
use crate::ports::Storlet;
use crate::stream::{
    ControlChannel, ExecutionResources, ObjectOutputStream, ObjectRequestTable, StorletLogger,
};

pub use execution::{ExecutionOutcome, StorletExecution};
pub use factory::TaskFactory;

/// Whether the dispatch loop keeps going after a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    Continue,
    Halt,
}

/// Collaborators a task needs while executing.
pub struct TaskContext {
    pub manager: Arc<ExecutionManager>,
    pub storlet: Arc<dyn Storlet>,
    pub requests: Arc<ObjectRequestTable>,
}

#[derive(Debug)]
pub struct ExecuteTask {
    pub params: HashMap<String, String>,
    pub resources: ExecutionResources,
}

#[derive(Debug)]
pub enum Task {
    Halt {
        service_out: ControlChannel,
    },
    Ping {
        service_out: ControlChannel,
    },
    Cancel {
        service_out: ControlChannel,
        task_id: String,
    },
    Execute(ExecuteTask),
    Descriptor {
        key: RequestKey,
        stream: ObjectOutputStream,
    },
}

impl Task {
    pub fn name(&self) -> &'static str {
        match self {
            Task::Halt { .. } => "halt",
            Task::Ping { .. } => "ping",
            Task::Cancel { .. } => "cancel",
            Task::Execute(_) => "execute",
            Task::Descriptor { .. } => "descriptor",
        }
    }

    pub async fn exec(self, ctx: &TaskContext) -> LoopAction {
        match self {
            Task::Halt { service_out } => {
                respond(service_out, &CommandResponse::ok()).await;
                LoopAction::Halt
            }
            Task::Ping { service_out } => {
                respond(service_out, &CommandResponse::ok()).await;
                LoopAction::Continue
            }
            Task::Cancel {
                service_out,
                task_id,
            } => {
                let response = if ctx.manager.cancel_task(&task_id) {
                    CommandResponse::ok()
                } else {
                    tracing::info!(%task_id, "cancel for unknown task");
                    CommandResponse::task_not_found(&task_id)
                };
                respond(service_out, &response).await;
                LoopAction::Continue
            }
            Task::Execute(task) => {
                execute(task, ctx).await;
                LoopAction::Continue
            }
            Task::Descriptor { key, stream } => {
                if let Err(e) = ctx.requests.fulfill(&key, stream) {
                    tracing::warn!(%key, error = %e, "descriptor could not be delivered");
                }
                LoopAction::Continue
            }
        }
    }
}

async fn execute(task: ExecuteTask, ctx: &TaskContext) {
    let ExecuteTask { params, resources } = task;
    let ExecutionResources {
        inputs,
        outputs,
        logger,
        service_out,
        task_id_out,
    } = resources;

    let unit = StorletExecution::new(
        Arc::clone(&ctx.storlet),
        inputs,
        outputs,
        params,
        logger.unwrap_or_else(StorletLogger::discard),
    );

    match ctx.manager.submit(Box::new(unit)) {
        Ok(task_id) => {
            tracing::info!(%task_id, "execute submitted");
            if let Some(sink) = task_id_out {
                if let Err(e) = sink.report(&task_id).await {
                    tracing::warn!(%task_id, error = %e, "failed to report task id");
                }
            }
            if let Some(channel) = service_out {
                respond(channel, &CommandResponse::submitted(&task_id)).await;
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "execute was not submitted");
            if let Some(channel) = service_out {
                respond(channel, &CommandResponse::failure(e.to_string())).await;
            }
        }
    }
}

/// Write `response` and close the channel; failures are only logged.
pub(crate) async fn respond(channel: ControlChannel, response: &CommandResponse) {
    if let Err(e) = channel.respond(response).await {
        tracing::warn!(error = %e, "failed to write service response");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DescriptorMetadata, DescriptorType, StorletError};
    use crate::ports::{SystemClock, UlidGenerator};
    use crate::stream::{InputStream, StorletOutput, StreamBuilder};
    use async_trait::async_trait;
    use std::fs::File as StdFile;
    use std::io::Read;
    use std::os::fd::OwnedFd;

    struct Noop;

    #[async_trait]
    impl Storlet for Noop {
        fn name(&self) -> &str {
            "noop"
        }

        async fn invoke(
            &self,
            _inputs: &mut [InputStream],
            _outputs: &mut [StorletOutput],
            _params: &HashMap<String, String>,
            _logger: &mut StorletLogger,
        ) -> Result<(), StorletError> {
            Ok(())
        }
    }

    fn context() -> TaskContext {
        TaskContext {
            manager: Arc::new(ExecutionManager::new(
                2,
                Arc::new(UlidGenerator::new(SystemClock)),
            )),
            storlet: Arc::new(Noop),
            requests: Arc::new(ObjectRequestTable::new()),
        }
    }

    fn pipe() -> (StdFile, OwnedFd) {
        let (read_end, write_end) = nix::unistd::pipe().unwrap();
        (StdFile::from(read_end), write_end)
    }

    fn read(mut file: StdFile) -> String {
        let mut out = String::new();
        file.read_to_string(&mut out).unwrap();
        out
    }

    #[tokio::test]
    async fn ping_answers_ok_and_continues() {
        let (reader, writer) = pipe();
        let action = Task::Ping {
            service_out: ControlChannel::new(writer),
        }
        .exec(&context())
        .await;

        assert_eq!(action, LoopAction::Continue);
        assert_eq!(read(reader), r#"{"status":true,"message":"OK"}"#);
    }

    #[tokio::test]
    async fn halt_answers_ok_and_stops() {
        let (reader, writer) = pipe();
        let action = Task::Halt {
            service_out: ControlChannel::new(writer),
        }
        .exec(&context())
        .await;

        assert_eq!(action, LoopAction::Halt);
        assert_eq!(read(reader), r#"{"status":true,"message":"OK"}"#);
    }

    #[tokio::test]
    async fn cancel_of_unknown_task_reports_not_found() {
        let (reader, writer) = pipe();
        Task::Cancel {
            service_out: ControlChannel::new(writer),
            task_id: "missing".to_string(),
        }
        .exec(&context())
        .await;

        assert_eq!(
            read(reader),
            r#"{"status":false,"message":"Task id missing is not found"}"#
        );
    }

    #[tokio::test]
    async fn execute_reports_task_id_on_both_channels() {
        let ctx = context();
        let (id_reader, id_writer) = pipe();
        let (svc_reader, svc_writer) = pipe();

        let builder = StreamBuilder::new(
            Arc::clone(&ctx.requests),
            Arc::new(UlidGenerator::new(SystemClock)),
        );
        let resources = builder
            .build(
                vec![svc_writer, id_writer],
                vec![
                    DescriptorMetadata::new(DescriptorType::ServiceOut),
                    DescriptorMetadata::new(DescriptorType::OutputTaskId),
                ],
            )
            .unwrap();

        let action = Task::Execute(ExecuteTask {
            params: HashMap::new(),
            resources,
        })
        .exec(&ctx)
        .await;
        assert_eq!(action, LoopAction::Continue);

        let task_id = read(id_reader);
        assert!(task_id.starts_with("task-"));
        let response: CommandResponse = serde_json::from_str(&read(svc_reader)).unwrap();
        assert!(response.status);
        assert_eq!(response.task_id.as_deref(), Some(task_id.as_str()));
    }

    #[tokio::test]
    async fn execute_after_terminate_is_refused_on_service_out() {
        let ctx = context();
        ctx.manager.terminate().await;
        let (reader, writer) = pipe();

        let mut resources = ExecutionResources::default();
        resources.service_out = Some(ControlChannel::new(writer));
        Task::Execute(ExecuteTask {
            params: HashMap::new(),
            resources,
        })
        .exec(&ctx)
        .await;

        let response: CommandResponse = serde_json::from_str(&read(reader)).unwrap();
        assert!(!response.status);
    }
}
