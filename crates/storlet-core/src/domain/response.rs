//! CommandResponse - 制御チャネルに返す応答
//!
//! wire 上は `{"status": <bool>, "message": "<string>"}` の JSON 1 個。
//! Execute のときだけ `task_id` が付きます。

use serde::{Deserialize, Serialize};

use super::ids::TaskId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub status: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

impl CommandResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: true,
            message: message.into(),
            task_id: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: false,
            message: message.into(),
            task_id: None,
        }
    }

    pub fn ok() -> Self {
        Self::success("OK")
    }

    pub fn submitted(task_id: &TaskId) -> Self {
        Self {
            task_id: Some(task_id.to_string()),
            ..Self::ok()
        }
    }

    pub fn task_not_found(task_id: &str) -> Self {
        Self::failure(format!("Task id {task_id} is not found"))
    }
}
