//! Errors - エラー型と分類
//!
//! `ErrorKind` は運用上の分類で、ディスパッチループが「ループを止めるか」を
//! 判断するときに使います。
//!
//! | Kind       | 例                                   | ループへの影響            |
//! |------------|--------------------------------------|---------------------------|
//! | Protocol   | JSON 不正、長さ不一致、command 欠落  | strict なら停止           |
//! | Validation | fd 数/型/ペアの不整合                | strict なら停止           |
//! | User       | storlet 内部の失敗                   | なし（ユニット内で回収）  |
//! | Transport  | listen/receive の失敗                | 常に停止                  |
//! | Internal   | 応答書き込み失敗、停止中の submit    | なし                      |

use std::io;

use thiserror::Error;

/// ErrorKind は実行エラーの分類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Protocol,
    Validation,
    User,
    Transport,
    Internal,
}

/// Failures of the underlying receive/send/listen primitives.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,

    #[error("datagram truncated ({0})")]
    Truncated(&'static str),

    #[error("too many descriptors: {0}")]
    TooManyDescriptors(usize),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<nix::errno::Errno> for TransportError {
    fn from(errno: nix::errno::Errno) -> Self {
        TransportError::Io(io::Error::from(errno))
    }
}

/// StorletError はデーモン全体で使うエラー
#[derive(Debug, Error)]
pub enum StorletError {
    /// Malformed envelope: bad JSON, length mismatch, missing command.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Descriptor count/type/pairing mismatch for a specific command.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// Failure raised by user processing logic.
    #[error("{0}")]
    User(String),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("execution manager is shutting down")]
    ShuttingDown,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StorletError {
    pub fn protocol(message: impl Into<String>) -> Self {
        StorletError::Protocol(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        StorletError::Validation(message.into())
    }

    pub fn user(message: impl Into<String>) -> Self {
        StorletError::User(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StorletError::Protocol(_) | StorletError::UnknownCommand(_) => ErrorKind::Protocol,
            StorletError::Validation(_) => ErrorKind::Validation,
            StorletError::User(_) => ErrorKind::User,
            StorletError::Transport(_) => ErrorKind::Transport,
            StorletError::ShuttingDown | StorletError::Io(_) => ErrorKind::Internal,
        }
    }
}

impl From<serde_json::Error> for StorletError {
    fn from(err: serde_json::Error) -> Self {
        StorletError::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(StorletError::protocol("x").kind(), ErrorKind::Protocol);
        assert_eq!(
            StorletError::UnknownCommand("SBUS_CMD_NOP".into()).kind(),
            ErrorKind::Protocol
        );
        assert_eq!(StorletError::validation("x").kind(), ErrorKind::Validation);
        assert_eq!(StorletError::user("x").kind(), ErrorKind::User);
        assert_eq!(
            StorletError::from(TransportError::Closed).kind(),
            ErrorKind::Transport
        );
        assert_eq!(StorletError::ShuttingDown.kind(), ErrorKind::Internal);
    }

    #[test]
    fn user_error_displays_bare_message() {
        let err = StorletError::user("The chunk_size parameter is not an integer");
        assert_eq!(err.to_string(), "The chunk_size parameter is not an integer");
    }

    #[test]
    fn json_errors_are_protocol_errors() {
        let err: StorletError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }
}
