//! Domain identifiers (strongly-typed IDs).
//!
//! # ULID ベースの ID + ジェネリック実装
//! タスク ID とオブジェクト要求キーはどちらも ULID を使います。
//! Phantom type パターンで `TaskId` と `RequestKey` を別の型として扱い、
//! レジストリとリクエストテーブルのキーを取り違えないようにしています。
//!
//! ## ULID の特性
//! - **時刻でソート可能**: timestamp が先頭にあるため、生成順序でソートできる
//! - **プロセス内で一意**: 80-bit のランダム部分により衝突しない
//! - **文字列化できる**: wire 上では `task-<ULID>` のような文字列として流れる
//!
//! ## 文字列との相互変換
//! Cancel コマンドの `task_id` は呼び出し側が送ってくる任意の文字列です。
//! `FromStr` はプレフィックスと ULID の両方を検証し、壊れた文字列は
//! パースエラーになります（レジストリ上は「見つからない」と同じ扱い）。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"task-", "req-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    /// Display で使うプレフィックス（例: "task-"）
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// `T` は PhantomData で、実行時にはメモリを消費しませんが、
/// コンパイル時に型安全性を提供します。
///
/// # 例
/// ```ignore
/// let task_id: TaskId = Id::from(Ulid::new());
/// let key: RequestKey = Id::from(Ulid::new());
/// // task_id と key は異なる型なので、混同できない
/// ```
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    /// ULID から Id を作成
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// 内部の ULID を取得
    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Error returned when a wire string is not a valid id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed id '{0}'")]
pub struct ParseIdError(pub String);

impl<T: IdMarker> FromStr for Id<T> {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s
            .strip_prefix(T::prefix())
            .ok_or_else(|| ParseIdError(s.to_string()))?;
        let ulid = Ulid::from_string(raw).map_err(|_| ParseIdError(s.to_string()))?;
        Ok(Self::from_ulid(ulid))
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// Execute タスクのマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn prefix() -> &'static str {
        "task-"
    }
}

/// コンテナハンドルからのオブジェクト要求のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectRequest {}

impl IdMarker for ObjectRequest {
    fn prefix() -> &'static str {
        "req-"
    }
}

// ========================================
// Type Alias（使いやすさのため）
// ========================================

/// Identifier of an in-flight Execute (the cancel key).
pub type TaskId = Id<Task>;

/// Key of a pending container-handle object request.
pub type RequestKey = Id<ObjectRequest>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let ulid1 = Ulid::new();
        let ulid2 = Ulid::new();

        let task = TaskId::from_ulid(ulid1);
        let key = RequestKey::from_ulid(ulid2);

        assert_eq!(task.as_ulid(), ulid1);
        assert_eq!(key.as_ulid(), ulid2);

        assert!(task.to_string().starts_with("task-"));
        assert!(key.to_string().starts_with("req-"));

        // let _: TaskId = key; // <- does not compile
    }

    #[test]
    fn display_parses_back() {
        let task = TaskId::from_ulid(Ulid::new());
        let parsed: TaskId = task.to_string().parse().unwrap();
        assert_eq!(parsed, task);
    }

    #[test]
    fn parse_rejects_foreign_prefix() {
        let key = RequestKey::from_ulid(Ulid::new());
        let err = key.to_string().parse::<TaskId>().unwrap_err();
        assert!(err.to_string().contains("req-"));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("task-not-a-ulid".parse::<TaskId>().is_err());
        assert!("".parse::<TaskId>().is_err());
        assert!("7f3a9c01".parse::<TaskId>().is_err());
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;

        assert_eq!(size_of::<TaskId>(), size_of::<Ulid>());
        assert_eq!(size_of::<RequestKey>(), size_of::<Ulid>());
    }
}
