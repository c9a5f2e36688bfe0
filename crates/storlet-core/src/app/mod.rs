//! App - アプリケーション層
//!
//! ports と stream/task を組み合わせてデーモンを組み立てます。
//!
//! # 主要コンポーネント
//! - **DaemonBuilder**: 構築とワイヤリング（起動時検証）
//! - **ExecutionManager**: 実行中タスクのレジストリとワーカープール
//! - **DispatchLoop**: 受信 → デコード → Task → 実行 の制御ループ
//! - **StorletRegistry**: 名前 → storlet の静的テーブル

pub mod builder;
pub mod config;
pub mod dispatch_loop;
pub mod execution;
pub mod registry;

pub use self::builder::{BuildError, Daemon, DaemonBuilder};
pub use self::config::{ConfigError, DaemonConfig, FailurePolicy, parse_log_level};
pub use self::dispatch_loop::DispatchLoop;
pub use self::execution::{CancelSignal, DEFAULT_GRACE_PERIOD, ExecutionManager, ExecutionUnit};
pub use self::registry::{RegistryError, StorletRegistry};
