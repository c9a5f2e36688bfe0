//! Ports - 抽象化レイヤー
//!
//! 外部との境界を trait で定義します。
//! - **Transport**: fd 付きエンベロープの受信
//! - **Storlet**: ユーザー処理ロジック
//! - **Clock / IdGenerator**: ID 生成（テストで差し替え可能）

pub mod clock;
pub mod id_generator;
pub mod storlet;
pub mod transport;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::storlet::Storlet;
pub use self::transport::Transport;
