//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **SBusTransport / SBusClient**: Unix datagram + SCM_RIGHTS（本番用）
//! - **ChannelTransport**: mpsc ベース（テスト・組み込み用）

pub mod channel;
pub mod sbus;

pub use self::channel::ChannelTransport;
pub use self::sbus::{SBusClient, SBusTransport};
