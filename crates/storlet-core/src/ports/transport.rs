//! Transport port - エンベロープを 1 つずつ受け取る
//!
//! ディスパッチループの Listening 状態は `listen()`、Decoding への遷移は
//! `receive()` に対応します。2 段階に分けているのは、受信待ちでだけ
//! 制御タスクが止まることを明示するためです。
//!
//! `receive()` の失敗のうち、`StorletError::Transport` は致命的、
//! それ以外（フレームが壊れている等の Protocol）は 1 件だけの失敗です。
//!
//! # 実装
//! - **SBusTransport**: Unix datagram + SCM_RIGHTS（本番用）
//! - **ChannelTransport**: mpsc ベース（テスト・組み込み用）

use async_trait::async_trait;

use crate::domain::{RawEnvelope, StorletError, TransportError};

#[async_trait]
pub trait Transport: Send + Sync {
    /// Suspend until an envelope can be received.
    async fn listen(&mut self) -> Result<(), TransportError>;

    /// Take exactly one envelope.
    async fn receive(&mut self) -> Result<RawEnvelope, StorletError>;
}
