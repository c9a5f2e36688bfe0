//! ChannelTransport - mpsc ベースのインメモリ Transport
//!
//! テストやプロセス内組み込み用。送信側を全部 drop すると
//! `listen()` が `TransportError::Closed` を返し、ディスパッチループは終了します。

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::{RawEnvelope, StorletError, TransportError};
use crate::ports::Transport;

pub struct ChannelTransport {
    rx: mpsc::Receiver<RawEnvelope>,
    pending: Option<RawEnvelope>,
}

impl ChannelTransport {
    /// Returns the sending half and the transport.
    pub fn new(capacity: usize) -> (mpsc::Sender<RawEnvelope>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx, pending: None })
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn listen(&mut self) -> Result<(), TransportError> {
        if self.pending.is_none() {
            let envelope = self.rx.recv().await.ok_or(TransportError::Closed)?;
            self.pending = Some(envelope);
        }
        Ok(())
    }

    async fn receive(&mut self) -> Result<RawEnvelope, StorletError> {
        self.listen().await?;
        self.pending
            .take()
            .ok_or_else(|| TransportError::Closed.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(command: &str) -> RawEnvelope {
        RawEnvelope {
            fds: Vec::new(),
            params: format!(r#"{{"command":"{command}"}}"#),
            metadata: "[]".to_string(),
        }
    }

    #[tokio::test]
    async fn delivers_in_order() {
        let (tx, mut transport) = ChannelTransport::new(4);
        tx.send(envelope("A")).await.unwrap();
        tx.send(envelope("B")).await.unwrap();

        transport.listen().await.unwrap();
        // listen を重ねても 1 件目は失われない
        transport.listen().await.unwrap();
        assert!(transport.receive().await.unwrap().params.contains("\"A\""));
        assert!(transport.receive().await.unwrap().params.contains("\"B\""));
    }

    #[tokio::test]
    async fn closed_sender_is_transport_error() {
        let (tx, mut transport) = ChannelTransport::new(1);
        drop(tx);
        assert!(matches!(transport.listen().await, Err(TransportError::Closed)));
        assert!(matches!(
            transport.receive().await,
            Err(StorletError::Transport(TransportError::Closed))
        ));
    }
}
