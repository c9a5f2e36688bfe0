//! SBus - Unix datagram + SCM_RIGHTS の Transport とクライアント
//!
//! 1 データグラム = 1 エンベロープ。ペイロードは `codec::frame` のレイアウトで、
//! fd は SCM_RIGHTS の制御メッセージで渡ります。
//!
//! # 学習ポイント
//! - tokio の `UnixDatagram` で readiness を待ち、実際の受信は
//!   `try_io` の中で `nix::sys::socket::recvmsg` を呼ぶ
//! - 受け取った fd はすぐ `OwnedFd` に包む。以降どこで return しても close される
//! - `MSG_TRUNC` / `MSG_CTRUNC` は黙って捨てず TransportError にする

use std::fs::{File as StdFile, Permissions};
use std::io::{self, IoSlice, IoSliceMut};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::UnixDatagram as StdUnixDatagram;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::socket::{
    ControlMessage, ControlMessageOwned, MsgFlags, UnixAddr, recvmsg, sendmsg,
};
use tokio::io::{AsyncReadExt, Interest};
use tokio::net::UnixDatagram;

use crate::codec::{self, frame};
use crate::domain::{
    Command, CommandResponse, DescriptorMetadata, DescriptorType, OutboundRequest, RawEnvelope,
    StorletError, TransportError,
};
use crate::ports::Transport;

/// Mode of the bound socket file; any local gateway process may connect.
const SOCKET_MODE: u32 = 0o777;

pub struct SBusTransport {
    socket: UnixDatagram,
    path: PathBuf,
}

impl SBusTransport {
    /// Bind a datagram socket at `path`, replacing a stale socket file.
    ///
    /// Must be called inside a tokio runtime.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        let path = path.as_ref();
        match std::fs::remove_file(path) {
            Ok(()) => tracing::debug!(path = %path.display(), "removed stale socket"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let socket = UnixDatagram::bind(path)?;
        std::fs::set_permissions(path, Permissions::from_mode(SOCKET_MODE))?;
        tracing::info!(path = %path.display(), "bus socket bound");

        Ok(Self {
            socket,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SBusTransport {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::debug!(error = %e, "socket file not removed");
        }
    }
}

#[async_trait]
impl Transport for SBusTransport {
    async fn listen(&mut self) -> Result<(), TransportError> {
        self.socket.readable().await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<RawEnvelope, StorletError> {
        let fd = self.socket.as_raw_fd();
        loop {
            self.socket.readable().await.map_err(TransportError::from)?;
            match self.socket.try_io(Interest::READABLE, || recv_datagram(fd)) {
                Ok(result) => return result,
                // 誤った readiness。もう一度待つ
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(TransportError::Io(e).into()),
            }
        }
    }
}

/// Receive one datagram. The outer `io::Result` only carries socket-level
/// failures (including `WouldBlock`); the inner one carries per-datagram faults.
fn recv_datagram(fd: RawFd) -> io::Result<Result<RawEnvelope, StorletError>> {
    let mut buf = vec![0u8; frame::MAX_PAYLOAD];
    let mut cmsg_buffer = nix::cmsg_space!([RawFd; frame::MAX_FDS]);

    let (bytes, flags, fds) = {
        let mut iov = [IoSliceMut::new(&mut buf)];
        let msg = match recvmsg::<()>(
            fd,
            &mut iov,
            Some(&mut cmsg_buffer),
            MsgFlags::MSG_CMSG_CLOEXEC,
        ) {
            Ok(msg) => msg,
            Err(Errno::EAGAIN) => return Err(io::ErrorKind::WouldBlock.into()),
            Err(e) => return Err(e.into()),
        };

        let mut fds = Vec::new();
        for cmsg in msg.cmsgs()? {
            if let ControlMessageOwned::ScmRights(raw) = cmsg {
                // SAFETY: the kernel just installed these descriptors for us
                // and nothing else refers to them.
                fds.extend(raw.into_iter().map(|raw| unsafe { OwnedFd::from_raw_fd(raw) }));
            }
        }
        (msg.bytes, msg.flags, fds)
    };

    if flags.contains(MsgFlags::MSG_TRUNC) {
        return Ok(Err(TransportError::Truncated("payload").into()));
    }
    if flags.contains(MsgFlags::MSG_CTRUNC) {
        return Ok(Err(TransportError::Truncated("descriptors").into()));
    }

    Ok(assemble(&buf[..bytes], fds))
}

fn assemble(payload: &[u8], fds: Vec<OwnedFd>) -> Result<RawEnvelope, StorletError> {
    let frame = frame::decode(payload)?;
    if frame.n_files != fds.len() {
        return Err(StorletError::protocol(format!(
            "header declares {} descriptors, {} received",
            frame.n_files,
            fds.len()
        )));
    }
    Ok(RawEnvelope {
        params: frame.params.to_string(),
        metadata: frame.metadata.to_string(),
        fds,
    })
}

/// One-shot sender used by clients and tests.
pub struct SBusClient;

impl SBusClient {
    /// Send `envelope` to the daemon bound at `path`.
    ///
    /// The envelope's descriptors are closed locally once sent.
    pub fn send(path: impl AsRef<Path>, envelope: RawEnvelope) -> Result<(), StorletError> {
        if envelope.fds.len() > frame::MAX_FDS {
            return Err(TransportError::TooManyDescriptors(envelope.fds.len()).into());
        }
        let payload = frame::encode(envelope.fds.len(), &envelope.metadata, &envelope.params)?;

        let socket = StdUnixDatagram::unbound().map_err(TransportError::from)?;
        let addr = UnixAddr::new(path.as_ref()).map_err(TransportError::from)?;
        let raw: Vec<RawFd> = envelope.fds.iter().map(AsRawFd::as_raw_fd).collect();
        let cmsgs: Vec<ControlMessage<'_>> = if raw.is_empty() {
            Vec::new()
        } else {
            vec![ControlMessage::ScmRights(&raw)]
        };

        let iov = [IoSlice::new(&payload)];
        sendmsg(socket.as_raw_fd(), &iov, &cmsgs, MsgFlags::empty(), Some(&addr))
            .map_err(TransportError::from)?;
        Ok(())
    }

    /// Send a service command (Ping, Halt, Cancel) and wait for its response.
    pub async fn service_command(
        path: impl AsRef<Path>,
        command: Command,
        task_id: Option<String>,
    ) -> Result<CommandResponse, StorletError> {
        let (read_end, write_end) = nix::unistd::pipe().map_err(TransportError::from)?;

        let mut request = OutboundRequest::new(command)
            .descriptor(write_end, DescriptorMetadata::new(DescriptorType::ServiceOut));
        if let Some(task_id) = task_id {
            request = request.task_id(task_id);
        }
        Self::send(path, codec::encode_request(request)?)?;

        // 書き込み側は送信後に手元で閉じているので、デーモンが閉じれば EOF
        let mut reader = tokio::fs::File::from_std(StdFile::from(read_end));
        let mut body = Vec::new();
        reader.read_to_end(&mut body).await?;
        if body.is_empty() {
            return Err(StorletError::protocol("daemon closed the channel without a response"));
        }
        Ok(serde_json::from_slice(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[tokio::test]
    async fn envelope_crosses_the_socket_with_descriptors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sbus");
        let mut transport = SBusTransport::bind(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o777);

        let (read_end, write_end) = nix::unistd::pipe().unwrap();
        let request = OutboundRequest::new(Command::Ping)
            .descriptor(write_end, DescriptorMetadata::new(DescriptorType::ServiceOut));
        SBusClient::send(&path, codec::encode_request(request).unwrap()).unwrap();

        transport.listen().await.unwrap();
        let raw = transport.receive().await.unwrap();
        assert_eq!(raw.fds.len(), 1);

        let decoded = codec::decode(raw).unwrap();
        assert_eq!(decoded.command, "SBUS_CMD_PING");

        // 受け取った fd は送った pipe の書き込み側そのもの
        let mut fds = decoded.fds;
        let channel = crate::stream::ControlChannel::new(fds.remove(0));
        channel.respond(&CommandResponse::ok()).await.unwrap();
        let mut out = String::new();
        StdFile::from(read_end).read_to_string(&mut out).unwrap();
        assert_eq!(out, r#"{"status":true,"message":"OK"}"#);
    }

    #[tokio::test]
    async fn rebinding_replaces_stale_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sbus");
        let first = SBusTransport::bind(&path).unwrap();
        std::mem::forget(first);
        assert!(SBusTransport::bind(&path).is_ok());
    }

    #[test]
    fn descriptor_count_must_match_header() {
        let payload = frame::encode(2, "[]", "{}").unwrap();
        let err = assemble(&payload, Vec::new()).unwrap_err();
        assert!(matches!(err, StorletError::Protocol(_)));
    }

    #[test]
    fn sending_to_missing_socket_is_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        let envelope = RawEnvelope {
            fds: Vec::new(),
            params: r#"{"command":"SBUS_CMD_PING"}"#.to_string(),
            metadata: "[]".to_string(),
        };
        let err = SBusClient::send(dir.path().join("nobody"), envelope).unwrap_err();
        assert!(matches!(err, StorletError::Transport(_)));
    }
}
