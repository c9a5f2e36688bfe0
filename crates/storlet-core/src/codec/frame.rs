//! Frame - データグラムのバイト列レイアウト
//!
//! ```text
//! [n_files: i32][metadata_len: i32][params_len: i32][metadata bytes][params bytes]
//! ```
//!
//! 整数はネイティブバイトオーダー（同一ホスト内 IPC のため）。
//! ディスクリプタ本体は SCM_RIGHTS で別に運ばれ、`n_files` と一致する必要があります。

use crate::domain::StorletError;

const INT_SIZE: usize = std::mem::size_of::<i32>();

pub const HEADER_LEN: usize = 3 * INT_SIZE;

/// Largest datagram the transport will receive.
pub const MAX_PAYLOAD: usize = 64 * 1024;

/// Largest descriptor count per datagram.
pub const MAX_FDS: usize = 4096;

/// A borrowed view of one decoded datagram payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub n_files: usize,
    pub metadata: &'a str,
    pub params: &'a str,
}

pub fn encode(n_files: usize, metadata: &str, params: &str) -> Result<Vec<u8>, StorletError> {
    if n_files > MAX_FDS {
        return Err(StorletError::protocol(format!(
            "{n_files} descriptors exceed the limit of {MAX_FDS}"
        )));
    }
    let total = HEADER_LEN + metadata.len() + params.len();
    if total > MAX_PAYLOAD {
        return Err(StorletError::protocol(format!(
            "payload of {total} bytes exceeds the limit of {MAX_PAYLOAD}"
        )));
    }

    let mut buf = Vec::with_capacity(total);
    for n in [n_files, metadata.len(), params.len()] {
        // 上の上限チェックにより i32 に収まる
        buf.extend_from_slice(&(n as i32).to_ne_bytes());
    }
    buf.extend_from_slice(metadata.as_bytes());
    buf.extend_from_slice(params.as_bytes());
    Ok(buf)
}

pub fn decode(buf: &[u8]) -> Result<Frame<'_>, StorletError> {
    if buf.len() < HEADER_LEN {
        return Err(StorletError::protocol(format!(
            "short datagram: {} bytes, header needs {HEADER_LEN}",
            buf.len()
        )));
    }

    let read_len = |index: usize, name: &str| -> Result<usize, StorletError> {
        let start = index * INT_SIZE;
        let mut raw = [0u8; INT_SIZE];
        raw.copy_from_slice(&buf[start..start + INT_SIZE]);
        let value = i32::from_ne_bytes(raw);
        usize::try_from(value)
            .map_err(|_| StorletError::protocol(format!("negative {name} in header: {value}")))
    };

    let n_files = read_len(0, "n_files")?;
    let metadata_len = read_len(1, "metadata_len")?;
    let params_len = read_len(2, "params_len")?;

    let body = &buf[HEADER_LEN..];
    if metadata_len + params_len > body.len() {
        return Err(StorletError::protocol(format!(
            "header declares {} body bytes, datagram has {}",
            metadata_len + params_len,
            body.len()
        )));
    }

    let metadata = std::str::from_utf8(&body[..metadata_len])
        .map_err(|e| StorletError::protocol(format!("metadata is not UTF-8: {e}")))?;
    let params = std::str::from_utf8(&body[metadata_len..metadata_len + params_len])
        .map_err(|e| StorletError::protocol(format!("params is not UTF-8: {e}")))?;

    Ok(Frame {
        n_files,
        metadata,
        params,
    })
}
