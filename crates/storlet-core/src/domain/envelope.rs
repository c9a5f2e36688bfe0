//! Envelope - トランスポートが運ぶ 1 単位
//!
//! - `RawEnvelope`: ディスクリプタ配列 + 2 つの JSON 文字列（デコード前）
//! - `DecodedRequest`: デコード済みのリクエスト（command, params, task_id, fd + メタデータ）
//! - `OutboundRequest`: クライアント側で組み立てて送るリクエスト
//!
//! ディスクリプタは `OwnedFd` で保持するので、どこで早期 return しても
//! drop 時に close されます（fd リーク防止）。

use std::collections::HashMap;
use std::os::fd::OwnedFd;

use super::command::Command;
use super::fd_type::DescriptorType;
use super::metadata::DescriptorMetadata;

/// One unit of transport delivery, before decoding.
#[derive(Debug)]
pub struct RawEnvelope {
    pub fds: Vec<OwnedFd>,
    /// `{command, params?, task_id?}` JSON.
    pub params: String,
    /// JSON array with one element per descriptor.
    pub metadata: String,
}

/// A decoded envelope: `fds[i]` is described by `metadata[i]`.
#[derive(Debug)]
pub struct DecodedRequest {
    pub command: String,
    pub params: HashMap<String, String>,
    pub task_id: Option<String>,
    pub fds: Vec<OwnedFd>,
    pub metadata: Vec<DescriptorMetadata>,
}

impl DecodedRequest {
    pub fn num_fds(&self) -> usize {
        self.fds.len()
    }

    /// Slot of the first well-typed service-out descriptor.
    pub fn service_out_slot(&self) -> Option<usize> {
        self.metadata
            .iter()
            .enumerate()
            .find(|(slot, md)| md.fd_type(*slot).ok() == Some(DescriptorType::ServiceOut))
            .map(|(slot, _)| slot)
    }

    /// Type tags in slot order (unparsed tags are kept verbatim).
    pub fn type_tags(&self) -> Vec<Option<&str>> {
        self.metadata.iter().map(DescriptorMetadata::type_tag).collect()
    }
}

/// Client-side request, encoded by `codec::encode_request`.
#[derive(Debug)]
pub struct OutboundRequest {
    pub command: Command,
    pub params: HashMap<String, String>,
    pub task_id: Option<String>,
    pub descriptors: Vec<(OwnedFd, DescriptorMetadata)>,
}

impl OutboundRequest {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            params: HashMap::new(),
            task_id: None,
            descriptors: Vec::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn descriptor(mut self, fd: OwnedFd, metadata: DescriptorMetadata) -> Self {
        self.descriptors.push((fd, metadata));
        self
    }
}
