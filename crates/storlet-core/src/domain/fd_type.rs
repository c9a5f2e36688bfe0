//! DescriptorType - 渡されたディスクリプタの役割
//!
//! wire 上では `SBUS_FD_*` 文字列として `transport.type`（wire キーは
//! `storlets.type`）に入ってきます。集合は閉じています。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The role of one passed file descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DescriptorType {
    #[serde(rename = "SBUS_FD_INPUT_OBJECT")]
    InputObject,
    #[serde(rename = "SBUS_FD_OUTPUT_OBJECT")]
    OutputObject,
    /// Always immediately follows its `OutputObject`.
    #[serde(rename = "SBUS_FD_OUTPUT_OBJECT_METADATA")]
    OutputObjectMetadata,
    #[serde(rename = "SBUS_FD_OUTPUT_TASK_ID")]
    OutputTaskId,
    #[serde(rename = "SBUS_FD_LOGGER")]
    Logger,
    #[serde(rename = "SBUS_FD_OUTPUT_CONTAINER")]
    OutputContainer,
    #[serde(rename = "SBUS_FD_SERVICE_OUT")]
    ServiceOut,
}

impl DescriptorType {
    pub const ALL: [DescriptorType; 7] = [
        DescriptorType::InputObject,
        DescriptorType::OutputObject,
        DescriptorType::OutputObjectMetadata,
        DescriptorType::OutputTaskId,
        DescriptorType::Logger,
        DescriptorType::OutputContainer,
        DescriptorType::ServiceOut,
    ];

    /// Wire tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            DescriptorType::InputObject => "SBUS_FD_INPUT_OBJECT",
            DescriptorType::OutputObject => "SBUS_FD_OUTPUT_OBJECT",
            DescriptorType::OutputObjectMetadata => "SBUS_FD_OUTPUT_OBJECT_METADATA",
            DescriptorType::OutputTaskId => "SBUS_FD_OUTPUT_TASK_ID",
            DescriptorType::Logger => "SBUS_FD_LOGGER",
            DescriptorType::OutputContainer => "SBUS_FD_OUTPUT_CONTAINER",
            DescriptorType::ServiceOut => "SBUS_FD_SERVICE_OUT",
        }
    }
}

impl fmt::Display for DescriptorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized wire tag.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown descriptor type '{0}'")]
pub struct UnknownDescriptorType(pub String);

impl FromStr for DescriptorType {
    type Err = UnknownDescriptorType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DescriptorType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownDescriptorType(s.to_string()))
    }
}
