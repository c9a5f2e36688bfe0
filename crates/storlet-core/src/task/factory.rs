//! TaskFactory - `DecodedRequest` から `Task` を作る
//!
//! コマンドごとの fd 数・型の契約をここで検証します。
//! - Halt / Ping / Cancel: service-out がちょうど 1 つ
//! - Cancel: さらに空でない `task_id`
//! - Execute: StreamBuilder に全面委譲
//! - Descriptor: output-object + output-object-metadata の 2 つと `key` パラメータ
//!
//! 検証に失敗したら Task は作らず、`StorletError` を返します。
//! 失敗時にも fd は `DecodedRequest` ごと drop されて close されます。

use std::os::fd::OwnedFd;

use crate::domain::{
    Command, DecodedRequest, DescriptorMetadata, DescriptorType, RequestKey, StorletError,
};
use crate::stream::{ControlChannel, ObjectOutputStream, StreamBuilder};

use super::{ExecuteTask, Task};

/// Parameter naming the pending object request a Descriptor fulfills.
pub const DESCRIPTOR_KEY_PARAM: &str = "key";

pub struct TaskFactory {
    builder: StreamBuilder,
}

impl TaskFactory {
    pub fn new(builder: StreamBuilder) -> Self {
        Self { builder }
    }

    pub fn create(&self, request: DecodedRequest) -> Result<Task, StorletError> {
        let command: Command = request.command.parse()?;
        match command {
            Command::Halt => Ok(Task::Halt {
                service_out: service_channel(command, request.fds, &request.metadata)?,
            }),
            Command::Ping => Ok(Task::Ping {
                service_out: service_channel(command, request.fds, &request.metadata)?,
            }),
            Command::Cancel => {
                let task_id = request
                    .task_id
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| StorletError::validation("cancel requires a task_id"))?;
                Ok(Task::Cancel {
                    service_out: service_channel(command, request.fds, &request.metadata)?,
                    task_id,
                })
            }
            Command::Execute => {
                let resources = self.builder.build(request.fds, request.metadata)?;
                Ok(Task::Execute(ExecuteTask {
                    params: request.params,
                    resources,
                }))
            }
            Command::Descriptor => descriptor_task(request),
        }
    }
}

fn check_types(
    command: Command,
    metadata: &[DescriptorMetadata],
    expected: &[DescriptorType],
) -> Result<(), StorletError> {
    if metadata.len() != expected.len() {
        return Err(StorletError::validation(format!(
            "{command} requires {} descriptor(s), got {}",
            expected.len(),
            metadata.len()
        )));
    }
    for (slot, (md, want)) in metadata.iter().zip(expected).enumerate() {
        let got = md.fd_type(slot)?;
        if got != *want {
            return Err(StorletError::validation(format!(
                "{command}: fd {slot} must be {want}, got {got}"
            )));
        }
    }
    Ok(())
}

fn service_channel(
    command: Command,
    fds: Vec<OwnedFd>,
    metadata: &[DescriptorMetadata],
) -> Result<ControlChannel, StorletError> {
    check_types(command, metadata, &[DescriptorType::ServiceOut])?;
    let fd = fds
        .into_iter()
        .next()
        .ok_or_else(|| StorletError::validation(format!("{command} carries no descriptor")))?;
    Ok(ControlChannel::new(fd))
}

fn descriptor_task(request: DecodedRequest) -> Result<Task, StorletError> {
    check_types(
        Command::Descriptor,
        &request.metadata,
        &[
            DescriptorType::OutputObject,
            DescriptorType::OutputObjectMetadata,
        ],
    )?;

    let raw_key = request.params.get(DESCRIPTOR_KEY_PARAM).ok_or_else(|| {
        StorletError::validation(format!("descriptor requires a '{DESCRIPTOR_KEY_PARAM}' parameter"))
    })?;
    let key: RequestKey = raw_key
        .parse()
        .map_err(|e| StorletError::validation(format!("descriptor: {e}")))?;

    let origin = request
        .metadata
        .into_iter()
        .next()
        .map(DescriptorMetadata::into_origin)
        .unwrap_or_default();
    let mut fds = request.fds.into_iter();
    match (fds.next(), fds.next()) {
        (Some(data), Some(metadata)) => Ok(Task::Descriptor {
            key,
            stream: ObjectOutputStream::new(data, metadata).with_origin(origin),
        }),
        _ => Err(StorletError::validation("descriptor requires 2 descriptors")),
    }
}
