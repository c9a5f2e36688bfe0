//! StreamBuilder - fd 配列から型付きストリームを組み立てる
//!
//! 左から 1 回だけ走査し、`transport.type` で振り分けます。
//! `output-object` だけは自分と「直後のスロット（メタデータ fd）」の 2 つを消費します。
//!
//! | type                    | 結果                                   |
//! |-------------------------|----------------------------------------|
//! | input-object            | InputStream（start/end があれば範囲付き）|
//! | output-object (+meta)   | StorletOutput::Object                  |
//! | output-container        | StorletOutput::Container               |
//! | logger                  | StorletLogger                          |
//! | output-task-id          | TaskIdSink                             |
//! | service-out             | ControlChannel                         |
//!
//! ペアの不一致は「ログして続行」ではなく、スロット番号付きの
//! ValidationError でその Execute だけを中止します。
//! ここではバイトの読み書きは一切しません。

use std::iter::Peekable;
use std::os::fd::OwnedFd;
use std::sync::Arc;

use crate::domain::{DescriptorMetadata, DescriptorType, StorletError};
use crate::ports::IdGenerator;

use super::container::{CONTAINER_NAME_KEY, ContainerHandle};
use super::control::{ControlChannel, TaskIdSink};
use super::input::InputStream;
use super::logger::StorletLogger;
use super::output::ObjectOutputStream;
use super::request_table::ObjectRequestTable;
use super::StorletOutput;

/// Everything one Execute owns.
#[derive(Debug, Default)]
pub struct ExecutionResources {
    pub inputs: Vec<InputStream>,
    pub outputs: Vec<StorletOutput>,
    pub logger: Option<StorletLogger>,
    pub service_out: Option<ControlChannel>,
    pub task_id_out: Option<TaskIdSink>,
}

pub struct StreamBuilder {
    table: Arc<ObjectRequestTable>,
    ids: Arc<dyn IdGenerator>,
}

type Slots = Peekable<std::iter::Enumerate<std::iter::Zip<std::vec::IntoIter<OwnedFd>, std::vec::IntoIter<DescriptorMetadata>>>>;

impl StreamBuilder {
    pub fn new(table: Arc<ObjectRequestTable>, ids: Arc<dyn IdGenerator>) -> Self {
        Self { table, ids }
    }

    pub fn build(
        &self,
        fds: Vec<OwnedFd>,
        metadata: Vec<DescriptorMetadata>,
    ) -> Result<ExecutionResources, StorletError> {
        if fds.len() != metadata.len() {
            return Err(StorletError::protocol(format!(
                "length mismatch: {} descriptors, {} metadata elements",
                fds.len(),
                metadata.len()
            )));
        }

        let mut resources = ExecutionResources::default();
        let mut slots: Slots = fds.into_iter().zip(metadata).enumerate().peekable();

        while let Some((slot, (fd, md))) = slots.next() {
            match md.fd_type(slot)? {
                DescriptorType::InputObject => {
                    let stream = match md.range(slot)? {
                        Some((start, end)) => {
                            InputStream::ranged(fd, md.into_origin(), start, end).map_err(
                                |e| StorletError::validation(format!("fd {slot}: {e}")),
                            )?
                        }
                        None => InputStream::new(fd, md.into_origin()),
                    };
                    resources.inputs.push(stream);
                }
                DescriptorType::OutputObject => {
                    let metadata_fd = take_metadata_pair(&mut slots, slot)?;
                    let stream =
                        ObjectOutputStream::new(fd, metadata_fd).with_origin(md.into_origin());
                    resources.outputs.push(StorletOutput::Object(stream));
                }
                DescriptorType::OutputObjectMetadata => {
                    return Err(StorletError::validation(format!(
                        "fd {slot} is output object metadata without a preceding output object"
                    )));
                }
                DescriptorType::OutputContainer => {
                    let name = md.origin().get(CONTAINER_NAME_KEY).cloned().ok_or_else(|| {
                        StorletError::validation(format!(
                            "fd {slot}: container handle requires {CONTAINER_NAME_KEY}"
                        ))
                    })?;
                    resources.outputs.push(StorletOutput::Container(ContainerHandle::new(
                        fd,
                        name,
                        Arc::clone(&self.table),
                        Arc::clone(&self.ids),
                    )));
                }
                DescriptorType::Logger => {
                    set_once(&mut resources.logger, StorletLogger::new(fd), slot, "logger")?;
                }
                DescriptorType::OutputTaskId => {
                    set_once(&mut resources.task_id_out, TaskIdSink::new(fd), slot, "task id")?;
                }
                DescriptorType::ServiceOut => {
                    set_once(
                        &mut resources.service_out,
                        ControlChannel::new(fd),
                        slot,
                        "service out",
                    )?;
                }
            }
        }

        Ok(resources)
    }
}

fn take_metadata_pair(slots: &mut Slots, slot: usize) -> Result<OwnedFd, StorletError> {
    let pairs = slots
        .peek()
        .is_some_and(|(next, (_, md))| {
            md.fd_type(*next).ok() == Some(DescriptorType::OutputObjectMetadata)
        });
    match slots.next() {
        Some((_, (metadata_fd, _))) if pairs => Ok(metadata_fd),
        _ => Err(StorletError::validation(format!(
            "fd {slot} is an output object but fd {} is not its metadata",
            slot + 1
        ))),
    }
}

fn set_once<T>(
    target: &mut Option<T>,
    value: T,
    slot: usize,
    what: &str,
) -> Result<(), StorletError> {
    if target.is_some() {
        return Err(StorletError::validation(format!(
            "fd {slot} is a second {what} descriptor"
        )));
    }
    *target = Some(value);
    Ok(())
}
