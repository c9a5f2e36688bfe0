//! Stream objects handed to a storlet, and the builder that makes them.
//!
//! すべてのストリームは 1 回の Execute で作られ、その実行ユニットだけが所有します。
//! close はどれも冪等です。

pub mod builder;
pub mod container;
pub mod control;
pub mod input;
pub mod logger;
pub mod output;
pub mod request_table;

pub use builder::{ExecutionResources, StreamBuilder};
pub use container::ContainerHandle;
pub use control::{ControlChannel, TaskIdSink};
pub use input::InputStream;
pub use logger::StorletLogger;
pub use output::ObjectOutputStream;
pub use request_table::{ObjectRequestTable, PendingObjectRequest};

use crate::domain::StorletError;

/// One entry of a storlet's output list.
#[derive(Debug)]
pub enum StorletOutput {
    Object(ObjectOutputStream),
    Container(ContainerHandle),
}

impl StorletOutput {
    pub fn object_mut(&mut self) -> Result<&mut ObjectOutputStream, StorletError> {
        match self {
            StorletOutput::Object(stream) => Ok(stream),
            StorletOutput::Container(_) => {
                Err(StorletError::user("output is a container handle, not an object"))
            }
        }
    }

    pub fn container_mut(&mut self) -> Result<&mut ContainerHandle, StorletError> {
        match self {
            StorletOutput::Container(handle) => Ok(handle),
            StorletOutput::Object(_) => {
                Err(StorletError::user("output is an object, not a container handle"))
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            StorletOutput::Object(stream) => stream.is_closed(),
            StorletOutput::Container(handle) => handle.is_closed(),
        }
    }

    /// Idempotent.
    pub async fn close(&mut self) {
        match self {
            StorletOutput::Object(stream) => {
                if let Err(e) = stream.close().await {
                    tracing::warn!(error = %e, "failed to flush output object");
                }
            }
            StorletOutput::Container(handle) => handle.close().await,
        }
    }
}
