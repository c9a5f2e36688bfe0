//! Domain model (IDs, descriptor metadata, commands, envelopes, errors).
//!
//! トランスポートにも実行方式にも依存しない「形」だけを定義します。

pub mod command;
pub mod envelope;
pub mod errors;
pub mod fd_type;
pub mod ids;
pub mod metadata;
pub mod response;

pub use command::Command;
pub use envelope::{DecodedRequest, OutboundRequest, RawEnvelope};
pub use errors::{ErrorKind, StorletError, TransportError};
pub use fd_type::DescriptorType;
pub use ids::{RequestKey, TaskId};
pub use metadata::{DescriptorMetadata, MetadataSchema};
pub use response::CommandResponse;
