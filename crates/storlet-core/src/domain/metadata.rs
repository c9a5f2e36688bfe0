//! DescriptorMetadata - ディスクリプタごとの二層メタデータ
//!
//! 各ディスクリプタには 2 種類のメタデータが付きます。
//! - **transport**: デーモン内部で消費される（`type`, `start`, `end`）。wire キーは `storlets`
//! - **origin**: オブジェクト本来のメタデータ。storlet にそのまま渡す。wire キーは `storage`
//!
//! # スキーマ
//! - Current: `{"storlets": {"type": ...}, "storage": {...}}`
//! - Legacy: `{"type": ..., "<k>": "<v>"}`（フラット、`type` などの内部キーは除去して origin へ）
//!
//! どちらの形かは受信時に判定し、仮定しません。

use std::collections::HashMap;

use serde_json::{Map, Value};

use super::errors::StorletError;
use super::fd_type::DescriptorType;

/// Wire key of the transport-intent sub-map.
pub const TRANSPORT_KEY: &str = "storlets";
/// Wire key of the origin-intent sub-map.
pub const ORIGIN_KEY: &str = "storage";

pub const TYPE_KEY: &str = "type";
pub const START_KEY: &str = "start";
pub const END_KEY: &str = "end";

/// Keys of a legacy flat map that belong to the transport tier.
const LEGACY_INTERNAL_KEYS: [&str; 3] = [TYPE_KEY, START_KEY, END_KEY];

/// Which wire shape a metadata element arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetadataSchema {
    #[default]
    Current,
    Legacy,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DescriptorMetadata {
    transport: HashMap<String, String>,
    origin: HashMap<String, String>,
    schema: MetadataSchema,
}

impl DescriptorMetadata {
    /// Current-schema metadata carrying only a type tag.
    pub fn new(fd_type: DescriptorType) -> Self {
        let mut transport = HashMap::new();
        transport.insert(TYPE_KEY.to_string(), fd_type.as_str().to_string());
        Self {
            transport,
            origin: HashMap::new(),
            schema: MetadataSchema::Current,
        }
    }

    /// Legacy flat-schema metadata.
    pub fn legacy(fd_type: DescriptorType, origin: HashMap<String, String>) -> Self {
        Self {
            schema: MetadataSchema::Legacy,
            ..Self::new(fd_type).with_origin(origin)
        }
    }

    pub fn with_origin(mut self, origin: HashMap<String, String>) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_range(mut self, start: u64, end: u64) -> Self {
        self.transport.insert(START_KEY.to_string(), start.to_string());
        self.transport.insert(END_KEY.to_string(), end.to_string());
        self
    }

    pub fn with_transport(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.transport.insert(key.into(), value.into());
        self
    }

    pub fn transport(&self) -> &HashMap<String, String> {
        &self.transport
    }

    pub fn origin(&self) -> &HashMap<String, String> {
        &self.origin
    }

    pub fn into_origin(self) -> HashMap<String, String> {
        self.origin
    }

    pub fn schema(&self) -> MetadataSchema {
        self.schema
    }

    /// Raw type tag, if present.
    pub fn type_tag(&self) -> Option<&str> {
        self.transport.get(TYPE_KEY).map(String::as_str)
    }

    /// Typed role of the descriptor at `slot`.
    ///
    /// A missing or unrecognized tag is a validation error for that slot.
    pub fn fd_type(&self, slot: usize) -> Result<DescriptorType, StorletError> {
        let tag = self.type_tag().ok_or_else(|| {
            StorletError::validation(format!("fd {slot} has no transport type"))
        })?;
        tag.parse().map_err(|_| {
            StorletError::validation(format!("fd {slot} is of unknown type {tag}"))
        })
    }

    /// `[start, end)` byte range when both bounds are present.
    pub fn range(&self, slot: usize) -> Result<Option<(u64, u64)>, StorletError> {
        let (Some(start), Some(end)) = (self.transport.get(START_KEY), self.transport.get(END_KEY))
        else {
            return Ok(None);
        };
        let parse = |name: &str, raw: &str| {
            raw.parse::<u64>().map_err(|_| {
                StorletError::validation(format!("fd {slot}: {name}={raw} is not an offset"))
            })
        };
        let (start, end) = (parse(START_KEY, start)?, parse(END_KEY, end)?);
        if start > end {
            return Err(StorletError::validation(format!(
                "fd {slot}: start={start} is past end={end}"
            )));
        }
        Ok(Some((start, end)))
    }

    /// Parse one element of the wire metadata array.
    pub fn from_json(slot: usize, value: &Value) -> Result<Self, StorletError> {
        let object = value.as_object().ok_or_else(|| {
            StorletError::protocol(format!("metadata element {slot} is not an object"))
        })?;

        let is_current = [TRANSPORT_KEY, ORIGIN_KEY]
            .iter()
            .any(|k| object.get(*k).is_some_and(Value::is_object));

        if is_current {
            let transport = match object.get(TRANSPORT_KEY) {
                Some(v) => string_map(slot, TRANSPORT_KEY, v)?,
                None => HashMap::new(),
            };
            let origin = match object.get(ORIGIN_KEY) {
                Some(v) => string_map(slot, ORIGIN_KEY, v)?,
                None => HashMap::new(),
            };
            return Ok(Self {
                transport,
                origin,
                schema: MetadataSchema::Current,
            });
        }

        let mut transport = HashMap::new();
        let mut origin = string_map(slot, "legacy", value)?;
        for key in LEGACY_INTERNAL_KEYS {
            if let Some(v) = origin.remove(key) {
                transport.insert(key.to_string(), v);
            }
        }
        Ok(Self {
            transport,
            origin,
            schema: MetadataSchema::Legacy,
        })
    }

    /// Serialize back into the schema this element uses.
    pub fn to_json(&self) -> Value {
        let to_object = |map: &HashMap<String, String>| -> Map<String, Value> {
            map.iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect()
        };
        match self.schema {
            MetadataSchema::Current => {
                let mut object = Map::new();
                object.insert(TRANSPORT_KEY.into(), Value::Object(to_object(&self.transport)));
                object.insert(ORIGIN_KEY.into(), Value::Object(to_object(&self.origin)));
                Value::Object(object)
            }
            MetadataSchema::Legacy => {
                let mut object = to_object(&self.origin);
                object.extend(to_object(&self.transport));
                Value::Object(object)
            }
        }
    }
}

fn string_map(slot: usize, section: &str, value: &Value) -> Result<HashMap<String, String>, StorletError> {
    let object = value.as_object().ok_or_else(|| {
        StorletError::protocol(format!("metadata element {slot}: '{section}' is not an object"))
    })?;
    object
        .iter()
        .map(|(k, v)| match v {
            Value::String(s) => Ok((k.clone(), s.clone())),
            other => Err(StorletError::protocol(format!(
                "metadata element {slot}: value of '{k}' must be a string, got {other}"
            ))),
        })
        .collect()
}
