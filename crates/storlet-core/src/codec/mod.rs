//! Envelope Codec
//!
//! `RawEnvelope`（fd 配列 + JSON 文字列 2 つ）と `DecodedRequest` の相互変換。
//!
//! # 学習ポイント
//! - params JSON は serde の derive で受け、`command` 欠落は Option で拾って
//!   ProtocolError にする（serde の "missing field" より分かりやすいメッセージ）
//! - metadata は要素ごとにスキーマ判定が要るので `Value` で受けてから
//!   `DescriptorMetadata::from_json` に渡す
//! - デコードに失敗しても fd は `RawEnvelope` ごと drop されて close される

pub mod frame;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{
    CommandResponse, DecodedRequest, DescriptorMetadata, OutboundRequest, RawEnvelope,
    StorletError,
};

#[derive(Debug, Deserialize)]
struct WireParams {
    command: Option<String>,
    #[serde(default)]
    params: Option<HashMap<String, String>>,
    #[serde(default)]
    task_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireParamsOut<'a> {
    command: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_id: Option<&'a str>,
}

/// Decode a raw envelope into a typed request.
///
/// Fails with `StorletError::Protocol` on invalid JSON, a missing command,
/// or a metadata array whose length differs from the descriptor count.
pub fn decode(raw: RawEnvelope) -> Result<DecodedRequest, StorletError> {
    let RawEnvelope {
        fds,
        params,
        metadata,
    } = raw;

    let wire: WireParams = serde_json::from_str(&params)
        .map_err(|e| StorletError::protocol(format!("invalid params JSON: {e}")))?;
    let command = wire
        .command
        .filter(|c| !c.is_empty())
        .ok_or_else(|| StorletError::protocol("params JSON has no command"))?;

    let elements: Vec<Value> = serde_json::from_str(&metadata)
        .map_err(|e| StorletError::protocol(format!("invalid metadata JSON: {e}")))?;
    if elements.len() != fds.len() {
        return Err(StorletError::protocol(format!(
            "length mismatch: {} descriptors, {} metadata elements",
            fds.len(),
            elements.len()
        )));
    }

    let metadata = elements
        .iter()
        .enumerate()
        .map(|(slot, value)| DescriptorMetadata::from_json(slot, value))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DecodedRequest {
        command,
        params: wire.params.unwrap_or_default(),
        task_id: wire.task_id,
        fds,
        metadata,
    })
}

/// Build the wire envelope for a client-side request.
pub fn encode_request(request: OutboundRequest) -> Result<RawEnvelope, StorletError> {
    let params = serde_json::to_string(&WireParamsOut {
        command: request.command.as_str(),
        params: (!request.params.is_empty()).then_some(&request.params),
        task_id: request.task_id.as_deref(),
    })?;

    let (fds, metadata): (Vec<_>, Vec<_>) = request
        .descriptors
        .into_iter()
        .map(|(fd, md)| (fd, md.to_json()))
        .unzip();
    let metadata = serde_json::to_string(&Value::Array(metadata))?;

    Ok(RawEnvelope {
        fds,
        params,
        metadata,
    })
}

/// Raw bytes written to a service-out descriptor.
pub fn encode_response(response: &CommandResponse) -> Result<Vec<u8>, StorletError> {
    Ok(serde_json::to_vec(response)?)
}
