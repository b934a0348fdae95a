// SPDX-License-Identifier: GPL-3.0

//! JSON-RPC 2.0 framing.
//!
//! Outbound frames are requests carrying a transport-local numeric id. Inbound frames are
//! either responses, correlated by that id, or subscription notifications, correlated by the
//! server-assigned subscription id found in `params.subscription`.

use crate::{error::ConnectionError, strings::rpc::fields};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Server-assigned subscription identifier.
///
/// Nodes use strings (Substrate) or numbers; both are kept in their textual form.
pub type RemoteId = String;

#[derive(Serialize)]
struct RequestFrame<'a> {
	jsonrpc: &'static str,
	id: u16,
	method: &'a str,
	params: &'a Value,
}

/// Serialize a request frame.
pub fn request_frame(id: u16, method: &str, params: &Value) -> String {
	let frame = RequestFrame { jsonrpc: fields::JSONRPC_VERSION, id, method, params };
	// Serializing a struct of strings and a `Value` cannot fail.
	serde_json::to_string(&frame).unwrap_or_default()
}

/// A parsed inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
	/// Response to a request. Ids that do not fit a request id are kept so they can be logged.
	Response {
		id: Option<u64>,
		result: Result<Value, ConnectionError>,
	},
	/// Subscription notification.
	Notification {
		method: String,
		subscription: RemoteId,
		result: Value,
	},
}

#[derive(Deserialize)]
struct RawFrame {
	#[serde(default)]
	id: Option<Value>,
	#[serde(default)]
	method: Option<String>,
	#[serde(default)]
	params: Option<Value>,
	#[serde(default)]
	result: Option<Value>,
	#[serde(default)]
	error: Option<RawError>,
}

#[derive(Deserialize)]
struct RawError {
	code: i64,
	message: String,
}

/// Parse an inbound text frame.
pub fn parse_frame(text: &str) -> Result<InboundFrame, ConnectionError> {
	let raw: RawFrame =
		serde_json::from_str(text).map_err(|e| ConnectionError::MalformedFrame(e.to_string()))?;

	if let (Some(method), Some(Value::Object(mut params))) = (raw.method, raw.params) {
		let subscription = params
			.remove(fields::SUBSCRIPTION)
			.and_then(|id| remote_id(&id))
			.ok_or_else(|| ConnectionError::MalformedFrame(format!("{method}: missing subscription id")))?;
		let result = params.remove(fields::RESULT).unwrap_or(Value::Null);
		return Ok(InboundFrame::Notification { method, subscription, result });
	}

	let Some(id) = raw.id else {
		return Err(ConnectionError::MalformedFrame("frame has neither id nor subscription".into()));
	};
	let result = match (raw.error, raw.result) {
		(Some(error), _) => Err(ConnectionError::Rpc { code: error.code, message: error.message }),
		(None, result) => Ok(result.unwrap_or(Value::Null)),
	};
	Ok(InboundFrame::Response { id: id.as_u64(), result })
}

/// Textual form of a subscription id as returned by a subscribe call.
pub fn remote_id(value: &Value) -> Option<RemoteId> {
	match value {
		Value::String(id) => Some(id.clone()),
		Value::Number(id) => Some(id.to_string()),
		_ => None,
	}
}
