// SPDX-License-Identifier: GPL-3.0

//! Connection error types.

use thiserror::Error;

/// Errors that can occur on a chain connection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
	/// Failed to open the transport to an endpoint.
	#[error("Failed to connect to {endpoint}: {message}")]
	ConnectionFailed {
		/// The endpoint URL that failed to connect.
		endpoint: String,
		/// The error message describing the failure.
		message: String,
	},
	/// The transport dropped while the request or subscription was in flight.
	#[error("Connection dropped: {0}")]
	Dropped(String),
	/// An inbound frame could not be parsed.
	#[error("Malformed frame: {0}")]
	MalformedFrame(String),
	/// The node answered with a JSON-RPC error object.
	#[error("RPC error {code}: {message}")]
	Rpc {
		/// JSON-RPC error code.
		code: i64,
		/// JSON-RPC error message.
		message: String,
	},
	/// No response arrived within the caller-provided timeout.
	#[error("RPC request `{method}` timed out")]
	Timeout {
		/// The method that timed out.
		method: String,
	},
	/// The connection was closed explicitly.
	#[error("Connection closed")]
	Closed,
	/// Every 16-bit request id is in use.
	#[error("No free request identifiers")]
	RequestIdsExhausted,
	/// The endpoint has no candidate URLs.
	#[error("No endpoints configured for chain {0}")]
	NoEndpoints(String),
}
