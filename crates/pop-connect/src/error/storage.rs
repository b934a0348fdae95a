// SPDX-License-Identifier: GPL-3.0

//! Storage request error types.

use crate::error::{ConnectionError, MetadataError, StorageKeyError, TypeRegistryError};
use thiserror::Error;

/// Errors surfaced to callers fetching or observing chain storage.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageRequestError {
	/// Transport or JSON-RPC failure.
	#[error("Connection error: {0}")]
	Connection(#[from] ConnectionError),
	/// The storage path or key parameters were rejected.
	#[error("Storage key error: {0}")]
	Key(#[from] StorageKeyError),
	/// The returned bytes could not be decoded against the declared type.
	#[error("Decoding error: {0}")]
	Decode(#[from] TypeRegistryError),
	/// The node returned something other than a hex-encoded storage value.
	#[error("Invalid storage response: {0}")]
	InvalidResponse(String),
	/// The runtime metadata reported by the node could not be used.
	#[error("Metadata error: {0}")]
	Metadata(#[from] MetadataError),
	/// No runtime metadata has been installed for the chain yet.
	#[error("Runtime metadata unavailable for chain {0}")]
	RuntimeUnavailable(String),
}

impl StorageRequestError {
	/// Whether the failure came from the transport, so a retry may succeed.
	pub fn is_transport(&self) -> bool {
		matches!(self, Self::Connection(_))
	}

	/// Whether the failure is a codec/metadata mismatch.
	pub fn is_codec(&self) -> bool {
		matches!(self, Self::Decode(_) | Self::InvalidResponse(_) | Self::Metadata(_))
	}

	/// Whether the request was rejected before reaching the network.
	pub fn is_key(&self) -> bool {
		matches!(self, Self::Key(_))
	}
}
