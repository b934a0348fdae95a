// SPDX-License-Identifier: GPL-3.0

//! Typed storage access.
//!
//! [`StorageRequestPerformer`] is the entry point callers use to read chain state. It ties the
//! pieces together:
//!
//! ```text
//! path + params ──► build_storage_key ──► Connection ──► hex bytes ──► TypeRegistry ──► Value
//!                    (RuntimeMetadata)    (JSON-RPC)                   (value type)
//! ```
//!
//! Key errors are reported before anything is sent. A performer works against one snapshot of
//! the chain's runtime metadata; a runtime upgrade does not affect performers already handed out.

use crate::{
	config::AddressFormat,
	connection::{Connection, SubscriptionRequest, SubscriptionStream},
	error::StorageRequestError,
	metadata::{RuntimeMetadata, StorageEntry, StorageModifier, StoragePath},
	registry::TypeRegistry,
	storage_key::{KeyParam, StorageKey, build_storage_key},
	strings::rpc::{methods, targets},
};
use futures::{Stream, StreamExt, ready};
use log::{debug, trace};
use serde::Deserialize;
use serde_json::{Value, json};
use std::{
	collections::HashMap,
	pin::Pin,
	sync::Arc,
	task::{Context, Poll},
};

/// One set of storage changes as returned by `state_queryStorageAt` and pushed by
/// `state_subscribeStorage`.
#[derive(Debug, Deserialize)]
struct StorageChangeSet {
	changes: Vec<(String, Option<String>)>,
}

impl StorageChangeSet {
	/// The value reported for `key`, if the set mentions it.
	fn value_of(&self, key: &str) -> Option<Option<&str>> {
		self.changes
			.iter()
			.find(|(changed, _)| changed.eq_ignore_ascii_case(key))
			.map(|(_, value)| value.as_deref())
	}
}

/// Fetches and observes storage values of one chain.
#[derive(Debug, Clone)]
pub struct StorageRequestPerformer {
	connection: Connection,
	metadata: Arc<RuntimeMetadata>,
	address_format: AddressFormat,
}

impl StorageRequestPerformer {
	/// Create a performer over `connection`, using the connection's address format.
	pub fn new(connection: Connection, metadata: Arc<RuntimeMetadata>) -> Self {
		let address_format = connection.endpoint().address_format;
		Self { connection, metadata, address_format }
	}

	/// The runtime metadata snapshot this performer decodes with.
	pub fn metadata(&self) -> &Arc<RuntimeMetadata> {
		&self.metadata
	}

	/// Build the storage key for `path`.
	pub fn storage_key(
		&self,
		path: &StoragePath,
		params: &[KeyParam],
	) -> Result<StorageKey, StorageRequestError> {
		Ok(build_storage_key(&self.metadata, path, params, &self.address_format)?)
	}

	/// Fetch the current value at `path`.
	///
	/// Absent values decode as the entry's default, or `null` for optional entries.
	pub async fn fetch_once(
		&self,
		path: &StoragePath,
		params: &[KeyParam],
	) -> Result<Value, StorageRequestError> {
		let entry = self.metadata.entry(path)?;
		let key = self.storage_key(path, params)?;
		debug!(target: targets::STORAGE, "fetching {path} at {key:?}");
		let response =
			self.connection.request(methods::STATE_GET_STORAGE, json!([key.to_hex()])).await?;
		match response {
			Value::Null => decode_entry(self.metadata.types(), entry, None),
			Value::String(hex) => decode_entry(self.metadata.types(), entry, Some(&hex)),
			other => Err(StorageRequestError::InvalidResponse(other.to_string())),
		}
	}

	/// Fetch several values in one request. Results are in the order of `requests`.
	pub async fn fetch_many(
		&self,
		requests: &[(StoragePath, Vec<KeyParam>)],
	) -> Result<Vec<Value>, StorageRequestError> {
		let mut wanted = Vec::with_capacity(requests.len());
		for (path, params) in requests {
			let entry = self.metadata.entry(path)?;
			let key = self.storage_key(path, params)?;
			wanted.push((entry, key.to_hex()));
		}
		if wanted.is_empty() {
			return Ok(Vec::new());
		}
		let keys: Vec<&str> = wanted.iter().map(|(_, key)| key.as_str()).collect();
		let response =
			self.connection.request(methods::STATE_QUERY_STORAGE_AT, json!([keys])).await?;
		let change_sets: Vec<StorageChangeSet> = serde_json::from_value(response)
			.map_err(|e| StorageRequestError::InvalidResponse(e.to_string()))?;

		// Keys the node omits have no value.
		let mut values: HashMap<String, Option<&str>> = HashMap::new();
		for change_set in &change_sets {
			for (key, value) in &change_set.changes {
				values.insert(key.to_ascii_lowercase(), value.as_deref());
			}
		}
		wanted
			.iter()
			.map(|(entry, key)| {
				let value = values.get(&key.to_ascii_lowercase()).copied().flatten();
				decode_entry(self.metadata.types(), entry, value)
			})
			.collect()
	}

	/// Fetch the value at a caller-built key and decode it as `value_type`.
	///
	/// Absent values are `null`.
	pub async fn fetch_raw(
		&self,
		key: &StorageKey,
		value_type: &str,
	) -> Result<Value, StorageRequestError> {
		let response =
			self.connection.request(methods::STATE_GET_STORAGE, json!([key.to_hex()])).await?;
		match response {
			Value::Null => Ok(Value::Null),
			Value::String(hex) => Ok(self.metadata.types().decode_bytes(value_type, &from_hex(&hex)?)?),
			other => Err(StorageRequestError::InvalidResponse(other.to_string())),
		}
	}

	/// Observe the value at `path`.
	///
	/// Every call opens its own subscription, which is resent after reconnects. The stream
	/// yields the decoded value on every change, starting with the current value, until it is
	/// dropped.
	pub fn observe(
		&self,
		path: &StoragePath,
		params: &[KeyParam],
	) -> Result<StorageSubscription, StorageRequestError> {
		let entry = self.metadata.entry(path)?.clone();
		let key = self.storage_key(path, params)?.to_hex();
		debug!(target: targets::STORAGE, "observing {path} at {key}");
		let updates = self.connection.subscribe_stream(SubscriptionRequest::new(
			methods::STATE_SUBSCRIBE_STORAGE,
			json!([[key]]),
			methods::STATE_UNSUBSCRIBE_STORAGE,
		));
		Ok(StorageSubscription { updates, metadata: self.metadata.clone(), entry, key })
	}
}

/// Decoded updates of one observed storage value. Dropping it cancels the subscription.
#[derive(Debug)]
pub struct StorageSubscription {
	updates: SubscriptionStream,
	metadata: Arc<RuntimeMetadata>,
	entry: StorageEntry,
	key: String,
}

impl StorageSubscription {
	/// The observed key, hex-encoded.
	pub fn key(&self) -> &str {
		&self.key
	}

	fn decode_update(&self, update: Value) -> Option<Result<Value, StorageRequestError>> {
		let change_set: StorageChangeSet = match serde_json::from_value(update) {
			Ok(change_set) => change_set,
			Err(e) => return Some(Err(StorageRequestError::InvalidResponse(e.to_string()))),
		};
		let Some(value) = change_set.value_of(&self.key) else {
			trace!(target: targets::STORAGE, "change set without {}", self.key);
			return None;
		};
		Some(decode_entry(self.metadata.types(), &self.entry, value))
	}
}

impl Stream for StorageSubscription {
	type Item = Result<Value, StorageRequestError>;

	fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		let this = self.get_mut();
		loop {
			match ready!(this.updates.poll_next_unpin(cx)) {
				None => return Poll::Ready(None),
				Some(Err(e)) => return Poll::Ready(Some(Err(e.into()))),
				Some(Ok(update)) =>
					if let Some(item) = this.decode_update(update) {
						return Poll::Ready(Some(item));
					},
			}
		}
	}
}

pub(crate) fn from_hex(text: &str) -> Result<Vec<u8>, StorageRequestError> {
	hex::decode(text.trim_start_matches("0x"))
		.map_err(|e| StorageRequestError::InvalidResponse(format!("{text}: {e}")))
}

/// Decode a storage response for `entry`. `None` means the key holds no value.
fn decode_entry(
	types: &TypeRegistry,
	entry: &StorageEntry,
	value: Option<&str>,
) -> Result<Value, StorageRequestError> {
	match value {
		Some(hex) => Ok(types.decode_bytes(&entry.value_type, &from_hex(hex)?)?),
		None => match entry.modifier {
			StorageModifier::Default if !entry.default.is_empty() =>
				Ok(types.decode_bytes(&entry.value_type, &entry.default)?),
			_ => Ok(Value::Null),
		},
	}
}
