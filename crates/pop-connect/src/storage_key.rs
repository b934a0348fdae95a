// SPDX-License-Identifier: GPL-3.0

//! Storage key construction.
//!
//! A storage key is `twox128(pallet) ++ twox128(item)` followed by one hashed segment per key
//! component:
//!
//! ```text
//! ┌──────────────────┬──────────────────┬───────────────────┬─────┬───────────────────┐
//! │ twox128(pallet)  │ twox128(item)    │ hasher1(encode k1)│ ... │ hasherN(encode kN)│
//! └──────────────────┴──────────────────┴───────────────────┴─────┴───────────────────┘
//! ```
//!
//! Every component is encoded and hashed on its own. Hashing the concatenation of the encoded
//! components produces a well-formed key that matches nothing on chain.

use crate::{
	account::decode_address,
	config::AddressFormat,
	error::StorageKeyError,
	metadata::{RuntimeMetadata, StorageKeyPart, StoragePath},
	registry::TypeRegistry,
};
use serde_json::Value;
use std::fmt;

/// A key parameter supplied by a caller.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyParam {
	/// Already SCALE-encoded bytes, used as is.
	Encoded(Vec<u8>),
	/// A value encoded against the key component's declared type.
	Value(Value),
	/// An account address in the chain's address format.
	Address(String),
}

impl From<Value> for KeyParam {
	fn from(value: Value) -> Self {
		KeyParam::Value(value)
	}
}

impl From<Vec<u8>> for KeyParam {
	fn from(bytes: Vec<u8>) -> Self {
		KeyParam::Encoded(bytes)
	}
}

/// Final storage key bytes.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(Vec<u8>);

impl StorageKey {
	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}

	/// `0x`-prefixed hex, as used in JSON-RPC parameters.
	pub fn to_hex(&self) -> String {
		format!("0x{}", hex::encode(&self.0))
	}

	pub fn into_inner(self) -> Vec<u8> {
		self.0
	}
}

impl From<Vec<u8>> for StorageKey {
	fn from(bytes: Vec<u8>) -> Self {
		Self(bytes)
	}
}

impl fmt::Debug for StorageKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "StorageKey({})", self.to_hex())
	}
}

/// The `twox128(pallet) ++ twox128(item)` prefix shared by every key of a storage item.
pub fn storage_prefix(pallet: &str, item: &str) -> Vec<u8> {
	let mut prefix = Vec::with_capacity(32);
	prefix.extend(sp_core::twox_128(pallet.as_bytes()));
	prefix.extend(sp_core::twox_128(item.as_bytes()));
	prefix
}

/// Build the storage key for `path` with the given key parameters.
///
/// Fails before any network I/O when the path is unknown, the number of parameters does not
/// match the entry's key arity, or a parameter cannot be encoded.
pub fn build_storage_key(
	metadata: &RuntimeMetadata,
	path: &StoragePath,
	params: &[KeyParam],
	address_format: &AddressFormat,
) -> Result<StorageKey, StorageKeyError> {
	let entry = metadata.entry(path)?;
	let parts = entry.kind.key_parts();
	if parts.len() != params.len() {
		return Err(StorageKeyError::KeyArityMismatch {
			path: path.to_string(),
			expected: parts.len(),
			found: params.len(),
		});
	}
	let mut key = storage_prefix(&entry.pallet, &entry.item);
	for (part, param) in parts.iter().zip(params) {
		let encoded = encode_param(metadata.types(), part, param, address_format)?;
		key.extend(part.hasher.hash(&encoded));
	}
	Ok(StorageKey(key))
}

fn encode_param(
	types: &TypeRegistry,
	part: &StorageKeyPart,
	param: &KeyParam,
	address_format: &AddressFormat,
) -> Result<Vec<u8>, StorageKeyError> {
	match param {
		KeyParam::Encoded(bytes) => Ok(bytes.clone()),
		KeyParam::Value(value) => Ok(types.encode_to_vec(&part.type_name, value)?),
		KeyParam::Address(address) => decode_address(address, address_format),
	}
}
