// SPDX-License-Identifier: GPL-3.0

//! Runtime metadata: the storage layout and type registry of one runtime version.

use crate::{
	error::{MetadataError, StorageKeyError},
	registry::TypeRegistry,
};
use scale::{Decode, Encode};
use serde::{Deserialize, Deserializer, de::Error as _};
use std::{collections::HashMap, fmt, str::FromStr};

pub mod frame;

/// Hash function applied to a storage key component.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Encode, Decode)]
pub enum StorageHasher {
	Blake2_128,
	Blake2_256,
	Blake2_128Concat,
	Twox128,
	Twox256,
	Twox64Concat,
	Identity,
}

impl StorageHasher {
	/// Hash an encoded key component.
	///
	/// The `Concat` hashers append the input to the hash so the key can be recovered.
	pub fn hash(&self, data: &[u8]) -> Vec<u8> {
		match self {
			StorageHasher::Blake2_128 => sp_core::blake2_128(data).to_vec(),
			StorageHasher::Blake2_256 => sp_core::blake2_256(data).to_vec(),
			StorageHasher::Blake2_128Concat => [&sp_core::blake2_128(data)[..], data].concat(),
			StorageHasher::Twox128 => sp_core::twox_128(data).to_vec(),
			StorageHasher::Twox256 => sp_core::twox_256(data).to_vec(),
			StorageHasher::Twox64Concat => [&sp_core::twox_64(data)[..], data].concat(),
			StorageHasher::Identity => data.to_vec(),
		}
	}
}

/// One hashed component of a storage key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageKeyPart {
	/// Hasher applied to the encoded component.
	pub hasher: StorageHasher,
	/// Type name the component is encoded as.
	#[serde(rename = "key")]
	pub type_name: String,
}

impl StorageKeyPart {
	pub fn new(hasher: StorageHasher, type_name: impl Into<String>) -> Self {
		Self { hasher, type_name: type_name.into() }
	}
}

/// Key shape of a storage entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StorageEntryKind {
	/// A single value, no key.
	Plain,
	/// One hashed key.
	Map(StorageKeyPart),
	/// Two independently hashed keys.
	DoubleMap([StorageKeyPart; 2]),
	/// Any number of independently hashed keys.
	NMap(Vec<StorageKeyPart>),
}

impl StorageEntryKind {
	/// The key components in order.
	pub fn key_parts(&self) -> &[StorageKeyPart] {
		match self {
			StorageEntryKind::Plain => &[],
			StorageEntryKind::Map(part) => std::slice::from_ref(part),
			StorageEntryKind::DoubleMap(parts) => &parts[..],
			StorageEntryKind::NMap(parts) => parts.as_slice(),
		}
	}
}

/// What an absent storage value means.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Encode, Decode)]
pub enum StorageModifier {
	/// Absent values decode as `null`.
	#[default]
	Optional,
	/// Absent values decode as the entry's default bytes.
	Default,
}

/// A storage item declared by a pallet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageEntry {
	/// Pallet name as used for hashing, e.g. `Balances`.
	pub pallet: String,
	/// Item name as used for hashing, e.g. `FreeBalance`.
	pub item: String,
	/// Key shape.
	pub kind: StorageEntryKind,
	/// Type name of the stored value.
	#[serde(rename = "value")]
	pub value_type: String,
	#[serde(default)]
	pub modifier: StorageModifier,
	/// Encoded default value.
	#[serde(default, deserialize_with = "hex_bytes")]
	pub default: Vec<u8>,
}

impl StorageEntry {
	/// A plain entry holding a value of `value_type`.
	pub fn plain(pallet: &str, item: &str, value_type: &str) -> Self {
		Self {
			pallet: pallet.to_string(),
			item: item.to_string(),
			kind: StorageEntryKind::Plain,
			value_type: value_type.to_string(),
			modifier: StorageModifier::Optional,
			default: Vec::new(),
		}
	}

	/// Set the key shape.
	pub fn with_kind(mut self, kind: StorageEntryKind) -> Self {
		self.kind = kind;
		self
	}

	/// Decode absent values as `default`.
	pub fn with_default(mut self, default: Vec<u8>) -> Self {
		self.modifier = StorageModifier::Default;
		self.default = default;
		self
	}

	/// The path identifying this entry.
	pub fn path(&self) -> StoragePath {
		StoragePath { pallet: self.pallet.clone(), item: self.item.clone() }
	}
}

fn hex_bytes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
	let text = String::deserialize(deserializer)?;
	hex::decode(text.trim_start_matches("0x")).map_err(D::Error::custom)
}

/// A `(pallet, item)` pair written as `pallet.item`, e.g. `balances.freeBalance`.
///
/// Paths match storage entries case-insensitively; the entry's own spelling is used for hashing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoragePath {
	pub pallet: String,
	pub item: String,
}

impl StoragePath {
	pub fn new(pallet: impl Into<String>, item: impl Into<String>) -> Self {
		Self { pallet: pallet.into(), item: item.into() }
	}

	fn lookup_key(&self) -> String {
		format!("{}.{}", self.pallet.to_lowercase(), self.item.to_lowercase())
	}
}

impl FromStr for StoragePath {
	type Err = StorageKeyError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let mut parts = s.split('.');
		match (parts.next(), parts.next(), parts.next()) {
			(Some(pallet), Some(item), None) if !pallet.is_empty() && !item.is_empty() =>
				Ok(Self::new(pallet, item)),
			_ => Err(StorageKeyError::InvalidStoragePath(s.to_string())),
		}
	}
}

impl fmt::Display for StoragePath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{}", self.pallet, self.item)
	}
}

/// Storage layout and types of one runtime version.
///
/// Immutable once built. A runtime upgrade produces a new instance, see
/// [`crate::ChainRegistry::update_runtime`].
#[derive(Debug, Clone)]
pub struct RuntimeMetadata {
	spec_version: u32,
	types: TypeRegistry,
	entries: HashMap<String, StorageEntry>,
}

impl RuntimeMetadata {
	pub fn new(spec_version: u32, types: TypeRegistry) -> Self {
		Self { spec_version, types, entries: HashMap::new() }
	}

	/// Add a storage entry, replacing any entry with the same path.
	pub fn with_entry(mut self, entry: StorageEntry) -> Self {
		self.entries.insert(entry.path().lookup_key(), entry);
		self
	}

	/// Decode the metadata blob a node returns from `state_getMetadata`.
	///
	/// V14 and V15 layouts are understood. Every portable type is registered under its lookup
	/// name (see [`TypeRegistry`]) and every pallet's storage entries are added, keyed by the
	/// pallet's storage prefix.
	pub fn from_bytes(spec_version: u32, bytes: &[u8]) -> Result<Self, MetadataError> {
		let (types, pallets) = frame::decode(bytes)?;
		let registry = TypeRegistry::builder().portable(&types)?.build();
		let mut metadata = Self::new(spec_version, registry);
		for entry in frame::storage_entries(&types, pallets)? {
			metadata = metadata.with_entry(entry);
		}
		Ok(metadata)
	}

	/// Add every entry of a JSON storage table (an array of entries).
	pub fn with_storage_table(mut self, table: &str) -> Result<Self, serde_json::Error> {
		let entries: Vec<StorageEntry> = serde_json::from_str(table)?;
		for entry in entries {
			self = self.with_entry(entry);
		}
		Ok(self)
	}

	/// Runtime spec version this metadata describes.
	pub fn spec_version(&self) -> u32 {
		self.spec_version
	}

	pub fn types(&self) -> &TypeRegistry {
		&self.types
	}

	/// All storage entries, in no particular order.
	pub fn entries(&self) -> impl Iterator<Item = &StorageEntry> {
		self.entries.values()
	}

	/// Look up a storage entry.
	pub fn entry(&self, path: &StoragePath) -> Result<&StorageEntry, StorageKeyError> {
		self.entries
			.get(&path.lookup_key())
			.ok_or_else(|| StorageKeyError::UnknownStoragePath(path.to_string()))
	}
}
