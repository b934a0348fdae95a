// SPDX-License-Identifier: GPL-3.0

//! Storage key error types.

use crate::error::TypeRegistryError;
use thiserror::Error;

/// Errors raised while building a storage key.
///
/// These are detected before any request reaches the network.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageKeyError {
	/// The runtime metadata has no entry for the storage path.
	#[error("Unknown storage path: {0}")]
	UnknownStoragePath(String),
	/// The storage path is not of the form `pallet.item`.
	#[error("Invalid storage path: {0}")]
	InvalidStoragePath(String),
	/// The number of key parameters does not match the entry's key arity.
	#[error("Storage `{path}` expects {expected} key parameters, got {found}")]
	KeyArityMismatch {
		/// The storage path.
		path: String,
		/// Declared key arity.
		expected: usize,
		/// Number of parameters supplied.
		found: usize,
	},
	/// An account address could not be parsed for the chain's address format.
	#[error("Invalid address: {0}")]
	InvalidAddress(String),
	/// A key parameter could not be encoded.
	#[error(transparent)]
	Type(#[from] TypeRegistryError),
}
