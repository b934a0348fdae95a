// SPDX-License-Identifier: GPL-3.0

//! Runtime metadata error types.

use crate::error::TypeRegistryError;
use thiserror::Error;

/// Errors that can occur when decoding the metadata a runtime reports.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MetadataError {
	/// The bytes do not start with the `meta` magic number.
	#[error("Metadata is missing the `meta` prefix")]
	MissingMagic,
	/// Only V14 and V15 layouts are understood.
	#[error("Unsupported metadata version: {0}")]
	UnsupportedVersion(u8),
	/// The metadata body could not be decoded.
	#[error("Failed to decode metadata: {0}")]
	DecodeError(String),
	/// A storage entry references types inconsistently.
	#[error("Invalid storage entry `{entry}`: {reason}")]
	InvalidEntry {
		/// The entry, as `Pallet.Item`.
		entry: String,
		/// What is wrong with it.
		reason: String,
	},
	/// The type table could not be imported.
	#[error(transparent)]
	Types(#[from] TypeRegistryError),
}
