// SPDX-License-Identifier: GPL-3.0

//! Type registry error types.

use crate::error::CodecError;
use thiserror::Error;

/// Errors that can occur when resolving type names or encoding/decoding dynamic values.
///
/// None of these are retried: they point at a metadata/version mismatch or a caller bug.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeRegistryError {
	/// The type name (or a struct field expected in the input) could not be resolved.
	#[error("Unresolved type: {0}")]
	UnresolvedType(String),
	/// The input mapping does not have the field count of the composite declaration.
	#[error("Unexpected fields for `{type_name}`: expected [{}], found {found} fields", .expected.join(", "))]
	UnexpectedStructFields {
		/// The composite type being encoded.
		type_name: String,
		/// The declared field names, in order.
		expected: Vec<String>,
		/// Number of fields present in the input.
		found: usize,
	},
	/// The input value has the wrong shape for the type.
	#[error("Unexpected value for `{type_name}`: expected {expected}")]
	UnexpectedValue {
		/// The type being encoded.
		type_name: String,
		/// Description of the accepted input shape.
		expected: &'static str,
	},
	/// The enum has no variant with the given name or index.
	#[error("Unknown variant `{variant}` for `{type_name}`")]
	UnknownVariant {
		/// The enum type.
		type_name: String,
		/// The variant name or index that was not found.
		variant: String,
	},
	/// The textual type name could not be parsed.
	#[error("Invalid type name: {0}")]
	InvalidTypeName(String),
	/// Alias resolution did not terminate.
	#[error("Type resolution recursion limit reached for `{0}`")]
	RecursionLimit(String),
	/// A type definition document could not be interpreted.
	#[error("Invalid type definition: {0}")]
	InvalidDefinition(String),
	/// Primitive codec failure.
	#[error(transparent)]
	Codec(#[from] CodecError),
}
