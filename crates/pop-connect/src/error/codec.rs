// SPDX-License-Identifier: GPL-3.0

//! Binary codec error types.

use thiserror::Error;

/// Errors raised while reading SCALE-encoded bytes.
///
/// Encoding is append-only and never fails, so every variant here originates from decoding.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
	/// Fewer bytes remain than the primitive requires.
	#[error("Out of bounds read: requested {requested} bytes, {remaining} remaining")]
	OutOfBounds {
		/// Number of bytes the primitive needed.
		requested: usize,
		/// Number of bytes left in the input.
		remaining: usize,
	},
	/// A boolean byte other than `0x00` or `0x01`.
	#[error("Invalid boolean byte: {0:#04x}")]
	InvalidBool(u8),
	/// An option tag other than `0x00` or `0x01` (or `0x02` for `Option<bool>`).
	#[error("Invalid option tag: {0:#04x}")]
	InvalidOptionTag(u8),
	/// A compact integer that is non-canonical or too large.
	#[error("Invalid compact integer: {0}")]
	InvalidCompact(String),
	/// A sequence of zero-sized elements claims more elements than are accepted.
	#[error("Too many elements: {len} zero-sized elements exceed the limit of {max}")]
	TooManyElements {
		/// The claimed length.
		len: usize,
		/// The accepted maximum.
		max: usize,
	},
	/// A string that is not valid UTF-8.
	#[error("Invalid UTF-8 string")]
	InvalidUtf8,
}
