// SPDX-License-Identifier: GPL-3.0

//! Primitive read/write of the SCALE wire format.
//!
//! [`ScaleEncoder`] appends little-endian primitives to a growing buffer and never fails.
//! [`ScaleDecoder`] reads from a borrowed slice and reports [`CodecError::OutOfBounds`] instead
//! of reading past its end. Higher-level decoders can look ahead with [`ScaleDecoder::peek`] and
//! then commit with [`ScaleDecoder::confirm`], so nothing is consumed twice.

use crate::error::CodecError;
use scale::{Compact, Decode, Encode};

/// Largest compact integer payload supported (a `u128`).
const MAX_COMPACT_BYTES: usize = 16;

/// Append-only SCALE encoder.
#[derive(Debug, Default, Clone)]
pub struct ScaleEncoder {
	buffer: Vec<u8>,
}

impl ScaleEncoder {
	/// Create an empty encoder.
	pub fn new() -> Self {
		Self::default()
	}

	/// Append a value using its static `Encode` implementation.
	///
	/// Used for the fixed-width integers, which SCALE encodes little-endian.
	pub fn append<T: Encode>(&mut self, value: &T) {
		value.encode_to(&mut self.buffer);
	}

	/// Append a boolean as a single `0x00`/`0x01` byte.
	pub fn append_bool(&mut self, value: bool) {
		self.buffer.push(u8::from(value));
	}

	/// Append a compact (variable-length) unsigned integer.
	pub fn append_compact(&mut self, value: u128) {
		Compact(value).encode_to(&mut self.buffer);
	}

	/// Append a length-prefixed byte vector.
	pub fn append_bytes(&mut self, bytes: &[u8]) {
		self.append_compact(bytes.len() as u128);
		self.buffer.extend_from_slice(bytes);
	}

	/// Append bytes verbatim, as used for fixed-size arrays and pre-encoded data.
	pub fn append_raw(&mut self, bytes: &[u8]) {
		self.buffer.extend_from_slice(bytes);
	}

	/// Number of bytes written so far.
	pub fn len(&self) -> usize {
		self.buffer.len()
	}

	/// Whether nothing has been written yet.
	pub fn is_empty(&self) -> bool {
		self.buffer.is_empty()
	}

	/// View the encoded bytes.
	pub fn as_bytes(&self) -> &[u8] {
		&self.buffer
	}

	/// Consume the encoder, returning the encoded bytes.
	pub fn into_bytes(self) -> Vec<u8> {
		self.buffer
	}
}

/// Bounds-checked SCALE decoder over a borrowed slice.
#[derive(Debug, Clone)]
pub struct ScaleDecoder<'a> {
	data: &'a [u8],
	offset: usize,
}

impl<'a> ScaleDecoder<'a> {
	/// Create a decoder positioned at the start of `data`.
	pub fn new(data: &'a [u8]) -> Self {
		Self { data, offset: 0 }
	}

	/// Number of bytes not yet consumed.
	pub fn remaining(&self) -> usize {
		self.data.len() - self.offset
	}

	/// Number of bytes consumed so far.
	pub fn consumed(&self) -> usize {
		self.offset
	}

	/// Look at the next `count` bytes without consuming them.
	pub fn peek(&self, count: usize) -> Result<&'a [u8], CodecError> {
		self.ensure(count)?;
		Ok(&self.data[self.offset..self.offset + count])
	}

	/// Mark `count` bytes as consumed, typically after a [`Self::peek`].
	pub fn confirm(&mut self, count: usize) -> Result<(), CodecError> {
		self.ensure(count)?;
		self.offset += count;
		Ok(())
	}

	/// Read and consume exactly `count` bytes.
	pub fn read(&mut self, count: usize) -> Result<&'a [u8], CodecError> {
		let bytes = self.peek(count)?;
		self.offset += count;
		Ok(bytes)
	}

	/// Read a fixed-size array.
	pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
		let mut array = [0u8; N];
		array.copy_from_slice(self.read(N)?);
		Ok(array)
	}

	pub fn read_u8(&mut self) -> Result<u8, CodecError> {
		Ok(self.read(1)?[0])
	}

	pub fn read_u16(&mut self) -> Result<u16, CodecError> {
		Ok(u16::from_le_bytes(self.read_array()?))
	}

	pub fn read_u32(&mut self) -> Result<u32, CodecError> {
		Ok(u32::from_le_bytes(self.read_array()?))
	}

	pub fn read_u64(&mut self) -> Result<u64, CodecError> {
		Ok(u64::from_le_bytes(self.read_array()?))
	}

	pub fn read_u128(&mut self) -> Result<u128, CodecError> {
		Ok(u128::from_le_bytes(self.read_array()?))
	}

	pub fn read_i8(&mut self) -> Result<i8, CodecError> {
		Ok(i8::from_le_bytes(self.read_array()?))
	}

	pub fn read_i16(&mut self) -> Result<i16, CodecError> {
		Ok(i16::from_le_bytes(self.read_array()?))
	}

	pub fn read_i32(&mut self) -> Result<i32, CodecError> {
		Ok(i32::from_le_bytes(self.read_array()?))
	}

	pub fn read_i64(&mut self) -> Result<i64, CodecError> {
		Ok(i64::from_le_bytes(self.read_array()?))
	}

	pub fn read_i128(&mut self) -> Result<i128, CodecError> {
		Ok(i128::from_le_bytes(self.read_array()?))
	}

	/// Read a boolean, rejecting bytes other than `0x00` and `0x01`.
	pub fn read_bool(&mut self) -> Result<bool, CodecError> {
		match self.peek(1)?[0] {
			0 => {
				self.offset += 1;
				Ok(false)
			},
			1 => {
				self.offset += 1;
				Ok(true)
			},
			other => Err(CodecError::InvalidBool(other)),
		}
	}

	/// Read a compact (variable-length) unsigned integer.
	///
	/// The encoded width is determined from the mode bits of the first byte before anything is
	/// consumed, so a truncated input fails with [`CodecError::OutOfBounds`].
	pub fn read_compact(&mut self) -> Result<u128, CodecError> {
		let first = self.peek(1)?[0];
		let width = match first & 0b11 {
			0b00 => 1,
			0b01 => 2,
			0b10 => 4,
			_ => {
				let payload = usize::from(first >> 2) + 4;
				if payload > MAX_COMPACT_BYTES {
					return Err(CodecError::InvalidCompact(format!(
						"{payload} byte payload exceeds 128 bits"
					)));
				}
				payload + 1
			},
		};
		let mut bytes = self.peek(width)?;
		let value = Compact::<u128>::decode(&mut bytes)
			.map_err(|e| CodecError::InvalidCompact(e.to_string()))?;
		self.offset += width;
		Ok(value.0)
	}

	/// Read a compact length followed by that many bytes.
	pub fn read_bytes(&mut self) -> Result<&'a [u8], CodecError> {
		let start = self.offset;
		let len = self.read_compact()?;
		let len = usize::try_from(len).map_err(|_| CodecError::OutOfBounds {
			requested: usize::MAX,
			remaining: self.remaining(),
		})?;
		match self.read(len) {
			Ok(bytes) => Ok(bytes),
			Err(e) => {
				// Leave the length prefix unconsumed on failure.
				self.offset = start;
				Err(e)
			},
		}
	}

	/// Read a length-prefixed UTF-8 string.
	pub fn read_str(&mut self) -> Result<&'a str, CodecError> {
		let start = self.offset;
		let bytes = self.read_bytes()?;
		std::str::from_utf8(bytes).map_err(|_| {
			self.offset = start;
			CodecError::InvalidUtf8
		})
	}

	fn ensure(&self, count: usize) -> Result<(), CodecError> {
		let remaining = self.remaining();
		if count > remaining {
			return Err(CodecError::OutOfBounds { requested: count, remaining });
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fixed_width_round_trip() {
		let mut encoder = ScaleEncoder::new();
		encoder.append(&u8::MAX);
		encoder.append(&0xbeefu16);
		encoder.append(&u32::MAX);
		encoder.append(&0x0102_0304_0506_0708u64);
		encoder.append(&u128::MAX);
		encoder.append(&i8::MIN);
		encoder.append(&-2i16);
		encoder.append(&i32::MIN);
		encoder.append(&-3i64);
		encoder.append(&i128::MIN);

		let bytes = encoder.into_bytes();
		let mut decoder = ScaleDecoder::new(&bytes);
		assert_eq!(decoder.read_u8(), Ok(u8::MAX));
		assert_eq!(decoder.read_u16(), Ok(0xbeef));
		assert_eq!(decoder.read_u32(), Ok(u32::MAX));
		assert_eq!(decoder.read_u64(), Ok(0x0102_0304_0506_0708));
		assert_eq!(decoder.read_u128(), Ok(u128::MAX));
		assert_eq!(decoder.read_i8(), Ok(i8::MIN));
		assert_eq!(decoder.read_i16(), Ok(-2));
		assert_eq!(decoder.read_i32(), Ok(i32::MIN));
		assert_eq!(decoder.read_i64(), Ok(-3));
		assert_eq!(decoder.read_i128(), Ok(i128::MIN));
		assert_eq!(decoder.remaining(), 0);
	}

	#[test]
	fn integers_are_little_endian() {
		let mut encoder = ScaleEncoder::new();
		encoder.append(&100u128);
		assert_eq!(hex::encode(encoder.as_bytes()), "64000000000000000000000000000000");
	}

	#[test]
	fn short_input_is_out_of_bounds() {
		let bytes = [0x01, 0x02, 0x03];
		let mut decoder = ScaleDecoder::new(&bytes);
		assert_eq!(decoder.read_u32(), Err(CodecError::OutOfBounds { requested: 4, remaining: 3 }));
		// Nothing was consumed by the failed read.
		assert_eq!(decoder.remaining(), 3);
		assert_eq!(decoder.read_u16(), Ok(0x0201));
		assert_eq!(
			decoder.read_u128(),
			Err(CodecError::OutOfBounds { requested: 16, remaining: 1 })
		);
	}

	#[test]
	fn empty_input_is_out_of_bounds() {
		let mut decoder = ScaleDecoder::new(&[]);
		assert!(matches!(decoder.read_u8(), Err(CodecError::OutOfBounds { .. })));
		assert!(matches!(decoder.read_bool(), Err(CodecError::OutOfBounds { .. })));
		assert!(matches!(decoder.read_compact(), Err(CodecError::OutOfBounds { .. })));
	}

	#[test]
	fn compact_matches_reference_encoding() {
		for value in [0u128, 1, 63, 64, 16_383, 16_384, 1 << 30, u64::MAX as u128, u128::MAX] {
			let mut encoder = ScaleEncoder::new();
			encoder.append_compact(value);
			assert_eq!(encoder.as_bytes(), Compact(value).encode().as_slice());

			let bytes = encoder.into_bytes();
			let mut decoder = ScaleDecoder::new(&bytes);
			assert_eq!(decoder.read_compact(), Ok(value));
			assert_eq!(decoder.remaining(), 0);
		}
	}

	#[test]
	fn truncated_compact_is_out_of_bounds() {
		// Four-byte mode with only two bytes present.
		let bytes = [0b0000_0010, 0x00];
		let mut decoder = ScaleDecoder::new(&bytes);
		assert_eq!(
			decoder.read_compact(),
			Err(CodecError::OutOfBounds { requested: 4, remaining: 2 })
		);
		assert_eq!(decoder.consumed(), 0);
	}

	#[test]
	fn oversized_compact_is_rejected() {
		// Big-integer mode announcing 17 payload bytes.
		let mut bytes = vec![0b0011_0111];
		bytes.extend([0xff; 17]);
		let mut decoder = ScaleDecoder::new(&bytes);
		assert!(matches!(decoder.read_compact(), Err(CodecError::InvalidCompact(_))));
	}

	#[test]
	fn bool_rejects_other_bytes() {
		let mut decoder = ScaleDecoder::new(&[0x01, 0x00, 0x02]);
		assert_eq!(decoder.read_bool(), Ok(true));
		assert_eq!(decoder.read_bool(), Ok(false));
		assert_eq!(decoder.read_bool(), Err(CodecError::InvalidBool(2)));
	}

	#[test]
	fn bytes_and_strings() {
		let mut encoder = ScaleEncoder::new();
		encoder.append_bytes(b"pop");
		encoder.append_bool(true);
		let bytes = encoder.into_bytes();
		assert_eq!(bytes, [0x0c, b'p', b'o', b'p', 0x01]);

		let mut decoder = ScaleDecoder::new(&bytes);
		assert_eq!(decoder.read_str(), Ok("pop"));
		assert_eq!(decoder.read_bool(), Ok(true));
	}

	#[test]
	fn truncated_bytes_leave_prefix_unconsumed() {
		// Length 3, only 2 bytes follow.
		let bytes = [0x0c, 0xaa, 0xbb];
		let mut decoder = ScaleDecoder::new(&bytes);
		assert_eq!(
			decoder.read_bytes(),
			Err(CodecError::OutOfBounds { requested: 3, remaining: 2 })
		);
		assert_eq!(decoder.remaining(), 3);
	}

	#[test]
	fn peek_then_confirm() {
		let bytes = [0xaa, 0xbb, 0xcc];
		let mut decoder = ScaleDecoder::new(&bytes);
		assert_eq!(decoder.peek(2), Ok(&bytes[..2]));
		assert_eq!(decoder.remaining(), 3);
		decoder.confirm(2).unwrap();
		assert_eq!(decoder.remaining(), 1);
		assert_eq!(decoder.confirm(2), Err(CodecError::OutOfBounds { requested: 2, remaining: 1 }));
		assert_eq!(decoder.read_array::<1>(), Ok([0xcc]));
	}
}
