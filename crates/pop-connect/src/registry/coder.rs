// SPDX-License-Identifier: GPL-3.0

//! Dynamic encode/decode of [`Value`] trees driven by [`TypeDefinition`]s.
//!
//! Value mapping:
//!
//! | Wire shape                         | Value                                    |
//! |------------------------------------|------------------------------------------|
//! | `bool`                             | boolean                                  |
//! | `u8`..`u64`, `i8`..`i64`           | number                                   |
//! | `u128`, `i128`, wide compacts      | decimal string (JSON numbers are 64-bit) |
//! | `str`, `char`                      | string                                   |
//! | `Vec<u8>`, `[u8; N]`               | `0x`-prefixed hex string                 |
//! | sequences, arrays, tuples          | array (`()` is null)                     |
//! | composites                         | mapping in declaration order             |
//! | `Option<T>`                        | null or the inner value                  |
//! | enums                              | variant name, or `{ name: data }`        |

use super::{Field, Primitive, TypeDefinition, TypeRegistry, Variant};
use crate::{
	codec::{ScaleDecoder, ScaleEncoder},
	error::{CodecError, TypeRegistryError},
};
use log::warn;
use serde_json::{Map, Value};

/// Maximum nesting depth of a single encode/decode.
const MAX_NESTING: usize = 128;

/// Maximum length of a sequence whose elements occupy no bytes.
const MAX_ZERO_SIZED_ELEMENTS: usize = 1024;

impl TypeRegistry {
	/// Decode one value of `type_name` from the decoder's current position.
	pub fn decode(
		&self,
		type_name: &str,
		decoder: &mut ScaleDecoder<'_>,
	) -> Result<Value, TypeRegistryError> {
		self.decode_nested(type_name, decoder, 0)
	}

	/// Decode a complete byte string as one value of `type_name`.
	///
	/// Trailing bytes are tolerated and logged: they usually mean a type definition is
	/// shorter than the chain's, which callers detect through the missing fields.
	pub fn decode_bytes(&self, type_name: &str, bytes: &[u8]) -> Result<Value, TypeRegistryError> {
		let mut decoder = ScaleDecoder::new(bytes);
		let value = self.decode(type_name, &mut decoder)?;
		if decoder.remaining() > 0 {
			warn!(
				target: "pop_connect::registry",
				"{} trailing bytes after decoding `{type_name}`",
				decoder.remaining()
			);
		}
		Ok(value)
	}

	/// Encode `value` as `type_name`, appending to `encoder`.
	pub fn encode(
		&self,
		type_name: &str,
		value: &Value,
		encoder: &mut ScaleEncoder,
	) -> Result<(), TypeRegistryError> {
		self.encode_nested(type_name, value, encoder, 0)
	}

	/// Encode `value` as `type_name` into a fresh byte vector.
	pub fn encode_to_vec(&self, type_name: &str, value: &Value) -> Result<Vec<u8>, TypeRegistryError> {
		let mut encoder = ScaleEncoder::new();
		self.encode(type_name, value, &mut encoder)?;
		Ok(encoder.into_bytes())
	}

	fn decode_nested(
		&self,
		type_name: &str,
		decoder: &mut ScaleDecoder<'_>,
		depth: usize,
	) -> Result<Value, TypeRegistryError> {
		if depth > MAX_NESTING {
			return Err(TypeRegistryError::RecursionLimit(type_name.to_string()));
		}
		let definition = self.resolve(type_name)?;
		let depth = depth + 1;
		match definition.as_ref() {
			TypeDefinition::Primitive(primitive) => decode_primitive(*primitive, decoder),
			// Aliases are followed by `resolve`.
			TypeDefinition::Alias(target) => self.decode_nested(target, decoder, depth),
			TypeDefinition::Composite(fields) => self.decode_fields(fields, decoder, depth),
			TypeDefinition::Tuple(items) => {
				if items.is_empty() {
					return Ok(Value::Null);
				}
				let values = items
					.iter()
					.map(|item| self.decode_nested(item, decoder, depth))
					.collect::<Result<Vec<_>, _>>()?;
				Ok(Value::Array(values))
			},
			TypeDefinition::Sequence(element) => {
				let len = decoder.read_compact()?;
				let len = usize::try_from(len).map_err(|_| CodecError::OutOfBounds {
					requested: usize::MAX,
					remaining: decoder.remaining(),
				})?;
				self.decode_elements(element, len, decoder, depth)
			},
			TypeDefinition::Array { element, len } =>
				self.decode_elements(element, *len, decoder, depth),
			TypeDefinition::Compact(inner) => {
				let value = decoder.read_compact()?;
				Ok(integer(value, self.is_wide(inner)))
			},
			TypeDefinition::Option(inner) => {
				let tag = decoder.read_u8()?;
				if self.is_primitive(inner, Primitive::Bool) {
					return match tag {
						0 => Ok(Value::Null),
						1 => Ok(Value::Bool(true)),
						2 => Ok(Value::Bool(false)),
						other => Err(CodecError::InvalidOptionTag(other).into()),
					};
				}
				match tag {
					0 => Ok(Value::Null),
					1 => self.decode_nested(inner, decoder, depth),
					other => Err(CodecError::InvalidOptionTag(other).into()),
				}
			},
			TypeDefinition::Enum(variants) => {
				let index = decoder.read_u8()?;
				let variant = variants.iter().find(|v| v.index == index).ok_or_else(|| {
					TypeRegistryError::UnknownVariant {
						type_name: type_name.to_string(),
						variant: index.to_string(),
					}
				})?;
				if variant.fields.is_empty() {
					return Ok(Value::String(variant.name.clone()));
				}
				let data = self.decode_fields(&variant.fields, decoder, depth)?;
				let mut map = Map::new();
				map.insert(variant.name.clone(), data);
				Ok(Value::Object(map))
			},
		}
	}

	fn decode_fields(
		&self,
		fields: &[Field],
		decoder: &mut ScaleDecoder<'_>,
		depth: usize,
	) -> Result<Value, TypeRegistryError> {
		match fields {
			[] => Ok(Value::Null),
			[single] if single.name.is_empty() => self.decode_nested(&single.type_name, decoder, depth),
			fields if is_named(fields) => {
				let mut map = Map::new();
				for field in fields {
					let value = self.decode_nested(&field.type_name, decoder, depth)?;
					map.insert(field.name.clone(), value);
				}
				Ok(Value::Object(map))
			},
			fields => {
				let values = fields
					.iter()
					.map(|field| self.decode_nested(&field.type_name, decoder, depth))
					.collect::<Result<Vec<_>, _>>()?;
				Ok(Value::Array(values))
			},
		}
	}

	fn decode_elements(
		&self,
		element: &str,
		len: usize,
		decoder: &mut ScaleDecoder<'_>,
		depth: usize,
	) -> Result<Value, TypeRegistryError> {
		if self.is_primitive(element, Primitive::U8) {
			let bytes = decoder.read(len)?;
			return Ok(Value::String(format!("0x{}", hex::encode(bytes))));
		}
		// Every element takes at least one byte except zero-sized ones, so the capacity is
		// bounded by the input rather than by an untrusted length prefix.
		let mut values = Vec::with_capacity(len.min(decoder.remaining()));
		let start = decoder.consumed();
		for _ in 0..len {
			values.push(self.decode_nested(element, decoder, depth)?);
			// An element that read nothing never will, so the input cannot bound the loop.
			if decoder.consumed() == start && len > MAX_ZERO_SIZED_ELEMENTS {
				return Err(
					CodecError::TooManyElements { len, max: MAX_ZERO_SIZED_ELEMENTS }.into()
				);
			}
		}
		Ok(Value::Array(values))
	}

	fn encode_nested(
		&self,
		type_name: &str,
		value: &Value,
		encoder: &mut ScaleEncoder,
		depth: usize,
	) -> Result<(), TypeRegistryError> {
		if depth > MAX_NESTING {
			return Err(TypeRegistryError::RecursionLimit(type_name.to_string()));
		}
		let definition = self.resolve(type_name)?;
		let depth = depth + 1;
		match definition.as_ref() {
			TypeDefinition::Primitive(primitive) =>
				encode_primitive(type_name, *primitive, value, encoder),
			TypeDefinition::Alias(target) => self.encode_nested(target, value, encoder, depth),
			TypeDefinition::Composite(fields) =>
				self.encode_fields(type_name, fields, value, encoder, depth),
			TypeDefinition::Tuple(items) => {
				if items.is_empty() {
					return match value {
						Value::Null => Ok(()),
						Value::Array(values) if values.is_empty() => Ok(()),
						_ => Err(unexpected(type_name, "null")),
					};
				}
				let values = expect_array(type_name, value, Some(items.len()))?;
				for (item, value) in items.iter().zip(values) {
					self.encode_nested(item, value, encoder, depth)?;
				}
				Ok(())
			},
			TypeDefinition::Sequence(element) => {
				if self.is_primitive(element, Primitive::U8) {
					if let Value::String(text) = value {
						encoder.append_bytes(&decode_hex(type_name, text)?);
						return Ok(());
					}
				}
				let values = expect_array(type_name, value, None)?;
				encoder.append_compact(values.len() as u128);
				for value in values {
					self.encode_nested(element, value, encoder, depth)?;
				}
				Ok(())
			},
			TypeDefinition::Array { element, len } => {
				if self.is_primitive(element, Primitive::U8) {
					if let Value::String(text) = value {
						let bytes = decode_hex(type_name, text)?;
						if bytes.len() != *len {
							return Err(unexpected(type_name, "a hex string of the array length"));
						}
						encoder.append_raw(&bytes);
						return Ok(());
					}
				}
				for value in expect_array(type_name, value, Some(*len))? {
					self.encode_nested(element, value, encoder, depth)?;
				}
				Ok(())
			},
			TypeDefinition::Compact(inner) => {
				let number = as_u128(value)
					.filter(|number| *number <= self.compact_bound(inner))
					.ok_or_else(|| unexpected(type_name, "an unsigned integer in range of the inner type"))?;
				encoder.append_compact(number);
				Ok(())
			},
			TypeDefinition::Option(inner) => {
				if self.is_primitive(inner, Primitive::Bool) {
					let tag = match value {
						Value::Null => 0u8,
						Value::Bool(true) => 1,
						Value::Bool(false) => 2,
						_ => return Err(unexpected(type_name, "null or a boolean")),
					};
					encoder.append(&tag);
					return Ok(());
				}
				match value {
					Value::Null => {
						encoder.append(&0u8);
						Ok(())
					},
					value => {
						encoder.append(&1u8);
						self.encode_nested(inner, value, encoder, depth)
					},
				}
			},
			TypeDefinition::Enum(variants) => {
				let (variant, data) = select_variant(type_name, variants, value)?;
				encoder.append(&variant.index);
				match data {
					Some(data) => self.encode_fields(type_name, &variant.fields, data, encoder, depth),
					None if variant.fields.is_empty() => Ok(()),
					None => Err(unexpected(type_name, "variant data")),
				}
			},
		}
	}

	fn encode_fields(
		&self,
		type_name: &str,
		fields: &[Field],
		value: &Value,
		encoder: &mut ScaleEncoder,
		depth: usize,
	) -> Result<(), TypeRegistryError> {
		match fields {
			[] => Ok(()),
			[single] if single.name.is_empty() =>
				self.encode_nested(&single.type_name, value, encoder, depth),
			fields if is_named(fields) => {
				let Value::Object(map) = value else {
					return Err(unexpected(type_name, "a mapping"));
				};
				if map.len() != fields.len() {
					return Err(TypeRegistryError::UnexpectedStructFields {
						type_name: type_name.to_string(),
						expected: fields.iter().map(|f| f.name.clone()).collect(),
						found: map.len(),
					});
				}
				for field in fields {
					let value = map
						.get(&field.name)
						.ok_or_else(|| TypeRegistryError::UnresolvedType(field.name.clone()))?;
					self.encode_nested(&field.type_name, value, encoder, depth)?;
				}
				Ok(())
			},
			fields => {
				let values = expect_array(type_name, value, Some(fields.len()))?;
				for (field, value) in fields.iter().zip(values) {
					self.encode_nested(&field.type_name, value, encoder, depth)?;
				}
				Ok(())
			},
		}
	}

	fn is_primitive(&self, type_name: &str, primitive: Primitive) -> bool {
		self.resolve(type_name)
			.is_ok_and(|definition| *definition == TypeDefinition::Primitive(primitive))
	}

	// Largest value a compact of this inner type may carry.
	fn compact_bound(&self, type_name: &str) -> u128 {
		match self.resolve(type_name).as_deref() {
			Ok(TypeDefinition::Primitive(Primitive::U8)) => u8::MAX.into(),
			Ok(TypeDefinition::Primitive(Primitive::U16)) => u16::MAX.into(),
			Ok(TypeDefinition::Primitive(Primitive::U32)) => u32::MAX.into(),
			Ok(TypeDefinition::Primitive(Primitive::U64)) => u64::MAX.into(),
			Ok(TypeDefinition::Composite(fields)) if fields.len() == 1 =>
				self.compact_bound(&fields[0].type_name),
			_ => u128::MAX,
		}
	}

	// Whether integers of this type may exceed 64 bits.
	fn is_wide(&self, type_name: &str) -> bool {
		match self.resolve(type_name).as_deref() {
			Ok(TypeDefinition::Primitive(primitive)) => matches!(primitive, Primitive::U128),
			Ok(TypeDefinition::Composite(fields)) if fields.len() == 1 =>
				self.is_wide(&fields[0].type_name),
			_ => true,
		}
	}
}

fn decode_primitive(
	primitive: Primitive,
	decoder: &mut ScaleDecoder<'_>,
) -> Result<Value, TypeRegistryError> {
	Ok(match primitive {
		Primitive::Bool => Value::Bool(decoder.read_bool()?),
		Primitive::Char => {
			let code = decoder.read_u32()?;
			let c = char::from_u32(code).ok_or(CodecError::InvalidUtf8)?;
			Value::String(c.to_string())
		},
		Primitive::Str => Value::String(decoder.read_str()?.to_string()),
		Primitive::U8 => decoder.read_u8()?.into(),
		Primitive::U16 => decoder.read_u16()?.into(),
		Primitive::U32 => decoder.read_u32()?.into(),
		Primitive::U64 => decoder.read_u64()?.into(),
		Primitive::U128 => Value::String(decoder.read_u128()?.to_string()),
		Primitive::I8 => decoder.read_i8()?.into(),
		Primitive::I16 => decoder.read_i16()?.into(),
		Primitive::I32 => decoder.read_i32()?.into(),
		Primitive::I64 => decoder.read_i64()?.into(),
		Primitive::I128 => Value::String(decoder.read_i128()?.to_string()),
	})
}

fn encode_primitive(
	type_name: &str,
	primitive: Primitive,
	value: &Value,
	encoder: &mut ScaleEncoder,
) -> Result<(), TypeRegistryError> {
	macro_rules! unsigned {
		($ty:ty) => {{
			let number = as_u128(value)
				.and_then(|n| <$ty>::try_from(n).ok())
				.ok_or_else(|| unexpected(type_name, concat!("an integer in range of ", stringify!($ty))))?;
			encoder.append(&number);
		}};
	}
	macro_rules! signed {
		($ty:ty) => {{
			let number = as_i128(value)
				.and_then(|n| <$ty>::try_from(n).ok())
				.ok_or_else(|| unexpected(type_name, concat!("an integer in range of ", stringify!($ty))))?;
			encoder.append(&number);
		}};
	}
	match primitive {
		Primitive::Bool => {
			let flag = value.as_bool().ok_or_else(|| unexpected(type_name, "a boolean"))?;
			encoder.append_bool(flag);
		},
		Primitive::Char => {
			let mut chars = value.as_str().map(str::chars).into_iter().flatten();
			match (chars.next(), chars.next()) {
				(Some(c), None) => encoder.append(&u32::from(c)),
				_ => return Err(unexpected(type_name, "a single character")),
			}
		},
		Primitive::Str => {
			let text = value.as_str().ok_or_else(|| unexpected(type_name, "a string"))?;
			encoder.append_bytes(text.as_bytes());
		},
		Primitive::U8 => unsigned!(u8),
		Primitive::U16 => unsigned!(u16),
		Primitive::U32 => unsigned!(u32),
		Primitive::U64 => unsigned!(u64),
		Primitive::U128 => unsigned!(u128),
		Primitive::I8 => signed!(i8),
		Primitive::I16 => signed!(i16),
		Primitive::I32 => signed!(i32),
		Primitive::I64 => signed!(i64),
		Primitive::I128 => signed!(i128),
	}
	Ok(())
}

/// Read an unsigned integer from a decoded value.
///
/// Accepts JSON numbers, decimal strings (as produced for 128-bit integers) and `0x` hex strings.
pub fn as_u128(value: &Value) -> Option<u128> {
	match value {
		Value::Number(number) => number.as_u64().map(u128::from),
		Value::String(text) => match text.strip_prefix("0x") {
			Some(hex) => u128::from_str_radix(hex, 16).ok(),
			None => text.parse().ok(),
		},
		_ => None,
	}
}

fn as_i128(value: &Value) -> Option<i128> {
	match value {
		Value::Number(number) => number.as_i64().map(i128::from),
		Value::String(text) => text.parse().ok(),
		_ => None,
	}
}

fn integer(value: u128, wide: bool) -> Value {
	match u64::try_from(value) {
		Ok(narrow) if !wide => narrow.into(),
		_ => Value::String(value.to_string()),
	}
}

fn is_named(fields: &[Field]) -> bool {
	fields.iter().all(|field| !field.name.is_empty())
}

fn select_variant<'v, 'd>(
	type_name: &str,
	variants: &'v [Variant],
	value: &'d Value,
) -> Result<(&'v Variant, Option<&'d Value>), TypeRegistryError> {
	let unknown = |variant: String| TypeRegistryError::UnknownVariant {
		type_name: type_name.to_string(),
		variant,
	};
	match value {
		Value::String(name) => variants
			.iter()
			.find(|v| &v.name == name)
			.map(|v| (v, None))
			.ok_or_else(|| unknown(name.clone())),
		Value::Object(map) if map.len() == 1 => {
			let (name, data) = map.iter().next().ok_or_else(|| unexpected(type_name, "a variant"))?;
			variants
				.iter()
				.find(|v| &v.name == name)
				.map(|v| (v, Some(data)))
				.ok_or_else(|| unknown(name.clone()))
		},
		_ => Err(unexpected(type_name, "a variant name or a single-key mapping")),
	}
}

fn expect_array<'v>(
	type_name: &str,
	value: &'v Value,
	len: Option<usize>,
) -> Result<&'v [Value], TypeRegistryError> {
	match (value, len) {
		(Value::Array(values), None) => Ok(values),
		(Value::Array(values), Some(len)) if values.len() == len => Ok(values),
		(_, None) => Err(unexpected(type_name, "an array")),
		(_, Some(_)) => Err(unexpected(type_name, "an array of the declared length")),
	}
}

fn decode_hex(type_name: &str, text: &str) -> Result<Vec<u8>, TypeRegistryError> {
	hex::decode(text.strip_prefix("0x").unwrap_or(text))
		.map_err(|_| unexpected(type_name, "a hex string"))
}

fn unexpected(type_name: &str, expected: &'static str) -> TypeRegistryError {
	TypeRegistryError::UnexpectedValue { type_name: type_name.to_string(), expected }
}
