// SPDX-License-Identifier: GPL-3.0

//! Type registry and dynamic coder.
//!
//! Runtime metadata refers to types by textual name (`Balance`, `Vec<AccountId>`,
//! `UnappliedSlash<AccountId, BalanceOf>`). The [`TypeRegistry`] maps those names to a
//! [`TypeDefinition`], a tagged description of how the type is laid out on the wire, and the
//! dynamic coder (see [`TypeRegistry::decode`] and [`TypeRegistry::encode`]) walks that
//! description to convert between SCALE bytes and [`serde_json::Value`] trees.
//!
//! # Resolution order
//!
//! ```text
//! "Vec<T::AccountId>"
//!        │  normalize
//!        ▼
//! "Vec<AccountId>" ── registered exactly? ── yes ──► definition (aliases followed)
//!        │ no
//!        ▼
//!   builtin? (primitives, Vec, Option, Compact, tuples, arrays, H256, ...)
//!        │ no
//!        ▼
//!   base name registered? ("UnappliedSlash<A, B>" ─► "UnappliedSlash")
//!        │ no
//!        ▼
//!   TypeRegistryError::UnresolvedType
//! ```
//!
//! A registry is immutable once built. A runtime upgrade produces a new registry; holders of
//! the previous one keep decoding against the version they started with.

mod coder;
mod definitions;
pub(crate) mod portable;
pub mod type_name;

use crate::error::TypeRegistryError;
use std::{borrow::Cow, collections::HashMap};
use type_name::TypeExpr;

pub use coder::as_u128;

/// Maximum number of alias hops followed while resolving a single name.
const MAX_ALIAS_DEPTH: usize = 64;

/// Primitive wire shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
	Bool,
	Char,
	Str,
	U8,
	U16,
	U32,
	U64,
	U128,
	I8,
	I16,
	I32,
	I64,
	I128,
}

impl Primitive {
	/// Look up a primitive by its Rust spelling.
	pub fn from_name(name: &str) -> Option<Self> {
		Some(match name {
			"bool" => Self::Bool,
			"char" => Self::Char,
			"str" | "String" | "Text" => Self::Str,
			"u8" => Self::U8,
			"u16" => Self::U16,
			"u32" => Self::U32,
			"u64" => Self::U64,
			"u128" => Self::U128,
			"i8" => Self::I8,
			"i16" => Self::I16,
			"i32" => Self::I32,
			"i64" => Self::I64,
			"i128" => Self::I128,
			_ => return None,
		})
	}
}

/// A named field of a composite type or enum variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
	/// Field name; empty for positional fields.
	pub name: String,
	/// Type name of the field.
	pub type_name: String,
}

impl Field {
	/// Create a named field.
	pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
		Self { name: name.into(), type_name: type_name.into() }
	}

	/// Create a positional field.
	pub fn unnamed(type_name: impl Into<String>) -> Self {
		Self { name: String::new(), type_name: type_name.into() }
	}
}

/// A variant of an enum type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
	/// Variant name.
	pub name: String,
	/// Index byte used on the wire.
	pub index: u8,
	/// Associated data, empty for unit variants.
	pub fields: Vec<Field>,
}

/// How a type is laid out on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDefinition {
	/// A primitive value.
	Primitive(Primitive),
	/// Another name for a type.
	Alias(String),
	/// Fields encoded back to back, decoded into a mapping keyed by field name.
	Composite(Vec<Field>),
	/// Positional fields; the empty tuple is the unit type.
	Tuple(Vec<String>),
	/// Compact length followed by that many elements.
	Sequence(String),
	/// Fixed number of elements.
	Array {
		/// Element type name.
		element: String,
		/// Number of elements.
		len: usize,
	},
	/// Compact-encoded integer.
	Compact(String),
	/// `0x00` for none, `0x01` followed by the value for some.
	Option(String),
	/// Index byte followed by the variant's fields.
	Enum(Vec<Variant>),
}

/// Chain-specific map from type name to [`TypeDefinition`].
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
	types: HashMap<String, TypeDefinition>,
}

impl TypeRegistry {
	/// Start building a registry.
	pub fn builder() -> TypeRegistryBuilder {
		TypeRegistryBuilder::default()
	}

	/// Number of explicitly registered names.
	pub fn len(&self) -> usize {
		self.types.len()
	}

	/// Whether no names have been registered.
	pub fn is_empty(&self) -> bool {
		self.types.is_empty()
	}

	/// Whether `type_name` resolves to a definition.
	pub fn contains(&self, type_name: &str) -> bool {
		self.resolve(type_name).is_ok()
	}

	/// Resolve a textual type name to its definition, following aliases.
	pub fn resolve(&self, type_name: &str) -> Result<Cow<'_, TypeDefinition>, TypeRegistryError> {
		let expr = TypeExpr::parse(type_name)?;
		self.resolve_expr(&expr, 0)
	}

	fn resolve_expr(
		&self,
		expr: &TypeExpr,
		depth: usize,
	) -> Result<Cow<'_, TypeDefinition>, TypeRegistryError> {
		if depth > MAX_ALIAS_DEPTH {
			return Err(TypeRegistryError::RecursionLimit(expr.to_string()));
		}
		let canonical = expr.to_string();
		if let Some(definition) = self.types.get(&canonical) {
			return self.follow(definition, depth);
		}
		match expr {
			TypeExpr::Tuple(items) =>
				Ok(Cow::Owned(TypeDefinition::Tuple(items.iter().map(ToString::to_string).collect()))),
			TypeExpr::Array { element, len } =>
				Ok(Cow::Owned(TypeDefinition::Array { element: element.to_string(), len: *len })),
			TypeExpr::Named { name, args } => {
				if let Some(definition) = builtin(name, args) {
					return match definition {
						TypeDefinition::Alias(target) => {
							let target = TypeExpr::parse(&target)?;
							self.resolve_expr(&target, depth + 1)
						},
						definition => Ok(Cow::Owned(definition)),
					};
				}
				if !args.is_empty() {
					if let Some(definition) = self.types.get(name) {
						return self.follow(definition, depth);
					}
				}
				Err(TypeRegistryError::UnresolvedType(canonical))
			},
		}
	}

	fn follow<'r>(
		&'r self,
		definition: &'r TypeDefinition,
		depth: usize,
	) -> Result<Cow<'r, TypeDefinition>, TypeRegistryError> {
		match definition {
			TypeDefinition::Alias(target) => {
				let target = TypeExpr::parse(target)?;
				self.resolve_expr(&target, depth + 1)
			},
			definition => Ok(Cow::Borrowed(definition)),
		}
	}
}

// Definitions every chain shares, keyed by base name.
fn builtin(name: &str, args: &[TypeExpr]) -> Option<TypeDefinition> {
	let first = args.first().map(ToString::to_string);
	if let Some(primitive) = Primitive::from_name(name) {
		return args.is_empty().then_some(TypeDefinition::Primitive(primitive));
	}
	let definition = match (name, first) {
		("Vec" | "BoundedVec" | "WeakBoundedVec" | "VecDeque" | "BTreeSet" | "BoundedBTreeSet",
			Some(element)) => TypeDefinition::Sequence(element),
		("BTreeMap" | "BoundedBTreeMap", Some(key)) => {
			let value = args.get(1)?.to_string();
			TypeDefinition::Sequence(format!("({key}, {value})"))
		},
		("Option", Some(inner)) => TypeDefinition::Option(inner),
		("Compact", Some(inner)) => TypeDefinition::Compact(inner),
		("Box" | "Arc" | "Rc", Some(inner)) => TypeDefinition::Alias(inner),
		("Result", Some(ok)) => {
			let err = args.get(1)?.to_string();
			TypeDefinition::Enum(vec![
				Variant { name: "Ok".into(), index: 0, fields: vec![Field::unnamed(ok)] },
				Variant { name: "Err".into(), index: 1, fields: vec![Field::unnamed(err)] },
			])
		},
		("PhantomData", _) | ("Null", None) => TypeDefinition::Tuple(Vec::new()),
		("Bytes", None) => TypeDefinition::Sequence("u8".into()),
		("H160", None) => TypeDefinition::Array { element: "u8".into(), len: 20 },
		("H256", None) => TypeDefinition::Array { element: "u8".into(), len: 32 },
		("H512", None) => TypeDefinition::Array { element: "u8".into(), len: 64 },
		_ => return None,
	};
	Some(definition)
}

/// Collects type definitions and produces an immutable [`TypeRegistry`].
///
/// # Example
///
/// ```ignore
/// let registry = TypeRegistry::builder()
///     .alias("Balance", "u128")?
///     .composite("UnappliedSlash", [("validator", "AccountId"), ("own", "Balance")])?
///     .build();
/// ```
#[derive(Debug, Default)]
pub struct TypeRegistryBuilder {
	types: HashMap<String, TypeDefinition>,
}

impl TypeRegistryBuilder {
	/// Register a definition under a type name, replacing any previous one.
	///
	/// The name is normalized first, so `T::Balance` registers `Balance`.
	pub fn register(
		mut self,
		type_name: &str,
		definition: TypeDefinition,
	) -> Result<Self, TypeRegistryError> {
		let name = type_name::normalize(type_name)?;
		self.types.insert(name, definition);
		Ok(self)
	}

	/// Register `type_name` as another name for `target`.
	pub fn alias(self, type_name: &str, target: &str) -> Result<Self, TypeRegistryError> {
		let target = type_name::normalize(target)?;
		self.register(type_name, TypeDefinition::Alias(target))
	}

	/// Register a composite type from an ordered list of `(field name, type name)` pairs.
	pub fn composite<'a>(
		self,
		type_name: &str,
		fields: impl IntoIterator<Item = (&'a str, &'a str)>,
	) -> Result<Self, TypeRegistryError> {
		let fields = fields.into_iter().map(|(name, ty)| Field::new(name, ty)).collect();
		self.register(type_name, TypeDefinition::Composite(fields))
	}

	/// Register every type described by a JSON type definition document.
	///
	/// See [`definitions`] for the accepted format.
	pub fn json_definitions(self, document: &str) -> Result<Self, TypeRegistryError> {
		definitions::register_document(self, document)
	}

	/// Register every type of a `scale-info` registry, as found in V14+ runtime metadata.
	///
	/// Types are registered as `Lookup{id}`; path names that are unique are aliased too.
	pub fn portable(self, registry: &scale_info::PortableRegistry) -> Result<Self, TypeRegistryError> {
		portable::register_portable(self, registry)
	}

	/// Whether a name has been registered.
	pub fn contains(&self, type_name: &str) -> bool {
		type_name::normalize(type_name).is_ok_and(|name| self.types.contains_key(&name))
	}

	/// Finish building.
	pub fn build(self) -> TypeRegistry {
		TypeRegistry { types: self.types }
	}
}
