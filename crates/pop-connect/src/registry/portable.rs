// SPDX-License-Identifier: GPL-3.0

use super::{Field, Primitive, TypeDefinition, TypeRegistryBuilder, Variant};
use crate::error::TypeRegistryError;
use log::debug;
use scale_info::{PortableRegistry, Type, TypeDef, TypeDefPrimitive, form::PortableForm};
use std::collections::HashMap;

/// Name under which the portable type `id` is registered.
pub(crate) fn lookup_name(id: u32) -> String {
	format!("Lookup{id}")
}

/// Register every type of `registry` with `builder`.
///
/// Each type is registered as `Lookup{id}`. A path name such as `AccountId32` is registered as an
/// alias of its lookup name when exactly one type carries it and nothing else claims it.
pub(super) fn register_portable(
	mut builder: TypeRegistryBuilder,
	registry: &PortableRegistry,
) -> Result<TypeRegistryBuilder, TypeRegistryError> {
	let mut path_names: HashMap<&str, Vec<u32>> = HashMap::new();
	for portable in registry.types.iter() {
		let Some(definition) = definition(&portable.ty, registry) else {
			debug!(
				target: "pop_connect::registry",
				"skipping unsupported portable type {} ({})",
				portable.id,
				portable.ty.path.segments.join("::")
			);
			continue;
		};
		builder = builder.register(&lookup_name(portable.id), definition)?;
		if let Some(name) = portable.ty.path.segments.last() {
			path_names.entry(name.as_str()).or_default().push(portable.id);
		}
	}
	for (name, ids) in path_names {
		if let [id] = ids.as_slice() {
			if !builder.contains(name) && Primitive::from_name(name).is_none() {
				builder = builder.alias(name, &lookup_name(*id))?;
			}
		}
	}
	Ok(builder)
}

fn definition(ty: &Type<PortableForm>, registry: &PortableRegistry) -> Option<TypeDefinition> {
	let definition = match &ty.type_def {
		TypeDef::Primitive(primitive) => primitive_definition(primitive),
		TypeDef::Composite(composite) => TypeDefinition::Composite(fields(&composite.fields)),
		TypeDef::Variant(variant) => {
			if let Some(inner) = option_inner(ty, registry) {
				return Some(TypeDefinition::Option(lookup_name(inner)));
			}
			TypeDefinition::Enum(
				variant
					.variants
					.iter()
					.map(|v| Variant { name: v.name.clone(), index: v.index, fields: fields(&v.fields) })
					.collect(),
			)
		},
		TypeDef::Sequence(sequence) => TypeDefinition::Sequence(lookup_name(sequence.type_param.id)),
		TypeDef::Array(array) => TypeDefinition::Array {
			element: lookup_name(array.type_param.id),
			len: array.len as usize,
		},
		TypeDef::Tuple(tuple) =>
			TypeDefinition::Tuple(tuple.fields.iter().map(|f| lookup_name(f.id)).collect()),
		TypeDef::Compact(compact) => TypeDefinition::Compact(lookup_name(compact.type_param.id)),
		// Bit sequences have no dynamic representation; decoding one reports it as unresolved.
		TypeDef::BitSequence(_) => return None,
	};
	Some(definition)
}

fn primitive_definition(primitive: &TypeDefPrimitive) -> TypeDefinition {
	let primitive = match primitive {
		TypeDefPrimitive::Bool => Primitive::Bool,
		TypeDefPrimitive::Char => Primitive::Char,
		TypeDefPrimitive::Str => Primitive::Str,
		TypeDefPrimitive::U8 => Primitive::U8,
		TypeDefPrimitive::U16 => Primitive::U16,
		TypeDefPrimitive::U32 => Primitive::U32,
		TypeDefPrimitive::U64 => Primitive::U64,
		TypeDefPrimitive::U128 => Primitive::U128,
		TypeDefPrimitive::I8 => Primitive::I8,
		TypeDefPrimitive::I16 => Primitive::I16,
		TypeDefPrimitive::I32 => Primitive::I32,
		TypeDefPrimitive::I64 => Primitive::I64,
		TypeDefPrimitive::I128 => Primitive::I128,
		// 256-bit integers surface as their little-endian bytes.
		TypeDefPrimitive::U256 | TypeDefPrimitive::I256 =>
			return TypeDefinition::Array { element: "u8".into(), len: 32 },
	};
	TypeDefinition::Primitive(primitive)
}

fn fields(fields: &[scale_info::Field<PortableForm>]) -> Vec<Field> {
	fields
		.iter()
		.map(|field| Field {
			name: field.name.clone().unwrap_or_default(),
			type_name: lookup_name(field.ty.id),
		})
		.collect()
}

// `Option<T>` with `T` other than `bool`, which keeps its variant form so the single byte
// encoding of the legacy `Option<bool>` does not apply.
fn option_inner(ty: &Type<PortableForm>, registry: &PortableRegistry) -> Option<u32> {
	if ty.path.segments.len() != 1 || ty.path.segments[0] != "Option" {
		return None;
	}
	let inner = ty.type_params.first()?.ty.as_ref()?.id;
	match registry.resolve(inner).map(|t| &t.type_def) {
		Some(TypeDef::Primitive(TypeDefPrimitive::Bool)) => None,
		_ => Some(inner),
	}
}
