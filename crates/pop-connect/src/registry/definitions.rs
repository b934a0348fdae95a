// SPDX-License-Identifier: GPL-3.0

//! JSON type definition documents.
//!
//! A document is a mapping from type name to definition, registered on top of whatever the
//! builder already holds:
//!
//! ```json
//! {
//!     "Balance": "u128",
//!     "UnappliedSlash<AccountId, BalanceOf>": {
//!         "type": "struct",
//!         "type_mapping": [["validator", "AccountId"], ["own", "BalanceOf"]]
//!     },
//!     "Forcing": { "type": "enum", "value_list": ["NotForcing", "ForceNew"] },
//!     "RewardDestination": {
//!         "type": "enum",
//!         "type_mapping": [["Staked", "Null"], ["Account", "AccountId"]]
//!     }
//! }
//! ```
//!
//! Enum variants take their position as index byte. A variant type of `Null` or `()` is a unit
//! variant.

use super::{Field, TypeDefinition, TypeRegistryBuilder, Variant};
use crate::error::TypeRegistryError;
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Definition {
	Alias(String),
	Complex(ComplexDefinition),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ComplexDefinition {
	Struct {
		type_mapping: Vec<(String, String)>,
	},
	Enum {
		#[serde(default)]
		value_list: Vec<String>,
		#[serde(default)]
		type_mapping: Vec<(String, String)>,
	},
}

/// Register every definition of `document` with `builder`.
pub(super) fn register_document(
	mut builder: TypeRegistryBuilder,
	document: &str,
) -> Result<TypeRegistryBuilder, TypeRegistryError> {
	let entries: Map<String, Value> = serde_json::from_str(document)
		.map_err(|e| TypeRegistryError::InvalidDefinition(e.to_string()))?;
	for (name, value) in entries {
		let definition: Definition = serde_json::from_value(value)
			.map_err(|e| TypeRegistryError::InvalidDefinition(format!("{name}: {e}")))?;
		builder = match definition {
			Definition::Alias(target) => builder.alias(&name, &target)?,
			Definition::Complex(ComplexDefinition::Struct { type_mapping }) => builder.register(
				&name,
				TypeDefinition::Composite(
					type_mapping.into_iter().map(|(field, ty)| Field::new(field, ty)).collect(),
				),
			)?,
			Definition::Complex(ComplexDefinition::Enum { value_list, type_mapping }) =>
				builder.register(&name, enum_definition(&name, value_list, type_mapping)?)?,
		};
	}
	Ok(builder)
}

fn enum_definition(
	name: &str,
	value_list: Vec<String>,
	type_mapping: Vec<(String, String)>,
) -> Result<TypeDefinition, TypeRegistryError> {
	let variants: Vec<(String, Option<String>)> = match (value_list.is_empty(), type_mapping.is_empty()) {
		(false, true) => value_list.into_iter().map(|v| (v, None)).collect(),
		(true, false) => type_mapping
			.into_iter()
			.map(|(v, ty)| {
				let unit = matches!(ty.trim(), "Null" | "()");
				(v, (!unit).then_some(ty))
			})
			.collect(),
		_ => {
			return Err(TypeRegistryError::InvalidDefinition(format!(
				"{name}: an enum needs exactly one of `value_list` or `type_mapping`"
			)));
		},
	};
	if variants.len() > 256 {
		return Err(TypeRegistryError::InvalidDefinition(format!("{name}: too many variants")));
	}
	Ok(TypeDefinition::Enum(
		variants
			.into_iter()
			.enumerate()
			.map(|(index, (variant, ty))| Variant {
				name: variant,
				index: index as u8,
				fields: ty.map(Field::unnamed).into_iter().collect(),
			})
			.collect(),
	))
}
