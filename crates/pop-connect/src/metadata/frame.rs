// SPDX-License-Identifier: GPL-3.0

//! The metadata layout a runtime reports through `state_getMetadata`.
//!
//! Only what storage access needs is decoded: the portable type table and each pallet's storage
//! entries. Everything after the pallet list is left unread.

use super::{StorageEntry, StorageEntryKind, StorageHasher, StorageKeyPart, StorageModifier};
use crate::{error::MetadataError, registry::portable::lookup_name};
use scale::{Decode, Encode};
use scale_info::{PortableRegistry, TypeDef};

/// Prefix of every metadata blob.
pub const MAGIC: [u8; 4] = *b"meta";

/// Reference into the portable type table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct TypeId(#[codec(compact)] pub u32);

/// A pallet constant and its encoded value.
#[derive(Debug, Encode, Decode)]
pub struct Constant {
	pub name: String,
	pub ty: TypeId,
	pub value: Vec<u8>,
	pub docs: Vec<String>,
}

/// Key shape of a storage entry. A map's key type is a tuple when it has several hashers.
#[derive(Debug, Encode, Decode)]
pub enum EntryType {
	Plain(TypeId),
	Map { hashers: Vec<StorageHasher>, key: TypeId, value: TypeId },
}

#[derive(Debug, Encode, Decode)]
pub struct Entry {
	pub name: String,
	pub modifier: StorageModifier,
	pub ty: EntryType,
	pub default: Vec<u8>,
	pub docs: Vec<String>,
}

#[derive(Debug, Encode, Decode)]
pub struct Storage {
	/// Pallet name used when hashing keys.
	pub prefix: String,
	pub entries: Vec<Entry>,
}

/// A pallet as laid out in V14. Calls, events and errors are single type references.
#[derive(Debug, Encode, Decode)]
pub struct Pallet {
	pub name: String,
	pub storage: Option<Storage>,
	pub calls: Option<TypeId>,
	pub event: Option<TypeId>,
	pub constants: Vec<Constant>,
	pub error: Option<TypeId>,
	pub index: u8,
}

/// V15 appends documentation to each pallet.
#[derive(Debug, Encode, Decode)]
pub struct DocumentedPallet {
	pub pallet: Pallet,
	pub docs: Vec<String>,
}

/// The leading sections shared by V14 and V15.
#[derive(Debug, Encode, Decode)]
pub struct Layout<P> {
	pub types: PortableRegistry,
	pub pallets: Vec<P>,
}

/// Split a metadata blob into its type table and pallets.
pub(super) fn decode(bytes: &[u8]) -> Result<(PortableRegistry, Vec<Pallet>), MetadataError> {
	let mut input = bytes.strip_prefix(&MAGIC[..]).ok_or(MetadataError::MissingMagic)?;
	let version = u8::decode(&mut input).map_err(decode_error)?;
	match version {
		14 => {
			let layout = Layout::<Pallet>::decode(&mut input).map_err(decode_error)?;
			Ok((layout.types, layout.pallets))
		},
		15 => {
			let layout = Layout::<DocumentedPallet>::decode(&mut input).map_err(decode_error)?;
			Ok((layout.types, layout.pallets.into_iter().map(|p| p.pallet).collect()))
		},
		other => Err(MetadataError::UnsupportedVersion(other)),
	}
}

/// The storage entries of every pallet, with types named by their lookup names.
pub(super) fn storage_entries(
	types: &PortableRegistry,
	pallets: Vec<Pallet>,
) -> Result<Vec<StorageEntry>, MetadataError> {
	let mut entries = Vec::new();
	for storage in pallets.into_iter().filter_map(|pallet| pallet.storage) {
		for entry in storage.entries {
			let (kind, value) = match entry.ty {
				EntryType::Plain(value) => (StorageEntryKind::Plain, value),
				EntryType::Map { hashers, key, value } => {
					let kind = map_kind(types, &hashers, key).map_err(|reason| {
						MetadataError::InvalidEntry {
							entry: format!("{}.{}", storage.prefix, entry.name),
							reason,
						}
					})?;
					(kind, value)
				},
			};
			entries.push(StorageEntry {
				pallet: storage.prefix.clone(),
				item: entry.name,
				kind,
				value_type: lookup_name(value.0),
				modifier: entry.modifier,
				default: entry.default,
			});
		}
	}
	Ok(entries)
}

// Maps with several hashers key by a tuple with one element per hasher.
fn map_kind(
	types: &PortableRegistry,
	hashers: &[StorageHasher],
	key: TypeId,
) -> Result<StorageEntryKind, String> {
	match hashers {
		[] => Err("map without hashers".to_string()),
		[hasher] => Ok(StorageEntryKind::Map(StorageKeyPart::new(*hasher, lookup_name(key.0)))),
		hashers => {
			let elements = match types.resolve(key.0).map(|ty| &ty.type_def) {
				Some(TypeDef::Tuple(tuple)) if tuple.fields.len() == hashers.len() => &tuple.fields,
				_ =>
					return Err(format!(
						"key type {} is not a tuple of {} elements",
						key.0,
						hashers.len()
					)),
			};
			Ok(StorageEntryKind::NMap(
				hashers
					.iter()
					.zip(elements)
					.map(|(hasher, element)| StorageKeyPart::new(*hasher, lookup_name(element.id)))
					.collect(),
			))
		},
	}
}

fn decode_error(e: scale::Error) -> MetadataError {
	MetadataError::DecodeError(e.to_string())
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use scale_info::{MetaType, Registry, TypeInfo};

	#[derive(Debug, Default, Encode, TypeInfo)]
	pub(crate) struct AccountData {
		pub(crate) free: u128,
		pub(crate) reserved: u128,
	}

	#[derive(Debug, Default, Encode, TypeInfo)]
	pub(crate) struct AccountInfo {
		pub(crate) nonce: u32,
		pub(crate) data: AccountData,
	}

	/// Type ids of the sample runtime.
	pub(crate) struct SampleTypes {
		pub(crate) account_id: u32,
		pub(crate) account_info: u32,
		pub(crate) era: u32,
		pub(crate) era_and_account: u32,
		pub(crate) bytes: u32,
	}

	fn register<T: TypeInfo + 'static>(registry: &mut Registry) -> u32 {
		registry.register_type(&MetaType::new::<T>()).id
	}

	pub(crate) fn sample_types() -> (SampleTypes, PortableRegistry) {
		let mut registry = Registry::new();
		let ids = SampleTypes {
			account_id: register::<[u8; 32]>(&mut registry),
			account_info: register::<AccountInfo>(&mut registry),
			era: register::<u32>(&mut registry),
			era_and_account: register::<(u32, [u8; 32])>(&mut registry),
			bytes: register::<Vec<u8>>(&mut registry),
		};
		(ids, registry.into())
	}

	fn entry(name: &str, modifier: StorageModifier, ty: EntryType, default: Vec<u8>) -> Entry {
		Entry { name: name.to_string(), modifier, ty, default, docs: vec![] }
	}

	fn pallet(name: &str, index: u8, entries: Vec<Entry>) -> Pallet {
		Pallet {
			name: name.to_string(),
			storage: Some(Storage { prefix: name.to_string(), entries }),
			calls: None,
			event: None,
			constants: vec![],
			error: None,
			index,
		}
	}

	/// `System.Account`, `System.Number`, `Staking.ErasStakersPaged` and a storage-less pallet.
	pub(crate) fn sample_pallets(ids: &SampleTypes) -> Vec<Pallet> {
		let system = pallet(
			"System",
			0,
			vec![
				entry(
					"Account",
					StorageModifier::Default,
					EntryType::Map {
						hashers: vec![StorageHasher::Blake2_128Concat],
						key: TypeId(ids.account_id),
						value: TypeId(ids.account_info),
					},
					AccountInfo::default().encode(),
				),
				entry("Number", StorageModifier::Default, EntryType::Plain(TypeId(ids.era)), vec![0; 4]),
			],
		);
		let staking = pallet(
			"Staking",
			7,
			vec![entry(
				"ErasStakersPaged",
				StorageModifier::Optional,
				EntryType::Map {
					hashers: vec![StorageHasher::Twox64Concat, StorageHasher::Twox64Concat],
					key: TypeId(ids.era_and_account),
					value: TypeId(ids.bytes),
				},
				vec![0],
			)],
		);
		let mut timestamp = pallet("Timestamp", 3, vec![]);
		timestamp.storage = None;
		timestamp.constants.push(Constant {
			name: "MinimumPeriod".into(),
			ty: TypeId(ids.era),
			value: 3_000u32.encode(),
			docs: vec!["Half the block time.".into()],
		});
		vec![system, timestamp, staking]
	}

	/// A complete metadata blob of the given layout version, followed by bytes the decoder
	/// never reads.
	pub(crate) fn sample_metadata(version: u8) -> Vec<u8> {
		let (ids, types) = sample_types();
		let pallets = sample_pallets(&ids);
		let mut blob = MAGIC.to_vec();
		blob.push(version);
		match version {
			15 => blob.extend(
				Layout {
					types,
					pallets: pallets
						.into_iter()
						.map(|pallet| DocumentedPallet { pallet, docs: vec!["docs".into()] })
						.collect(),
				}
				.encode(),
			),
			_ => blob.extend(Layout { types, pallets }.encode()),
		}
		// Extrinsic and runtime type sections.
		blob.extend([4, 0, 0xff, 0xee]);
		blob
	}

	#[test]
	fn splits_types_and_pallets() {
		for version in [14, 15] {
			let (types, pallets) = decode(&sample_metadata(version)).unwrap();
			assert!(!types.types.is_empty());
			let names: Vec<_> = pallets.iter().map(|p| p.name.as_str()).collect();
			assert_eq!(names, ["System", "Timestamp", "Staking"]);
			assert_eq!(pallets[2].index, 7);
			assert_eq!(pallets[1].constants[0].value, 3_000u32.encode());
		}
	}

	#[test]
	fn rejects_foreign_and_unsupported_blobs() {
		assert_eq!(decode(&[1, 2, 3, 4, 14]).unwrap_err(), MetadataError::MissingMagic);
		assert_eq!(decode(b"me").unwrap_err(), MetadataError::MissingMagic);

		let mut legacy = sample_metadata(14);
		legacy[4] = 13;
		assert_eq!(decode(&legacy).unwrap_err(), MetadataError::UnsupportedVersion(13));

		let truncated = &sample_metadata(14)[..40];
		assert!(matches!(decode(truncated), Err(MetadataError::DecodeError(_))));
	}

	#[test]
	fn multi_hasher_maps_split_their_key_tuple() {
		let (ids, types) = sample_types();
		let entries = storage_entries(&types, sample_pallets(&ids)).unwrap();
		assert_eq!(entries.len(), 3);
		let paged = entries.iter().find(|e| e.item == "ErasStakersPaged").unwrap();
		assert_eq!(
			paged.kind,
			StorageEntryKind::NMap(vec![
				StorageKeyPart::new(StorageHasher::Twox64Concat, lookup_name(ids.era)),
				StorageKeyPart::new(StorageHasher::Twox64Concat, lookup_name(ids.account_id)),
			])
		);
		assert_eq!(paged.value_type, lookup_name(ids.bytes));
		assert_eq!(paged.modifier, StorageModifier::Optional);
	}

	#[test]
	fn hasher_count_must_match_the_key_tuple() {
		let (ids, types) = sample_types();
		let broken = pallet(
			"Staking",
			7,
			vec![entry(
				"Ledger",
				StorageModifier::Optional,
				EntryType::Map {
					hashers: vec![StorageHasher::Twox64Concat; 3],
					key: TypeId(ids.era_and_account),
					value: TypeId(ids.bytes),
				},
				vec![],
			)],
		);
		assert!(matches!(
			storage_entries(&types, vec![broken]),
			Err(MetadataError::InvalidEntry { entry, .. }) if entry == "Staking.Ledger"
		));
	}
}
