// SPDX-License-Identifier: GPL-3.0

use crate::{config::AddressFormat, error::StorageKeyError};
use sp_core::crypto::{AccountId32, Ss58Codec};

/// Decode an account address into the raw account bytes used in storage keys.
///
/// Substrate chains accept SS58 addresses carrying the chain's network prefix, or the 32-byte
/// account id as `0x` hex. Ethereum-compatible chains accept 20-byte `0x` hex addresses.
pub fn decode_address(address: &str, format: &AddressFormat) -> Result<Vec<u8>, StorageKeyError> {
	let invalid = |reason: &str| StorageKeyError::InvalidAddress(format!("{address}: {reason}"));
	match format {
		AddressFormat::Substrate { ss58_prefix } => {
			if let Some(hex) = address.strip_prefix("0x") {
				let bytes = hex::decode(hex).map_err(|_| invalid("not hex"))?;
				return match bytes.len() {
					32 => Ok(bytes),
					_ => Err(invalid("expected 32 bytes")),
				};
			}
			let (account, version) = AccountId32::from_ss58check_with_version(address)
				.map_err(|e| invalid(&format!("{e:?}")))?;
			if version.prefix() != *ss58_prefix {
				return Err(invalid(&format!(
					"network prefix {} does not match {ss58_prefix}",
					version.prefix()
				)));
			}
			Ok(AsRef::<[u8]>::as_ref(&account).to_vec())
		},
		AddressFormat::Ethereum => {
			let hex = address.strip_prefix("0x").ok_or_else(|| invalid("missing 0x prefix"))?;
			let bytes = hex::decode(hex).map_err(|_| invalid("not hex"))?;
			match bytes.len() {
				20 => Ok(bytes),
				_ => Err(invalid("expected 20 bytes")),
			}
		},
	}
}
