// SPDX-License-Identifier: GPL-3.0

//! Chain and connection configuration.
//!
//! These structs arrive already validated from chain-configuration data; they are plain values
//! and can be deserialized from JSON.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// How account addresses are written on a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum AddressFormat {
	/// SS58 addresses with the given network prefix.
	#[serde(rename_all = "camelCase")]
	Substrate {
		/// Network prefix, e.g. `0` for Polkadot and `42` for generic Substrate.
		ss58_prefix: u16,
	},
	/// 20-byte hex addresses.
	Ethereum,
}

impl Default for AddressFormat {
	fn default() -> Self {
		Self::Substrate { ss58_prefix: 42 }
	}
}

/// One blockchain network and the URLs it can be reached on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainEndpoint {
	/// Chain identifier, unique within a [`crate::ChainRegistry`].
	pub chain_id: String,
	/// Candidate URLs, tried in order and rotated through on reconnect.
	pub urls: Vec<Url>,
	/// Address format used for account key parameters.
	#[serde(default)]
	pub address_format: AddressFormat,
}

impl ChainEndpoint {
	/// Create an endpoint with the default address format.
	pub fn new(chain_id: impl Into<String>, urls: Vec<Url>) -> Self {
		Self { chain_id: chain_id.into(), urls, address_format: AddressFormat::default() }
	}

	/// Set the address format.
	pub fn with_address_format(mut self, address_format: AddressFormat) -> Self {
		self.address_format = address_format;
		self
	}
}

/// Exponential back-off between reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
	/// Delay before the first reconnect attempt.
	pub initial_delay: Duration,
	/// Upper bound on the delay.
	pub max_delay: Duration,
	/// Factor applied to the delay after every failed attempt.
	pub multiplier: f64,
}

impl ReconnectPolicy {
	/// Delay before reconnect attempt `attempt` (zero-based).
	pub fn delay(&self, attempt: u32) -> Duration {
		let factor = self.multiplier.max(1.0).powi(attempt.min(64) as i32);
		let delay = self.initial_delay.as_secs_f64() * factor;
		if !delay.is_finite() || delay >= self.max_delay.as_secs_f64() {
			return self.max_delay;
		}
		Duration::from_secs_f64(delay)
	}
}

impl Default for ReconnectPolicy {
	fn default() -> Self {
		Self {
			initial_delay: Duration::from_millis(500),
			max_delay: Duration::from_secs(30),
			multiplier: 2.0,
		}
	}
}

/// Configuration of a [`crate::Connection`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionConfig {
	/// Back-off between reconnect attempts.
	pub reconnect: ReconnectPolicy,
	/// Timeout applied to requests that do not carry their own.
	pub request_timeout: Option<Duration>,
}
