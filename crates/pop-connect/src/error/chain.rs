// SPDX-License-Identifier: GPL-3.0

//! Chain registry error types.

use thiserror::Error;

/// Errors that can occur when registering or looking up chains.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainRegistryError {
	/// No chain with this identifier is registered.
	#[error("Unknown chain: {0}")]
	UnknownChain(String),
	/// A chain with this identifier is already registered.
	#[error("Chain already registered: {0}")]
	DuplicateChain(String),
	/// The chain endpoint has no candidate URLs.
	#[error("No endpoints configured for chain {0}")]
	NoEndpoints(String),
	/// The chain table lock was poisoned.
	#[error("Failed to acquire chain registry lock: {0}")]
	Lock(String),
}
