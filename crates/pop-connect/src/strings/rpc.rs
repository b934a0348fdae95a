// SPDX-License-Identifier: GPL-3.0

//! String constants for the connection layer.

/// JSON-RPC method names.
pub mod methods {
	pub const STATE_GET_STORAGE: &str = "state_getStorage";
	pub const STATE_QUERY_STORAGE_AT: &str = "state_queryStorageAt";
	pub const STATE_SUBSCRIBE_STORAGE: &str = "state_subscribeStorage";
	pub const STATE_UNSUBSCRIBE_STORAGE: &str = "state_unsubscribeStorage";
	pub const STATE_GET_RUNTIME_VERSION: &str = "state_getRuntimeVersion";
	pub const STATE_GET_METADATA: &str = "state_getMetadata";
	pub const ETH_SUBSCRIBE: &str = "eth_subscribe";
	pub const ETH_UNSUBSCRIBE: &str = "eth_unsubscribe";
}

/// JSON-RPC envelope field names and values.
pub mod fields {
	pub const JSONRPC_VERSION: &str = "2.0";
	pub const SUBSCRIPTION: &str = "subscription";
	pub const RESULT: &str = "result";
}

/// Logging targets.
pub mod targets {
	pub const CONNECTION: &str = "pop_connect::connection";
	pub const STORAGE: &str = "pop_connect::storage";
	pub const TRANSPORT: &str = "pop_connect::transport";
}
