// SPDX-License-Identifier: GPL-3.0

//! Chain connectivity and typed storage access for Polkadot SDK and Ethereum-compatible
//! chains.
//!
//! Keeps one persistent JSON-RPC connection per chain, multiplexes requests and long-lived
//! subscriptions over it, and decodes chain state with a SCALE codec driven by a type registry
//! built from each chain's runtime metadata.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         ChainRegistry                           │
//! │          (chain id ─► connection + runtime metadata)            │
//! └─────────────────────────────────────────────────────────────────┘
//!                                 │
//!                                 ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    StorageRequestPerformer                      │
//! │        fetch_once / fetch_many / fetch_raw / observe            │
//! └─────────────────────────────────────────────────────────────────┘
//!            │                                          │
//!            ▼                                          ▼
//! ┌──────────────────────────┐          ┌────────────────────────────┐
//! │    Storage Key Builder   │          │         Connection         │
//! │ twox128 prefix + hashers │          │  worker task, reconnects   │
//! └──────────────────────────┘          │  ┌──────────────────────┐  │
//!            │                          │  │     Multiplexer      │  │
//!            ▼                          │  │ ids, waiters, resend │  │
//! ┌──────────────────────────┐          │  └──────────────────────┘  │
//! │ TypeRegistry + SCALE     │          │         Transport          │
//! │ codec (Value <-> bytes)  │          │      (WebSocket)           │
//! └──────────────────────────┘          └────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use pop_connect::{ChainEndpoint, ChainRegistry, ConnectionConfig, KeyParam};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ChainRegistry::new(ConnectionConfig::default());
//! let westend = registry.add_chain(ChainEndpoint::new(
//! 	"westend",
//! 	vec!["wss://westend-rpc.polkadot.io".parse()?],
//! ))?;
//!
//! // Types and storage layout come from the runtime itself.
//! let runtime = westend.load_runtime().await?;
//! println!("spec version {}", runtime.spec_version());
//!
//! let account = westend
//! 	.fetch_once(
//! 		&"system.account".parse()?,
//! 		&[KeyParam::Address("5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY".into())],
//! 	)
//! 	.await?;
//! println!("free balance: {}", account["data"]["free"]);
//! registry.shutdown()?;
//! # Ok(())
//! # }
//! ```

pub mod account;
mod chain;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod jsonrpc;
pub mod metadata;
pub mod registry;
mod storage;
pub mod storage_key;
mod strings;
#[cfg(test)]
mod testing;
pub mod transport;

pub use chain::{ChainContext, ChainRegistry, RuntimeVersion};
pub use codec::{ScaleDecoder, ScaleEncoder};
pub use config::{AddressFormat, ChainEndpoint, ConnectionConfig, ReconnectPolicy};
pub use connection::{
	Connection, ConnectionState, OperationHandle, OperationId, SubscriptionRequest, SubscriptionStream,
};
pub use error::{
	ChainRegistryError, CodecError, ConnectionError, MetadataError, StorageKeyError,
	StorageRequestError, TypeRegistryError,
};
pub use metadata::{
	RuntimeMetadata, StorageEntry, StorageEntryKind, StorageHasher, StorageKeyPart, StorageModifier,
	StoragePath,
};
pub use registry::{TypeDefinition, TypeRegistry, as_u128};
pub use storage::{StorageRequestPerformer, StorageSubscription};
pub use storage_key::{KeyParam, StorageKey, build_storage_key};
pub use strings::rpc::methods;
pub use transport::{Transport, TransportChannel, TransportEvent, WsTransport};
