// SPDX-License-Identifier: GPL-3.0

//! Error types for chain connectivity and storage access.
//!
//! Errors are organized by the layer that raises them:
//!
//! - [`codec::CodecError`] - Out-of-bounds reads and malformed primitives in the binary codec.
//! - [`registry::TypeRegistryError`] - Type name resolution and dynamic encode/decode failures.
//! - [`metadata::MetadataError`] - Runtime metadata that cannot be decoded or imported.
//! - [`storage_key::StorageKeyError`] - Malformed storage paths or key parameters, detected
//!   before any network I/O.
//! - [`connection::ConnectionError`] - Transport and JSON-RPC failures.
//! - [`storage::StorageRequestError`] - Everything surfaced to callers of the storage performer.
//! - [`chain::ChainRegistryError`] - Chain registration and lookup failures.

pub mod chain;
pub mod codec;
pub mod connection;
pub mod metadata;
pub mod registry;
pub mod storage;
pub mod storage_key;

pub use chain::ChainRegistryError;
pub use codec::CodecError;
pub use connection::ConnectionError;
pub use metadata::MetadataError;
pub use registry::TypeRegistryError;
pub use storage::StorageRequestError;
pub use storage_key::StorageKeyError;
