// SPDX-License-Identifier: GPL-3.0

//! The set of chains an application is connected to.
//!
//! A [`ChainRegistry`] is created by the application and owns one [`ChainContext`] per chain.
//! Each context pairs the chain's [`Connection`] with its current [`RuntimeMetadata`]. Metadata
//! is swapped whole on runtime upgrades; performers and subscriptions created before the swap keep
//! decoding against the snapshot they started with.

use crate::{
	config::{ChainEndpoint, ConnectionConfig},
	connection::Connection,
	error::{ChainRegistryError, StorageRequestError},
	metadata::{RuntimeMetadata, StoragePath},
	storage::{StorageRequestPerformer, StorageSubscription, from_hex},
	storage_key::{KeyParam, StorageKey},
	strings::rpc::{methods, targets},
	transport::{Transport, WsTransport},
};
use log::{debug, info};
use serde::Deserialize;
use serde_json::{Value, json};
use std::{
	collections::HashMap,
	sync::{Arc, PoisonError, RwLock},
};

/// Version information of a chain's runtime.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeVersion {
	pub spec_name: String,
	pub spec_version: u32,
	#[serde(default)]
	pub transaction_version: u32,
}

/// A registered chain: its connection and current runtime metadata.
#[derive(Debug)]
pub struct ChainContext {
	connection: Connection,
	runtime: RwLock<Option<Arc<RuntimeMetadata>>>,
}

impl ChainContext {
	pub fn chain_id(&self) -> &str {
		&self.connection.endpoint().chain_id
	}

	pub fn endpoint(&self) -> &ChainEndpoint {
		self.connection.endpoint()
	}

	pub fn connection(&self) -> &Connection {
		&self.connection
	}

	/// The current runtime metadata, if installed.
	pub fn runtime(&self) -> Option<Arc<RuntimeMetadata>> {
		// Writers only swap the `Arc`, so a poisoned lock still holds a complete snapshot.
		self.runtime.read().unwrap_or_else(PoisonError::into_inner).clone()
	}

	fn set_runtime(&self, metadata: Arc<RuntimeMetadata>) {
		*self.runtime.write().unwrap_or_else(PoisonError::into_inner) = Some(metadata);
	}

	/// A storage performer bound to the current runtime metadata.
	pub fn storage(&self) -> Result<StorageRequestPerformer, StorageRequestError> {
		let metadata = self
			.runtime()
			.ok_or_else(|| StorageRequestError::RuntimeUnavailable(self.chain_id().to_string()))?;
		Ok(StorageRequestPerformer::new(self.connection.clone(), metadata))
	}

	/// See [`StorageRequestPerformer::fetch_once`].
	pub async fn fetch_once(
		&self,
		path: &StoragePath,
		params: &[KeyParam],
	) -> Result<Value, StorageRequestError> {
		self.storage()?.fetch_once(path, params).await
	}

	/// See [`StorageRequestPerformer::fetch_many`].
	pub async fn fetch_many(
		&self,
		requests: &[(StoragePath, Vec<KeyParam>)],
	) -> Result<Vec<Value>, StorageRequestError> {
		self.storage()?.fetch_many(requests).await
	}

	/// See [`StorageRequestPerformer::fetch_raw`].
	pub async fn fetch_raw(
		&self,
		key: &StorageKey,
		value_type: &str,
	) -> Result<Value, StorageRequestError> {
		self.storage()?.fetch_raw(key, value_type).await
	}

	/// See [`StorageRequestPerformer::observe`].
	pub fn observe(
		&self,
		path: &StoragePath,
		params: &[KeyParam],
	) -> Result<StorageSubscription, StorageRequestError> {
		self.storage()?.observe(path, params)
	}

	/// Query the runtime version the chain is currently running.
	///
	/// A `spec_version` different from the installed metadata's means the metadata must be
	/// reloaded, see [`Self::load_runtime`].
	pub async fn runtime_version(&self) -> Result<RuntimeVersion, StorageRequestError> {
		let response = self.connection.request(methods::STATE_GET_RUNTIME_VERSION, json!([])).await?;
		serde_json::from_value(response)
			.map_err(|e| StorageRequestError::InvalidResponse(e.to_string()))
	}

	/// Load the runtime metadata from the node and install it.
	///
	/// Metadata is fetched only when the node reports a spec version other than the installed
	/// one; otherwise the installed snapshot is returned. Performers and subscriptions created
	/// before an upgrade keep decoding against their own snapshot.
	pub async fn load_runtime(&self) -> Result<Arc<RuntimeMetadata>, StorageRequestError> {
		let version = self.runtime_version().await?;
		if let Some(current) = self.runtime().filter(|r| r.spec_version() == version.spec_version) {
			debug!(
				target: targets::CONNECTION,
				"{}: runtime spec version {} already loaded",
				self.chain_id(),
				version.spec_version
			);
			return Ok(current);
		}
		let response = self.connection.request(methods::STATE_GET_METADATA, json!([])).await?;
		let Some(text) = response.as_str() else {
			return Err(StorageRequestError::InvalidResponse(response.to_string()));
		};
		let metadata = Arc::new(RuntimeMetadata::from_bytes(version.spec_version, &from_hex(text)?)?);
		info!(
			target: targets::CONNECTION,
			"{}: loaded runtime metadata for {} spec version {}",
			self.chain_id(),
			version.spec_name,
			version.spec_version
		);
		self.set_runtime(metadata.clone());
		Ok(metadata)
	}
}

/// Chains known to the application, keyed by chain id.
pub struct ChainRegistry {
	config: ConnectionConfig,
	transport: Arc<dyn Transport>,
	chains: RwLock<HashMap<String, Arc<ChainContext>>>,
}

impl ChainRegistry {
	/// Create an empty registry connecting over WebSockets.
	pub fn new(config: ConnectionConfig) -> Self {
		Self::with_transport(config, Arc::new(WsTransport))
	}

	/// Create an empty registry connecting over `transport`.
	pub fn with_transport(config: ConnectionConfig, transport: Arc<dyn Transport>) -> Self {
		Self { config, transport, chains: RwLock::new(HashMap::new()) }
	}

	/// Register a chain and start connecting to it.
	///
	/// Storage cannot be accessed until runtime metadata is installed with
	/// [`Self::update_runtime`].
	pub fn add_chain(&self, endpoint: ChainEndpoint) -> Result<Arc<ChainContext>, ChainRegistryError> {
		let mut chains = self.chains.write().map_err(|e| ChainRegistryError::Lock(e.to_string()))?;
		let chain_id = endpoint.chain_id.clone();
		if chains.contains_key(&chain_id) {
			return Err(ChainRegistryError::DuplicateChain(chain_id));
		}
		let connection =
			Connection::with_transport(endpoint, self.config.clone(), self.transport.clone())
				.map_err(|_| ChainRegistryError::NoEndpoints(chain_id.clone()))?;
		let context = Arc::new(ChainContext { connection, runtime: RwLock::new(None) });
		info!(target: targets::CONNECTION, "registered chain {chain_id}");
		chains.insert(chain_id, context.clone());
		Ok(context)
	}

	/// Unregister a chain and close its connection.
	pub fn remove_chain(&self, chain_id: &str) -> Result<(), ChainRegistryError> {
		let context = self
			.chains
			.write()
			.map_err(|e| ChainRegistryError::Lock(e.to_string()))?
			.remove(chain_id)
			.ok_or_else(|| ChainRegistryError::UnknownChain(chain_id.to_string()))?;
		context.connection.close();
		info!(target: targets::CONNECTION, "removed chain {chain_id}");
		Ok(())
	}

	pub fn chain(&self, chain_id: &str) -> Result<Arc<ChainContext>, ChainRegistryError> {
		self.chains
			.read()
			.map_err(|e| ChainRegistryError::Lock(e.to_string()))?
			.get(chain_id)
			.cloned()
			.ok_or_else(|| ChainRegistryError::UnknownChain(chain_id.to_string()))
	}

	/// Ids of all registered chains, sorted.
	pub fn chain_ids(&self) -> Result<Vec<String>, ChainRegistryError> {
		let mut ids: Vec<String> = self
			.chains
			.read()
			.map_err(|e| ChainRegistryError::Lock(e.to_string()))?
			.keys()
			.cloned()
			.collect();
		ids.sort();
		Ok(ids)
	}

	/// Install runtime metadata for a chain, replacing the previous version.
	pub fn update_runtime(
		&self,
		chain_id: &str,
		metadata: RuntimeMetadata,
	) -> Result<Arc<RuntimeMetadata>, ChainRegistryError> {
		let context = self.chain(chain_id)?;
		let metadata = Arc::new(metadata);
		info!(
			target: targets::CONNECTION,
			"{chain_id}: installed runtime metadata for spec version {}",
			metadata.spec_version()
		);
		context.set_runtime(metadata.clone());
		Ok(metadata)
	}

	/// Close every connection and forget all chains.
	pub fn shutdown(&self) -> Result<(), ChainRegistryError> {
		let chains =
			std::mem::take(&mut *self.chains.write().map_err(|e| ChainRegistryError::Lock(e.to_string()))?);
		for context in chains.values() {
			context.connection.close();
		}
		info!(target: targets::CONNECTION, "shut down {} chains", chains.len());
		Ok(())
	}
}

impl std::fmt::Debug for ChainRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ChainRegistry").field("config", &self.config).finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		error::{ConnectionError, MetadataError},
		metadata::frame::tests::sample_metadata,
		registry::tests::test_registry,
		testing::{MockServer, MockTransport, endpoint},
	};

	fn registry() -> (ChainRegistry, MockServer) {
		let (transport, server) = MockTransport::new();
		(ChainRegistry::with_transport(ConnectionConfig::default(), Arc::new(transport)), server)
	}

	#[tokio::test]
	async fn add_and_look_up_chains() {
		let (registry, _server) = registry();
		let context = registry.add_chain(endpoint("westend")).unwrap();
		assert_eq!(context.chain_id(), "westend");
		assert!(Arc::ptr_eq(&registry.chain("westend").unwrap(), &context));
		assert_eq!(
			registry.add_chain(endpoint("westend")).unwrap_err(),
			ChainRegistryError::DuplicateChain("westend".into())
		);
		assert_eq!(
			registry.chain("kusama").unwrap_err(),
			ChainRegistryError::UnknownChain("kusama".into())
		);

		let mut empty = endpoint("paseo");
		empty.urls.clear();
		assert_eq!(
			registry.add_chain(empty).unwrap_err(),
			ChainRegistryError::NoEndpoints("paseo".into())
		);
		assert_eq!(registry.chain_ids().unwrap(), vec!["westend".to_string()]);
	}

	#[tokio::test]
	async fn storage_requires_runtime_metadata() {
		let (registry, _server) = registry();
		let context = registry.add_chain(endpoint("westend")).unwrap();
		assert_eq!(
			context.storage().unwrap_err(),
			StorageRequestError::RuntimeUnavailable("westend".into())
		);
		registry.update_runtime("westend", RuntimeMetadata::new(1, test_registry())).unwrap();
		assert!(context.storage().is_ok());
		assert!(registry.update_runtime("kusama", RuntimeMetadata::new(1, test_registry())).is_err());
	}

	#[tokio::test]
	async fn runtime_upgrade_keeps_old_snapshots_valid() {
		let (registry, _server) = registry();
		let context = registry.add_chain(endpoint("westend")).unwrap();
		registry.update_runtime("westend", RuntimeMetadata::new(1, test_registry())).unwrap();
		let before = context.storage().unwrap();

		registry.update_runtime("westend", RuntimeMetadata::new(2, test_registry())).unwrap();
		assert_eq!(before.metadata().spec_version(), 1);
		assert_eq!(context.storage().unwrap().metadata().spec_version(), 2);
		assert_eq!(context.runtime().unwrap().spec_version(), 2);
	}

	#[tokio::test]
	async fn runtime_version_is_queried_from_the_node() {
		let (registry, mut server) = registry();
		let context = registry.add_chain(endpoint("westend")).unwrap();
		let query = tokio::spawn({
			let context = context.clone();
			async move { context.runtime_version().await }
		});
		server.accept().await;
		let request = server.next_request().await;
		assert_eq!(request["method"], "state_getRuntimeVersion");
		server.respond(
			&request,
			json!({
				"specName": "westend",
				"implName": "parity-westend",
				"specVersion": 1_016_001,
				"transactionVersion": 27,
				"apis": [],
			}),
		);
		assert_eq!(
			query.await.unwrap().unwrap(),
			RuntimeVersion { spec_name: "westend".into(), spec_version: 1_016_001, transaction_version: 27 }
		);
	}

	// Answer the version query and, when asked, the metadata query.
	async fn serve_runtime(server: &mut MockServer, spec_version: u32, metadata: Option<Vec<u8>>) {
		let request = server.next_request().await;
		assert_eq!(request["method"], "state_getRuntimeVersion");
		server.respond(&request, json!({ "specName": "westend", "specVersion": spec_version }));
		if let Some(metadata) = metadata {
			let request = server.next_request().await;
			assert_eq!(request["method"], "state_getMetadata");
			server.respond(&request, json!(format!("0x{}", hex::encode(metadata))));
		}
	}

	#[tokio::test]
	async fn runtime_is_loaded_once_per_spec_version() {
		let (registry, mut server) = registry();
		let context = registry.add_chain(endpoint("westend")).unwrap();
		server.accept().await;

		let load = tokio::spawn({
			let context = context.clone();
			async move { context.load_runtime().await }
		});
		serve_runtime(&mut server, 1_016_001, Some(sample_metadata(14))).await;
		let first = load.await.unwrap().unwrap();
		assert_eq!(first.spec_version(), 1_016_001);
		assert!(Arc::ptr_eq(&context.runtime().unwrap(), &first));
		assert!(first.entry(&"system.account".parse().unwrap()).is_ok());

		// Same version: no metadata request.
		let load = tokio::spawn({
			let context = context.clone();
			async move { context.load_runtime().await }
		});
		serve_runtime(&mut server, 1_016_001, None).await;
		assert!(Arc::ptr_eq(&load.await.unwrap().unwrap(), &first));

		// Upgrade: reloaded, while earlier performers keep their snapshot.
		let before = context.storage().unwrap();
		let load = tokio::spawn({
			let context = context.clone();
			async move { context.load_runtime().await }
		});
		serve_runtime(&mut server, 1_017_000, Some(sample_metadata(15))).await;
		assert_eq!(load.await.unwrap().unwrap().spec_version(), 1_017_000);
		assert_eq!(context.runtime().unwrap().spec_version(), 1_017_000);
		assert_eq!(before.metadata().spec_version(), 1_016_001);
	}

	#[tokio::test]
	async fn undecodable_metadata_leaves_the_runtime_unset() {
		let (registry, mut server) = registry();
		let context = registry.add_chain(endpoint("westend")).unwrap();
		server.accept().await;
		let load = tokio::spawn({
			let context = context.clone();
			async move { context.load_runtime().await }
		});
		serve_runtime(&mut server, 1, Some(vec![0xde, 0xad, 0xbe, 0xef])).await;
		assert_eq!(
			load.await.unwrap().unwrap_err(),
			StorageRequestError::Metadata(MetadataError::MissingMagic)
		);
		assert!(context.runtime().is_none());
	}

	#[tokio::test]
	async fn removing_a_chain_closes_its_connection() {
		let (registry, mut server) = registry();
		let context = registry.add_chain(endpoint("westend")).unwrap();
		server.accept().await;
		registry.remove_chain("westend").unwrap();
		assert!(context.connection().is_closed());
		assert_eq!(
			context.connection().request("system_chain", json!([])).await,
			Err(ConnectionError::Closed)
		);
		assert_eq!(
			registry.remove_chain("westend").unwrap_err(),
			ChainRegistryError::UnknownChain("westend".into())
		);
	}

	#[tokio::test]
	async fn shutdown_closes_everything() {
		let (registry, _server) = registry();
		let westend = registry.add_chain(endpoint("westend")).unwrap();
		let paseo = registry.add_chain(endpoint("paseo")).unwrap();
		registry.shutdown().unwrap();
		assert!(westend.connection().is_closed());
		assert!(paseo.connection().is_closed());
		assert!(registry.chain_ids().unwrap().is_empty());
	}
}
