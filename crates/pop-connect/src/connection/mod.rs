// SPDX-License-Identifier: GPL-3.0

//! One persistent connection per chain.
//!
//! A [`Connection`] is a cheap, cloneable handle to a worker task that owns the socket and the
//! request/subscription bookkeeping. Callers never touch that state directly: every operation is
//! enqueued as a command and takes effect on the worker's next turn. Results come back through
//! callbacks; [`Connection::request`] and [`Connection::subscribe_stream`] adapt those into a
//! future and a stream.
//!
//! # Lifecycle
//!
//! ```text
//!                 ┌──────────────┐  open   ┌───────────┐
//!   spawn ──────► │  Connecting  │ ──────► │ Connected │
//!                 └──────────────┘         └───────────┘
//!                   ▲        │ error             │ error / close
//!         back-off  │        ▼                   ▼
//!                 ┌─────────────────────────────────────┐
//!                 │            Disconnected             │
//!                 └─────────────────────────────────────┘
//! ```
//!
//! On entering `Connected` the worker first flushes operations queued while disconnected, then
//! re-issues every subscription created with `resend_on_reconnect`, keeping its callbacks.

mod bridge;
mod multiplexer;
mod worker;

pub use bridge::SubscriptionStream;

use crate::{
	config::{ChainEndpoint, ConnectionConfig},
	error::ConnectionError,
	transport::{Transport, WsTransport},
};
use serde_json::Value;
use std::{
	sync::{
		Arc,
		atomic::{AtomicU64, Ordering},
	},
	time::Duration,
};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use worker::{Command, Worker};

/// Completion of a one-shot request.
pub type ResponseCallback = Box<dyn FnOnce(Result<Value, ConnectionError>) + Send>;
/// Delivery of one subscription notification.
pub type UpdateCallback = Box<dyn FnMut(Value) + Send>;
/// Terminal failure of a subscription.
pub type FailureCallback = Box<dyn FnOnce(ConnectionError) + Send>;

/// Transport-local JSON-RPC request id. Unique per connection while in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u16);

/// Stable handle to a request or subscription for its whole lifetime.
///
/// Unlike [`RequestId`], which a resilient subscription gets anew on every reconnect, the
/// operation id never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(pub u64);

/// Transport state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
	Disconnected,
	Connecting,
	Connected,
}

/// A long-lived subscription call.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionRequest {
	/// Subscribe method, e.g. `state_subscribeStorage`.
	pub method: String,
	pub params: Value,
	/// Method called with the remote id when the subscription is cancelled.
	pub unsubscribe_method: String,
	/// Re-issue the subscription transparently after every reconnect.
	pub resend_on_reconnect: bool,
}

impl SubscriptionRequest {
	/// A subscription that is resent after reconnects.
	pub fn new(
		method: impl Into<String>,
		params: Value,
		unsubscribe_method: impl Into<String>,
	) -> Self {
		Self {
			method: method.into(),
			params,
			unsubscribe_method: unsubscribe_method.into(),
			resend_on_reconnect: true,
		}
	}

	pub fn resend_on_reconnect(mut self, resend: bool) -> Self {
		self.resend_on_reconnect = resend;
		self
	}
}

/// Handle to a submitted request or subscription.
///
/// Dropping the handle does not cancel the operation; call [`OperationHandle::cancel`].
#[derive(Debug, Clone)]
pub struct OperationHandle {
	id: OperationId,
	commands: mpsc::UnboundedSender<Command>,
}

impl OperationHandle {
	pub fn id(&self) -> OperationId {
		self.id
	}

	/// Cancel the operation. Fire-and-forget: nothing is delivered for it once the connection
	/// processes the cancellation, including frames already in flight.
	pub fn cancel(&self) {
		let _ = self.commands.send(Command::Cancel(self.id));
	}
}

/// Handle to the connection of one chain.
#[derive(Debug, Clone)]
pub struct Connection {
	inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
	endpoint: ChainEndpoint,
	commands: mpsc::UnboundedSender<Command>,
	state: watch::Receiver<ConnectionState>,
	shutdown: CancellationToken,
	next_operation: AtomicU64,
	request_timeout: Option<Duration>,
}

impl Drop for Inner {
	fn drop(&mut self) {
		self.shutdown.cancel();
	}
}

impl Connection {
	/// Open a WebSocket connection to `endpoint`.
	///
	/// Returns immediately; the socket is opened in the background and operations submitted
	/// before it is up are queued. Must be called within a Tokio runtime.
	pub fn open(endpoint: ChainEndpoint, config: ConnectionConfig) -> Result<Self, ConnectionError> {
		Self::with_transport(endpoint, config, Arc::new(WsTransport))
	}

	/// Open a connection over a custom transport.
	pub fn with_transport(
		endpoint: ChainEndpoint,
		config: ConnectionConfig,
		transport: Arc<dyn Transport>,
	) -> Result<Self, ConnectionError> {
		if endpoint.urls.is_empty() {
			return Err(ConnectionError::NoEndpoints(endpoint.chain_id));
		}
		let (commands_tx, commands_rx) = mpsc::unbounded_channel();
		let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
		let shutdown = CancellationToken::new();
		let worker = Worker::new(
			endpoint.clone(),
			config.reconnect,
			transport,
			commands_rx,
			commands_tx.downgrade(),
			state_tx,
			shutdown.clone(),
		);
		tokio::spawn(worker.run());
		Ok(Self {
			inner: Arc::new(Inner {
				endpoint,
				commands: commands_tx,
				state: state_rx,
				shutdown,
				next_operation: AtomicU64::new(0),
				request_timeout: config.request_timeout,
			}),
		})
	}

	pub fn endpoint(&self) -> &ChainEndpoint {
		&self.inner.endpoint
	}

	/// Current transport state.
	pub fn state(&self) -> ConnectionState {
		*self.inner.state.borrow()
	}

	/// Receiver of transport state transitions.
	pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
		self.inner.state.clone()
	}

	/// Send a one-shot request.
	///
	/// `on_complete` is called exactly once, on the connection's task, unless the request is
	/// cancelled first. Requests submitted while disconnected are queued. `timeout` (or the
	/// configured default) fails the request with [`ConnectionError::Timeout`] if no response
	/// arrived in time.
	pub fn send(
		&self,
		method: &str,
		params: Value,
		timeout: Option<Duration>,
		on_complete: ResponseCallback,
	) -> OperationHandle {
		let operation = self.next_operation();
		let command = Command::Request {
			operation,
			method: method.to_string(),
			params,
			timeout: timeout.or(self.inner.request_timeout),
			on_complete,
		};
		if let Err(mpsc::error::SendError(command)) = self.inner.commands.send(command) {
			command.fail(ConnectionError::Closed);
		}
		self.handle(operation)
	}

	/// Open a subscription.
	///
	/// `on_update` receives every notification in the order the socket delivered them.
	/// `on_failure` is called at most once, after which nothing more is delivered.
	pub fn subscribe(
		&self,
		request: SubscriptionRequest,
		on_update: UpdateCallback,
		on_failure: FailureCallback,
	) -> OperationHandle {
		let operation = self.next_operation();
		let command = Command::Subscribe { operation, request, on_update, on_failure };
		if let Err(mpsc::error::SendError(command)) = self.inner.commands.send(command) {
			command.fail(ConnectionError::Closed);
		}
		self.handle(operation)
	}

	/// Close the connection. Every outstanding operation fails with [`ConnectionError::Closed`].
	pub fn close(&self) {
		self.inner.shutdown.cancel();
	}

	/// Whether [`Self::close`] has been called.
	pub fn is_closed(&self) -> bool {
		self.inner.shutdown.is_cancelled()
	}

	fn next_operation(&self) -> OperationId {
		OperationId(self.inner.next_operation.fetch_add(1, Ordering::Relaxed))
	}

	fn handle(&self, id: OperationId) -> OperationHandle {
		OperationHandle { id, commands: self.inner.commands.clone() }
	}
}
