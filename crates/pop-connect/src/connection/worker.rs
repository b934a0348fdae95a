// SPDX-License-Identifier: GPL-3.0

//! The task that owns a connection's socket and multiplexer.

use super::{
	ConnectionState, FailureCallback, OperationId, ResponseCallback, SubscriptionRequest,
	UpdateCallback, multiplexer::Multiplexer,
};
use crate::{
	config::{ChainEndpoint, ReconnectPolicy},
	error::ConnectionError,
	strings::rpc::targets,
	transport::{Transport, TransportChannel, TransportEvent},
};
use futures::future::BoxFuture;
use log::{debug, info, warn};
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tokio::{
	sync::{mpsc, watch},
	time::{Instant, sleep, sleep_until},
};
use tokio_util::sync::CancellationToken;

/// Work enqueued onto the connection task.
pub(crate) enum Command {
	Request {
		operation: OperationId,
		method: String,
		params: Value,
		timeout: Option<Duration>,
		on_complete: ResponseCallback,
	},
	Subscribe {
		operation: OperationId,
		request: SubscriptionRequest,
		on_update: UpdateCallback,
		on_failure: FailureCallback,
	},
	Cancel(OperationId),
	/// A request's timeout elapsed.
	Expire(OperationId),
}

impl Command {
	/// Deliver `error` to a command that will never be processed.
	pub(crate) fn fail(self, error: ConnectionError) {
		match self {
			Command::Request { on_complete, .. } => on_complete(Err(error)),
			Command::Subscribe { on_failure, .. } => on_failure(error),
			Command::Cancel(_) | Command::Expire(_) => {},
		}
	}
}

impl std::fmt::Debug for Command {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Command::Request { operation, method, .. } =>
				f.debug_struct("Request").field("operation", operation).field("method", method).finish(),
			Command::Subscribe { operation, request, .. } => f
				.debug_struct("Subscribe")
				.field("operation", operation)
				.field("method", &request.method)
				.finish(),
			Command::Cancel(operation) => f.debug_tuple("Cancel").field(operation).finish(),
			Command::Expire(operation) => f.debug_tuple("Expire").field(operation).finish(),
		}
	}
}

type ConnectFuture = BoxFuture<'static, Result<TransportChannel, ConnectionError>>;

enum Event {
	Shutdown,
	Command(Command),
	Inbound(Option<TransportEvent>),
	Opened(Result<TransportChannel, ConnectionError>),
	Retry,
}

pub(crate) struct Worker {
	endpoint: ChainEndpoint,
	policy: ReconnectPolicy,
	transport: Arc<dyn Transport>,
	commands: mpsc::UnboundedReceiver<Command>,
	/// Used by request timers; weak so that dropping every handle ends the task.
	timers: mpsc::WeakUnboundedSender<Command>,
	state: watch::Sender<ConnectionState>,
	shutdown: CancellationToken,
	multiplexer: Multiplexer,
	link: Option<TransportChannel>,
	connecting: Option<ConnectFuture>,
	retry_at: Option<Instant>,
	/// Index into the endpoint's URLs of the next connection attempt.
	url_index: usize,
	/// Consecutive failed attempts since the last successful open.
	failures: u32,
}

impl Worker {
	pub(crate) fn new(
		endpoint: ChainEndpoint,
		policy: ReconnectPolicy,
		transport: Arc<dyn Transport>,
		commands: mpsc::UnboundedReceiver<Command>,
		timers: mpsc::WeakUnboundedSender<Command>,
		state: watch::Sender<ConnectionState>,
		shutdown: CancellationToken,
	) -> Self {
		Self {
			endpoint,
			policy,
			transport,
			commands,
			timers,
			state,
			shutdown,
			multiplexer: Multiplexer::new(),
			link: None,
			connecting: None,
			retry_at: None,
			url_index: 0,
			failures: 0,
		}
	}

	pub(crate) async fn run(mut self) {
		self.start_connecting();
		loop {
			let event = tokio::select! {
				biased;

				_ = self.shutdown.cancelled() => Event::Shutdown,

				command = self.commands.recv() => match command {
					Some(command) => Event::Command(command),
					None => Event::Shutdown,
				},

				inbound = next_inbound(&mut self.link) => Event::Inbound(inbound),

				opened = next_open(&mut self.connecting) => Event::Opened(opened),

				_ = wait_until(self.retry_at) => Event::Retry,
			};
			match event {
				Event::Shutdown => break,
				Event::Command(command) => self.handle_command(command),
				Event::Inbound(Some(TransportEvent::Frame(text))) => self.multiplexer.on_frame(&text),
				Event::Inbound(Some(TransportEvent::Closed { reason })) => self.on_closed(&reason),
				Event::Inbound(None) => self.on_closed("transport ended"),
				Event::Opened(result) => {
					self.connecting = None;
					self.on_opened(result);
				},
				Event::Retry => {
					self.retry_at = None;
					self.start_connecting();
				},
			}
			self.flush();
		}
		self.close();
	}

	fn handle_command(&mut self, command: Command) {
		match command {
			Command::Request { operation, method, params, timeout, on_complete } => {
				if let Some(timeout) = timeout {
					self.start_timer(operation, timeout);
				}
				self.multiplexer.request(operation, method, params, on_complete);
			},
			Command::Subscribe { operation, request, on_update, on_failure } =>
				self.multiplexer.subscribe(operation, request, on_update, on_failure),
			Command::Cancel(operation) => self.multiplexer.cancel(operation),
			Command::Expire(operation) => self.multiplexer.expire(operation),
		}
	}

	// The timer runs independently of this task and enqueues an expiry; it is a no-op if the
	// response arrived first.
	fn start_timer(&self, operation: OperationId, timeout: Duration) {
		let timers = self.timers.clone();
		tokio::spawn(async move {
			sleep(timeout).await;
			if let Some(commands) = timers.upgrade() {
				let _ = commands.send(Command::Expire(operation));
			}
		});
	}

	fn start_connecting(&mut self) {
		let url = self.endpoint.urls[self.url_index % self.endpoint.urls.len()].clone();
		debug!(target: targets::CONNECTION, "{}: connecting to {url}", self.endpoint.chain_id);
		self.state.send_replace(ConnectionState::Connecting);
		let transport = self.transport.clone();
		self.connecting = Some(Box::pin(async move { transport.connect(&url).await }));
	}

	fn on_opened(&mut self, result: Result<TransportChannel, ConnectionError>) {
		match result {
			Ok(channel) => {
				info!(
					target: targets::CONNECTION,
					"{}: connected to {}",
					self.endpoint.chain_id,
					self.current_url()
				);
				self.failures = 0;
				self.link = Some(channel);
				self.state.send_replace(ConnectionState::Connected);
				self.multiplexer.on_connected();
			},
			Err(e) => {
				warn!(target: targets::CONNECTION, "{}: {e}", self.endpoint.chain_id);
				self.schedule_retry();
			},
		}
	}

	fn on_closed(&mut self, reason: &str) {
		warn!(
			target: targets::CONNECTION,
			"{}: connection to {} dropped: {reason}",
			self.endpoint.chain_id,
			self.current_url()
		);
		self.link = None;
		self.multiplexer.on_disconnected(reason);
		self.schedule_retry();
	}

	// Move on to the next URL after a back-off.
	fn schedule_retry(&mut self) {
		self.state.send_replace(ConnectionState::Disconnected);
		let delay = self.policy.delay(self.failures);
		self.failures = self.failures.saturating_add(1);
		self.url_index = (self.url_index + 1) % self.endpoint.urls.len();
		debug!(
			target: targets::CONNECTION,
			"{}: reconnecting in {delay:?} ({} operations waiting)",
			self.endpoint.chain_id,
			self.multiplexer.len()
		);
		self.retry_at = Some(Instant::now() + delay);
	}

	fn flush(&mut self) {
		let frames = self.multiplexer.take_outbound();
		let Some(link) = &self.link else {
			return;
		};
		for frame in frames {
			if link.outbound.send(frame).is_err() {
				// The socket is gone; its close event follows.
				break;
			}
		}
	}

	fn close(mut self) {
		info!(target: targets::CONNECTION, "{}: closing connection", self.endpoint.chain_id);
		self.link = None;
		self.connecting = None;
		self.multiplexer.close();
		self.commands.close();
		while let Ok(command) = self.commands.try_recv() {
			command.fail(ConnectionError::Closed);
		}
		self.state.send_replace(ConnectionState::Disconnected);
	}

	fn current_url(&self) -> &url::Url {
		&self.endpoint.urls[self.url_index % self.endpoint.urls.len()]
	}
}

async fn next_inbound(link: &mut Option<TransportChannel>) -> Option<TransportEvent> {
	match link {
		Some(link) => link.inbound.recv().await,
		None => std::future::pending().await,
	}
}

async fn next_open(connecting: &mut Option<ConnectFuture>) -> Result<TransportChannel, ConnectionError> {
	match connecting {
		Some(future) => future.await,
		None => std::future::pending().await,
	}
}

async fn wait_until(deadline: Option<Instant>) {
	match deadline {
		Some(deadline) => sleep_until(deadline).await,
		None => std::future::pending().await,
	}
}
