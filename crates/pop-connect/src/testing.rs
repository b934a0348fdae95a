// SPDX-License-Identifier: GPL-3.0

//! In-memory transport for exercising connections without a node.

use crate::{
	config::ChainEndpoint,
	connection::Connection,
	error::ConnectionError,
	transport::{Transport, TransportChannel, TransportEvent},
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::VecDeque;
use tokio::sync::{mpsc, oneshot};
use url::Url;

/// Alice's SS58 address (generic substrate prefix).
pub(crate) const ALICE_SS58: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";
/// Alice's account id.
pub(crate) const ALICE: &str = "0xd43593c715fdd31c61141abd04a99fd6822c8558854ccde39a5684e7a56da27d";

const FLUSH_METHOD: &str = "pop_flush";

/// An endpoint with two mock URLs.
pub(crate) fn endpoint(chain_id: &str) -> ChainEndpoint {
	let urls = ["ws://mock-1:9944", "ws://mock-2:9944"]
		.into_iter()
		.map(|url| Url::parse(url).unwrap())
		.collect();
	ChainEndpoint::new(chain_id, urls)
}

struct ConnectAttempt {
	url: Url,
	reply: oneshot::Sender<Result<TransportChannel, ConnectionError>>,
}

/// Client side: forwards connect attempts to the paired [`MockServer`].
pub(crate) struct MockTransport {
	attempts: mpsc::UnboundedSender<ConnectAttempt>,
}

impl MockTransport {
	pub(crate) fn new() -> (Self, MockServer) {
		let (attempts_tx, attempts_rx) = mpsc::unbounded_channel();
		let server = MockServer {
			attempts: attempts_rx,
			link: None,
			refusals: VecDeque::new(),
			skipped: VecDeque::new(),
		};
		(Self { attempts: attempts_tx }, server)
	}
}

#[async_trait]
impl Transport for MockTransport {
	async fn connect(&self, url: &Url) -> Result<TransportChannel, ConnectionError> {
		let failed = |message: &str| ConnectionError::ConnectionFailed {
			endpoint: url.to_string(),
			message: message.to_string(),
		};
		let (reply, response) = oneshot::channel();
		self.attempts
			.send(ConnectAttempt { url: url.clone(), reply })
			.map_err(|_| failed("server gone"))?;
		response.await.map_err(|_| failed("server gone"))?
	}
}

struct ServerLink {
	from_client: mpsc::UnboundedReceiver<String>,
	to_client: mpsc::UnboundedSender<TransportEvent>,
}

/// Server side of a [`MockTransport`]: accepts sockets and scripts responses.
pub(crate) struct MockServer {
	attempts: mpsc::UnboundedReceiver<ConnectAttempt>,
	link: Option<ServerLink>,
	refusals: VecDeque<String>,
	/// Frames read while looking for a flush marker.
	skipped: VecDeque<Value>,
}

impl MockServer {
	/// Fail the next connect attempt with `reason`.
	pub(crate) fn refuse_next(&mut self, reason: &str) {
		self.refusals.push_back(reason.to_string());
	}

	/// Wait for a connect attempt and open a socket, refusing attempts queued with
	/// [`Self::refuse_next`] first. Returns the URL that was connected to.
	pub(crate) async fn accept(&mut self) -> Url {
		loop {
			let attempt = self.attempts.recv().await.expect("transport dropped");
			if let Some(reason) = self.refusals.pop_front() {
				let _ = attempt.reply.send(Err(ConnectionError::ConnectionFailed {
					endpoint: attempt.url.to_string(),
					message: reason,
				}));
				continue;
			}
			let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
			let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
			self.link = Some(ServerLink { from_client: outbound_rx, to_client: inbound_tx });
			self.skipped.clear();
			let _ = attempt
				.reply
				.send(Ok(TransportChannel { outbound: outbound_tx, inbound: inbound_rx }));
			return attempt.url;
		}
	}

	/// Next frame written by the client, parsed.
	pub(crate) async fn next_request(&mut self) -> Value {
		if let Some(frame) = self.skipped.pop_front() {
			return frame;
		}
		self.recv_frame().await
	}

	async fn recv_frame(&mut self) -> Value {
		let link = self.link.as_mut().expect("no open socket");
		let text = link.from_client.recv().await.expect("client closed the socket");
		serde_json::from_str(&text).expect("client wrote invalid json")
	}

	/// Respond to `request` with `result`.
	pub(crate) fn respond(&self, request: &Value, result: Value) {
		self.send(json!({ "jsonrpc": "2.0", "id": request["id"], "result": result }));
	}

	/// Respond to `request` with a JSON-RPC error.
	pub(crate) fn respond_error(&self, request: &Value, code: i64, message: &str) {
		self.send(json!({
			"jsonrpc": "2.0",
			"id": request["id"],
			"error": { "code": code, "message": message },
		}));
	}

	/// Push a subscription notification.
	pub(crate) fn notify(&self, method: &str, subscription: &str, result: Value) {
		self.send(json!({
			"jsonrpc": "2.0",
			"method": method,
			"params": { "subscription": subscription, "result": result },
		}));
	}

	/// Write a raw text frame.
	pub(crate) fn send_raw(&self, text: &str) {
		if let Some(link) = &self.link {
			let _ = link.to_client.send(TransportEvent::Frame(text.to_string()));
		}
	}

	fn send(&self, frame: Value) {
		self.send_raw(&frame.to_string());
	}

	/// Close the open socket.
	pub(crate) fn drop_connection(&mut self, reason: &str) {
		if let Some(link) = self.link.take() {
			let _ = link.to_client.send(TransportEvent::Closed { reason: reason.to_string() });
		}
	}

	/// Wait until the connection has handled every frame sent so far.
	///
	/// Sends a marker request through `connection` and answers it; frames on a socket are
	/// handled in order, so everything written before the answer has been processed once the
	/// marker completes. Other frames read on the way remain available to
	/// [`Self::next_request`].
	pub(crate) async fn flush(&mut self, connection: &Connection) {
		let (done, finished) = oneshot::channel();
		connection.send(
			FLUSH_METHOD,
			json!([]),
			None,
			Box::new(move |_| {
				let _ = done.send(());
			}),
		);
		let mut skipped = VecDeque::new();
		loop {
			let frame = self.recv_frame().await;
			if frame["method"] == FLUSH_METHOD {
				self.respond(&frame, Value::Null);
				break;
			}
			skipped.push_back(frame);
		}
		self.skipped.extend(skipped);
		finished.await.expect("flush marker dropped");
	}
}
