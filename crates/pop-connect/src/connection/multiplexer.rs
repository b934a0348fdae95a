// SPDX-License-Identifier: GPL-3.0

//! Request and subscription bookkeeping for one connection.
//!
//! The multiplexer owns every in-flight operation and is driven exclusively by the connection
//! worker, so none of its maps need locking. It performs no I/O: frames to write are collected in
//! an outbox the worker drains after each call.
//!
//! ```text
//!              request/subscribe                    on_frame
//!   caller ──────────────────────► operations ◄──────────────── socket
//!                                      │
//!            ┌─────────────────────────┼─────────────────────────┐
//!            ▼                         ▼                         ▼
//!   pending: RequestId ──►   remote_ids: RemoteId ──►   unsent / dormant
//!   (awaiting response)      (acknowledged subs)        (waiting for a socket)
//! ```

use super::{
	FailureCallback, OperationId, RequestId, ResponseCallback, SubscriptionRequest, UpdateCallback,
};
use crate::{
	error::ConnectionError,
	jsonrpc::{self, InboundFrame, RemoteId},
	strings::rpc::targets,
};
use log::{debug, warn};
use serde_json::{Value, json};
use std::collections::{BTreeSet, HashMap, VecDeque};

/// Number of distinct request ids.
const REQUEST_ID_SPACE: usize = u16::MAX as usize + 1;

struct RequestEntry {
	method: String,
	params: Value,
	on_complete: ResponseCallback,
	request_id: Option<RequestId>,
}

struct SubscriptionEntry {
	request: SubscriptionRequest,
	on_update: UpdateCallback,
	on_failure: FailureCallback,
	request_id: Option<RequestId>,
	remote_id: Option<RemoteId>,
}

enum Operation {
	Request(RequestEntry),
	Subscription(SubscriptionEntry),
}

/// What a sent request id is waiting for.
enum Pending {
	/// The response to a one-shot request.
	Request(OperationId),
	/// The remote id of a subscription.
	Subscribe(OperationId),
	/// The remote id of a subscription cancelled before it was acknowledged, which is then
	/// unsubscribed with the given method.
	CancelledSubscribe { unsubscribe_method: String },
	/// The response to an unsubscribe sent on a caller's behalf.
	Unsubscribe,
}

pub(crate) struct Multiplexer {
	connected: bool,
	next_request_id: u16,
	operations: HashMap<OperationId, Operation>,
	pending: HashMap<RequestId, Pending>,
	/// Request ids held by acknowledged subscriptions.
	subscription_ids: HashMap<RequestId, OperationId>,
	remote_ids: HashMap<RemoteId, OperationId>,
	/// Operations submitted while disconnected, in submission order.
	unsent: VecDeque<OperationId>,
	/// Resilient subscriptions waiting to be re-issued after a reconnect.
	dormant: BTreeSet<OperationId>,
	outbox: Vec<String>,
}

impl Multiplexer {
	pub(crate) fn new() -> Self {
		Self {
			connected: false,
			next_request_id: 0,
			operations: HashMap::new(),
			pending: HashMap::new(),
			subscription_ids: HashMap::new(),
			remote_ids: HashMap::new(),
			unsent: VecDeque::new(),
			dormant: BTreeSet::new(),
			outbox: Vec::new(),
		}
	}

	/// Frames to write, in order.
	pub(crate) fn take_outbound(&mut self) -> Vec<String> {
		std::mem::take(&mut self.outbox)
	}

	/// Number of live requests and subscriptions.
	pub(crate) fn len(&self) -> usize {
		self.operations.len()
	}

	/// Submit a one-shot request.
	pub(crate) fn request(
		&mut self,
		operation: OperationId,
		method: String,
		params: Value,
		on_complete: ResponseCallback,
	) {
		self.operations.insert(
			operation,
			Operation::Request(RequestEntry { method, params, on_complete, request_id: None }),
		);
		self.submit(operation);
	}

	/// Open a subscription.
	pub(crate) fn subscribe(
		&mut self,
		operation: OperationId,
		request: SubscriptionRequest,
		on_update: UpdateCallback,
		on_failure: FailureCallback,
	) {
		self.operations.insert(
			operation,
			Operation::Subscription(SubscriptionEntry {
				request,
				on_update,
				on_failure,
				request_id: None,
				remote_id: None,
			}),
		);
		self.submit(operation);
	}

	fn submit(&mut self, operation: OperationId) {
		if self.connected {
			self.send(operation);
		} else {
			self.unsent.push_back(operation);
		}
	}

	// Assign a request id to `operation` and queue its frame.
	fn send(&mut self, operation: OperationId) {
		let Some(request_id) = self.allocate_id() else {
			self.fail(operation, ConnectionError::RequestIdsExhausted);
			return;
		};
		let frame = match self.operations.get_mut(&operation) {
			Some(Operation::Request(entry)) => {
				entry.request_id = Some(request_id);
				self.pending.insert(request_id, Pending::Request(operation));
				jsonrpc::request_frame(request_id.0, &entry.method, &entry.params)
			},
			Some(Operation::Subscription(entry)) => {
				entry.request_id = Some(request_id);
				self.pending.insert(request_id, Pending::Subscribe(operation));
				jsonrpc::request_frame(request_id.0, &entry.request.method, &entry.request.params)
			},
			None => return,
		};
		self.outbox.push(frame);
	}

	fn allocate_id(&mut self) -> Option<RequestId> {
		if self.pending.len() + self.subscription_ids.len() >= REQUEST_ID_SPACE {
			return None;
		}
		loop {
			let id = RequestId(self.next_request_id);
			self.next_request_id = self.next_request_id.wrapping_add(1);
			if !self.pending.contains_key(&id) && !self.subscription_ids.contains_key(&id) {
				return Some(id);
			}
		}
	}

	/// Cancel an operation. Nothing is delivered for it afterwards.
	pub(crate) fn cancel(&mut self, operation: OperationId) {
		let Some(entry) = self.operations.remove(&operation) else {
			return;
		};
		self.unsent.retain(|op| *op != operation);
		self.dormant.remove(&operation);
		match entry {
			Operation::Request(entry) => {
				if let Some(id) = entry.request_id {
					self.pending.remove(&id);
				}
			},
			Operation::Subscription(entry) => {
				if let Some(id) = entry.request_id {
					self.subscription_ids.remove(&id);
					if let Some(pending) = self.pending.get_mut(&id) {
						// Unsubscribe once the remote id is known.
						*pending = Pending::CancelledSubscribe {
							unsubscribe_method: entry.request.unsubscribe_method.clone(),
						};
					}
				}
				if let Some(remote_id) = entry.remote_id {
					self.remote_ids.remove(&remote_id);
					self.unsubscribe(&entry.request.unsubscribe_method, remote_id);
				}
			},
		}
	}

	fn unsubscribe(&mut self, method: &str, remote_id: RemoteId) {
		if !self.connected {
			return;
		}
		let Some(request_id) = self.allocate_id() else {
			return;
		};
		self.pending.insert(request_id, Pending::Unsubscribe);
		self.outbox.push(jsonrpc::request_frame(request_id.0, method, &json!([remote_id])));
	}

	/// Fail a request whose timeout elapsed. A no-op if it already completed.
	pub(crate) fn expire(&mut self, operation: OperationId) {
		let method = match self.operations.get(&operation) {
			Some(Operation::Request(entry)) => entry.method.clone(),
			_ => return,
		};
		self.fail(operation, ConnectionError::Timeout { method });
	}

	// Remove `operation` and deliver `error` to it.
	fn fail(&mut self, operation: OperationId, error: ConnectionError) {
		let Some(entry) = self.operations.remove(&operation) else {
			return;
		};
		self.unsent.retain(|op| *op != operation);
		self.dormant.remove(&operation);
		match entry {
			Operation::Request(entry) => {
				if let Some(id) = entry.request_id {
					self.pending.remove(&id);
				}
				(entry.on_complete)(Err(error));
			},
			Operation::Subscription(entry) => {
				if let Some(id) = entry.request_id {
					self.pending.remove(&id);
					self.subscription_ids.remove(&id);
				}
				if let Some(remote_id) = &entry.remote_id {
					self.remote_ids.remove(remote_id);
				}
				(entry.on_failure)(error);
			},
		}
	}

	/// Route an inbound frame. Frames for unknown or cancelled operations are dropped.
	pub(crate) fn on_frame(&mut self, text: &str) {
		match jsonrpc::parse_frame(text) {
			Ok(InboundFrame::Response { id, result }) => self.on_response(id, result),
			Ok(InboundFrame::Notification { method, subscription, result }) =>
				match self.remote_ids.get(&subscription) {
					Some(operation) => {
						if let Some(Operation::Subscription(entry)) = self.operations.get_mut(operation) {
							(entry.on_update)(result);
						}
					},
					None => debug!(
						target: targets::CONNECTION,
						"dropping {method} notification for unknown subscription {subscription}"
					),
				},
			Err(e) => warn!(target: targets::CONNECTION, "dropping frame: {e}"),
		}
	}

	fn on_response(&mut self, id: Option<u64>, result: Result<Value, ConnectionError>) {
		let pending = id
			.and_then(|id| u16::try_from(id).ok())
			.map(RequestId)
			.and_then(|id| self.pending.remove(&id).map(|pending| (id, pending)));
		let Some((request_id, pending)) = pending else {
			debug!(target: targets::CONNECTION, "dropping response to unknown request {id:?}");
			return;
		};
		match pending {
			Pending::Request(operation) => {
				if let Some(Operation::Request(entry)) = self.operations.remove(&operation) {
					(entry.on_complete)(result);
				}
			},
			Pending::Subscribe(operation) => {
				let remote_id = match result {
					Ok(value) => jsonrpc::remote_id(&value).ok_or_else(|| {
						ConnectionError::MalformedFrame(format!("invalid subscription id {value}"))
					}),
					Err(e) => Err(e),
				};
				match remote_id {
					Ok(remote_id) => {
						if let Some(Operation::Subscription(entry)) = self.operations.get_mut(&operation) {
							debug!(
								target: targets::CONNECTION,
								"{} acknowledged as {remote_id}",
								entry.request.method
							);
							entry.remote_id = Some(remote_id.clone());
							self.remote_ids.insert(remote_id, operation);
							self.subscription_ids.insert(request_id, operation);
						}
					},
					Err(e) => self.fail(operation, e),
				}
			},
			Pending::CancelledSubscribe { unsubscribe_method } => {
				if let Some(remote_id) = result.ok().as_ref().and_then(jsonrpc::remote_id) {
					self.unsubscribe(&unsubscribe_method, remote_id);
				}
			},
			Pending::Unsubscribe => {},
		}
	}

	/// The socket opened: flush queued operations, then re-issue resilient subscriptions.
	pub(crate) fn on_connected(&mut self) {
		self.connected = true;
		while let Some(operation) = self.unsent.pop_front() {
			self.send(operation);
		}
		let dormant = std::mem::take(&mut self.dormant);
		if !dormant.is_empty() {
			debug!(target: targets::CONNECTION, "resending {} subscriptions", dormant.len());
		}
		for operation in dormant {
			self.send(operation);
		}
	}

	/// The socket went away.
	///
	/// Sent requests and sent subscriptions without `resend_on_reconnect` fail with
	/// [`ConnectionError::Dropped`]. Resilient subscriptions lose their request and remote ids
	/// and wait for [`Self::on_connected`]. Operations never sent stay queued.
	pub(crate) fn on_disconnected(&mut self, reason: &str) {
		self.connected = false;
		self.pending.clear();
		self.subscription_ids.clear();
		self.remote_ids.clear();
		let mut failed = Vec::new();
		for (operation, entry) in self.operations.iter_mut() {
			match entry {
				Operation::Request(entry) =>
					if entry.request_id.take().is_some() {
						failed.push(*operation);
					},
				Operation::Subscription(entry) => {
					if entry.request_id.take().is_none() {
						continue;
					}
					entry.remote_id = None;
					if entry.request.resend_on_reconnect {
						self.dormant.insert(*operation);
					} else {
						failed.push(*operation);
					}
				},
			}
		}
		failed.sort();
		for operation in failed {
			self.fail(operation, ConnectionError::Dropped(reason.to_string()));
		}
	}

	/// Fail every operation with [`ConnectionError::Closed`].
	pub(crate) fn close(&mut self) {
		self.connected = false;
		self.outbox.clear();
		let mut operations: Vec<_> = self.operations.keys().copied().collect();
		operations.sort();
		for operation in operations {
			self.fail(operation, ConnectionError::Closed);
		}
	}

	#[cfg(test)]
	pub(crate) fn request_id(&self, operation: OperationId) -> Option<RequestId> {
		match self.operations.get(&operation)? {
			Operation::Request(entry) => entry.request_id,
			Operation::Subscription(entry) => entry.request_id,
		}
	}

	#[cfg(test)]
	pub(crate) fn remote_id(&self, operation: OperationId) -> Option<RemoteId> {
		match self.operations.get(&operation)? {
			Operation::Subscription(entry) => entry.remote_id.clone(),
			Operation::Request(_) => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::{Arc, Mutex};

	type Log = Arc<Mutex<Vec<String>>>;

	fn recorder() -> Log {
		Arc::new(Mutex::new(Vec::new()))
	}

	fn on_complete(log: &Log, label: &'static str) -> ResponseCallback {
		let log = log.clone();
		Box::new(move |result| log.lock().unwrap().push(format!("{label}: {result:?}")))
	}

	fn on_update(log: &Log, label: &'static str) -> UpdateCallback {
		let log = log.clone();
		Box::new(move |value| log.lock().unwrap().push(format!("{label}: {value}")))
	}

	fn on_failure(log: &Log, label: &'static str) -> FailureCallback {
		let log = log.clone();
		Box::new(move |error| log.lock().unwrap().push(format!("{label} failed: {error}")))
	}

	fn storage_subscription(resend: bool) -> SubscriptionRequest {
		SubscriptionRequest::new("state_subscribeStorage", json!([["0x01"]]), "state_unsubscribeStorage")
			.resend_on_reconnect(resend)
	}

	fn sent_ids(mux: &mut Multiplexer) -> Vec<(u64, String)> {
		mux.take_outbound()
			.iter()
			.map(|frame| {
				let frame: Value = serde_json::from_str(frame).unwrap();
				(frame["id"].as_u64().unwrap(), frame["method"].as_str().unwrap().to_string())
			})
			.collect()
	}

	fn response(id: u64, result: Value) -> String {
		json!({ "jsonrpc": "2.0", "id": id, "result": result }).to_string()
	}

	fn notification(subscription: &str, result: Value) -> String {
		json!({
			"jsonrpc": "2.0",
			"method": "state_storage",
			"params": { "subscription": subscription, "result": result },
		})
		.to_string()
	}

	fn connected() -> Multiplexer {
		let mut mux = Multiplexer::new();
		mux.on_connected();
		mux
	}

	#[test]
	fn responses_complete_requests_once() {
		let log = recorder();
		let mut mux = connected();
		mux.request(OperationId(1), "system_chain".into(), json!([]), on_complete(&log, "a"));
		mux.request(OperationId(2), "system_name".into(), json!([]), on_complete(&log, "b"));
		assert_eq!(sent_ids(&mut mux), [(0, "system_chain".to_string()), (1, "system_name".to_string())]);

		mux.on_frame(&response(1, json!("pop")));
		mux.on_frame(&response(0, json!("polkadot")));
		// Duplicate response is dropped.
		mux.on_frame(&response(0, json!("again")));
		assert_eq!(
			*log.lock().unwrap(),
			[r#"b: Ok(String("pop"))"#, r#"a: Ok(String("polkadot"))"#]
		);
		assert_eq!(mux.len(), 0);
	}

	#[test]
	fn requests_queue_while_disconnected() {
		let log = recorder();
		let mut mux = Multiplexer::new();
		mux.request(OperationId(1), "a".into(), json!([]), on_complete(&log, "a"));
		mux.request(OperationId(2), "b".into(), json!([]), on_complete(&log, "b"));
		assert!(mux.take_outbound().is_empty());
		mux.on_disconnected("still down");
		assert!(log.lock().unwrap().is_empty());

		mux.on_connected();
		assert_eq!(sent_ids(&mut mux), [(0, "a".to_string()), (1, "b".to_string())]);
	}

	#[test]
	fn cancelled_request_never_completes() {
		let log = recorder();
		let mut mux = connected();
		mux.request(OperationId(1), "a".into(), json!([]), on_complete(&log, "a"));
		mux.take_outbound();
		mux.cancel(OperationId(1));
		mux.on_frame(&response(0, json!("late")));
		assert!(log.lock().unwrap().is_empty());
		assert_eq!(mux.len(), 0);
	}

	#[test]
	fn request_ids_skip_ids_in_use() {
		let log = recorder();
		let mut mux = connected();
		mux.next_request_id = u16::MAX;
		mux.request(OperationId(1), "a".into(), json!([]), on_complete(&log, "a"));
		mux.request(OperationId(2), "b".into(), json!([]), on_complete(&log, "b"));
		assert_eq!(mux.request_id(OperationId(1)), Some(RequestId(u16::MAX)));
		assert_eq!(mux.request_id(OperationId(2)), Some(RequestId(0)));

		// Wrap around onto the still pending id 0.
		mux.next_request_id = u16::MAX;
		mux.on_frame(&response(u16::MAX as u64, json!(null)));
		mux.request(OperationId(3), "c".into(), json!([]), on_complete(&log, "c"));
		mux.request(OperationId(4), "d".into(), json!([]), on_complete(&log, "d"));
		assert_eq!(mux.request_id(OperationId(3)), Some(RequestId(u16::MAX)));
		assert_eq!(mux.request_id(OperationId(4)), Some(RequestId(1)));
	}

	#[test]
	fn exhausted_ids_fail_the_request() {
		let log = recorder();
		let mut mux = connected();
		for id in 0..=u16::MAX {
			mux.pending.insert(RequestId(id), Pending::Unsubscribe);
		}
		mux.request(OperationId(1), "a".into(), json!([]), on_complete(&log, "a"));
		assert_eq!(*log.lock().unwrap(), ["a: Err(RequestIdsExhausted)"]);
	}

	#[test]
	fn notifications_route_by_remote_id() {
		let log = recorder();
		let mut mux = connected();
		mux.subscribe(OperationId(1), storage_subscription(true), on_update(&log, "x"), on_failure(&log, "x"));
		mux.subscribe(OperationId(2), storage_subscription(true), on_update(&log, "y"), on_failure(&log, "y"));
		assert_eq!(sent_ids(&mut mux).len(), 2);
		mux.on_frame(&response(0, json!("sub-x")));
		mux.on_frame(&response(1, json!("sub-y")));

		mux.on_frame(&notification("sub-y", json!(1)));
		mux.on_frame(&notification("sub-x", json!(2)));
		mux.on_frame(&notification("sub-x", json!(3)));
		mux.on_frame(&notification("unknown", json!(4)));
		assert_eq!(*log.lock().unwrap(), ["y: 1", "x: 2", "x: 3"]);
	}

	#[test]
	fn cancelling_acknowledged_subscription_unsubscribes() {
		let log = recorder();
		let mut mux = connected();
		mux.subscribe(OperationId(1), storage_subscription(true), on_update(&log, "x"), on_failure(&log, "x"));
		mux.on_frame(&response(0, json!("sub-x")));
		mux.take_outbound();

		mux.cancel(OperationId(1));
		let frames = mux.take_outbound();
		assert_eq!(frames.len(), 1);
		let frame: Value = serde_json::from_str(&frames[0]).unwrap();
		assert_eq!(frame["method"], "state_unsubscribeStorage");
		assert_eq!(frame["params"], json!(["sub-x"]));

		mux.on_frame(&notification("sub-x", json!(1)));
		mux.on_frame(&response(frame["id"].as_u64().unwrap(), json!(true)));
		assert!(log.lock().unwrap().is_empty());
		assert_eq!(mux.len(), 0);
	}

	#[test]
	fn subscription_cancelled_before_ack_is_unsubscribed_on_ack() {
		let log = recorder();
		let mut mux = connected();
		mux.subscribe(OperationId(1), storage_subscription(true), on_update(&log, "x"), on_failure(&log, "x"));
		mux.take_outbound();
		mux.cancel(OperationId(1));
		assert!(mux.take_outbound().is_empty());

		mux.on_frame(&response(0, json!("sub-x")));
		assert_eq!(sent_ids(&mut mux), [(1, "state_unsubscribeStorage".to_string())]);
		mux.on_frame(&notification("sub-x", json!(1)));
		assert!(log.lock().unwrap().is_empty());
	}

	#[test]
	fn drop_fails_sent_work_and_keeps_resilient_subscriptions() {
		let log = recorder();
		let mut mux = connected();
		mux.request(OperationId(1), "a".into(), json!([]), on_complete(&log, "a"));
		mux.subscribe(OperationId(2), storage_subscription(false), on_update(&log, "plain"), on_failure(&log, "plain"));
		mux.subscribe(OperationId(3), storage_subscription(true), on_update(&log, "resilient"), on_failure(&log, "resilient"));
		mux.on_frame(&response(1, json!("sub-plain")));
		mux.on_frame(&response(2, json!("sub-old")));
		mux.take_outbound();

		mux.on_disconnected("reset by peer");
		assert_eq!(
			*log.lock().unwrap(),
			[
				r#"a: Err(Dropped("reset by peer"))"#,
				"plain failed: Connection dropped: reset by peer",
			]
		);
		assert_eq!(mux.len(), 1);
		assert_eq!(mux.remote_id(OperationId(3)), None);
		// Nothing is routed while down.
		mux.on_frame(&notification("sub-old", json!("stale")));

		mux.on_connected();
		let resent = sent_ids(&mut mux);
		assert_eq!(resent.len(), 1);
		assert_eq!(resent[0].1, "state_subscribeStorage");
		mux.on_frame(&response(resent[0].0, json!("sub-new")));
		mux.on_frame(&notification("sub-new", json!("fresh")));
		assert_eq!(log.lock().unwrap().last().unwrap(), "resilient: \"fresh\"");
	}

	#[test]
	fn reconnect_flushes_queue_before_resending() {
		let log = recorder();
		let mut mux = connected();
		mux.subscribe(OperationId(1), storage_subscription(true), on_update(&log, "x"), on_failure(&log, "x"));
		mux.on_frame(&response(0, json!("sub-x")));
		mux.on_disconnected("gone");
		mux.request(OperationId(2), "queued".into(), json!([]), on_complete(&log, "q"));
		mux.take_outbound();

		mux.on_connected();
		let methods: Vec<_> = sent_ids(&mut mux).into_iter().map(|(_, m)| m).collect();
		assert_eq!(methods, ["queued", "state_subscribeStorage"]);
	}

	#[test]
	fn expire_fails_pending_request_only_once() {
		let log = recorder();
		let mut mux = connected();
		mux.request(OperationId(1), "slow".into(), json!([]), on_complete(&log, "slow"));
		mux.expire(OperationId(1));
		mux.expire(OperationId(1));
		mux.on_frame(&response(0, json!("late")));
		assert_eq!(*log.lock().unwrap(), [r#"slow: Err(Timeout { method: "slow" })"#]);
	}

	#[test]
	fn close_fails_everything() {
		let log = recorder();
		let mut mux = Multiplexer::new();
		mux.request(OperationId(1), "a".into(), json!([]), on_complete(&log, "a"));
		mux.subscribe(OperationId(2), storage_subscription(true), on_update(&log, "x"), on_failure(&log, "x"));
		mux.close();
		assert_eq!(
			*log.lock().unwrap(),
			["a: Err(Closed)", "x failed: Connection closed"]
		);
	}

	#[test]
	fn subscribe_error_fails_subscription() {
		let log = recorder();
		let mut mux = connected();
		mux.subscribe(OperationId(1), storage_subscription(true), on_update(&log, "x"), on_failure(&log, "x"));
		mux.on_frame(r#"{"jsonrpc":"2.0","id":0,"error":{"code":-32601,"message":"Method not found"}}"#);
		assert_eq!(*log.lock().unwrap(), ["x failed: RPC error -32601: Method not found"]);
		assert_eq!(mux.len(), 0);
	}
}
