// SPDX-License-Identifier: GPL-3.0

//! Future and stream adapters over the callback interface.

use super::{Connection, OperationHandle, OperationId, SubscriptionRequest};
use crate::error::ConnectionError;
use futures::Stream;
use serde_json::Value;
use std::{
	pin::Pin,
	task::{Context, Poll},
	time::Duration,
};
use tokio::sync::{mpsc, oneshot};

/// Cancels the wrapped operation when dropped unless disarmed.
struct CancelOnDrop(Option<OperationHandle>);

impl CancelOnDrop {
	fn disarm(mut self) {
		self.0 = None;
	}
}

impl Drop for CancelOnDrop {
	fn drop(&mut self) {
		if let Some(handle) = self.0.take() {
			handle.cancel();
		}
	}
}

impl Connection {
	/// Send a request and wait for its response.
	///
	/// Dropping the returned future cancels the request.
	pub async fn request(&self, method: &str, params: Value) -> Result<Value, ConnectionError> {
		self.request_with_timeout(method, params, None).await
	}

	/// Like [`Self::request`], failing with [`ConnectionError::Timeout`] after `timeout`.
	pub async fn request_with_timeout(
		&self,
		method: &str,
		params: Value,
		timeout: Option<Duration>,
	) -> Result<Value, ConnectionError> {
		let (tx, rx) = oneshot::channel();
		let handle = self.send(
			method,
			params,
			timeout,
			Box::new(move |result| {
				let _ = tx.send(result);
			}),
		);
		let guard = CancelOnDrop(Some(handle));
		// The callback is only dropped uncalled when the connection task is gone.
		let result = rx.await.map_err(|_| ConnectionError::Closed)?;
		guard.disarm();
		result
	}

	/// Open a subscription as a stream of notifications.
	///
	/// The stream yields at most one error, after which it ends. Dropping it cancels the
	/// subscription.
	pub fn subscribe_stream(&self, request: SubscriptionRequest) -> SubscriptionStream {
		let (tx, updates) = mpsc::unbounded_channel();
		let failures = tx.clone();
		let handle = self.subscribe(
			request,
			Box::new(move |value| {
				let _ = tx.send(Ok(value));
			}),
			Box::new(move |error| {
				let _ = failures.send(Err(error));
			}),
		);
		SubscriptionStream { updates, handle }
	}
}

/// Notifications of one subscription, in delivery order.
#[derive(Debug)]
pub struct SubscriptionStream {
	updates: mpsc::UnboundedReceiver<Result<Value, ConnectionError>>,
	handle: OperationHandle,
}

impl SubscriptionStream {
	pub fn id(&self) -> OperationId {
		self.handle.id()
	}
}

impl Stream for SubscriptionStream {
	type Item = Result<Value, ConnectionError>;

	fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		self.get_mut().updates.poll_recv(cx)
	}
}

impl Drop for SubscriptionStream {
	fn drop(&mut self) {
		self.handle.cancel();
	}
}
