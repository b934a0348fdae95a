// SPDX-License-Identifier: GPL-3.0

use super::{Transport, TransportChannel, TransportEvent};
use crate::{error::ConnectionError, strings::rpc::targets};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use log::{debug, trace};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

/// WebSocket transport (`ws://` and `wss://`).
///
/// Each socket is served by two tasks: a writer draining the outbound channel and a reader
/// forwarding text frames. Either side ending closes the socket.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
	async fn connect(&self, url: &Url) -> Result<TransportChannel, ConnectionError> {
		let (stream, _) = connect_async(url.as_str()).await.map_err(|e| {
			ConnectionError::ConnectionFailed { endpoint: url.to_string(), message: e.to_string() }
		})?;
		let (mut sink, mut stream) = stream.split();
		let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
		let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
		let endpoint = url.to_string();

		tokio::spawn(async move {
			while let Some(text) = outbound_rx.recv().await {
				trace!(target: targets::TRANSPORT, "-> {text}");
				if let Err(e) = sink.send(Message::Text(text.into())).await {
					debug!(target: targets::TRANSPORT, "write to {endpoint} failed: {e}");
					break;
				}
			}
			let _ = sink.send(Message::Close(None)).await;
		});

		let endpoint = url.to_string();
		tokio::spawn(async move {
			let reason = loop {
				match stream.next().await {
					Some(Ok(Message::Text(text))) => {
						trace!(target: targets::TRANSPORT, "<- {text}");
						if inbound_tx.send(TransportEvent::Frame(text.to_string())).is_err() {
							// Connection no longer listening.
							return;
						}
					},
					Some(Ok(Message::Close(frame))) =>
						break frame.map_or_else(|| "closed by peer".to_string(), |f| f.reason.to_string()),
					// Ping/pong are answered by tungstenite; binary frames are not JSON-RPC.
					Some(Ok(_)) => {},
					Some(Err(e)) => break e.to_string(),
					None => break "stream ended".to_string(),
				}
			};
			debug!(target: targets::TRANSPORT, "socket to {endpoint} closed: {reason}");
			let _ = inbound_tx.send(TransportEvent::Closed { reason });
		});

		Ok(TransportChannel { outbound: outbound_tx, inbound: inbound_rx })
	}
}
