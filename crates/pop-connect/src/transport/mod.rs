// SPDX-License-Identifier: GPL-3.0

//! Persistent text-frame transports.
//!
//! A [`Transport`] opens one socket to a URL and hands back a [`TransportChannel`]: a sender
//! for outbound frames and a receiver of inbound [`TransportEvent`]s. The channel ends with a
//! single [`TransportEvent::Closed`] (or the receiver closing) when the socket goes away; the
//! connection layer then opens a new one.

mod ws;

pub use ws::WsTransport;

use crate::error::ConnectionError;
use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

/// Something that arrived from the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
	/// A text frame.
	Frame(String),
	/// The socket closed or failed.
	Closed {
		/// Human-readable reason.
		reason: String,
	},
}

/// The two halves of an open socket.
#[derive(Debug)]
pub struct TransportChannel {
	/// Frames to write. Dropping the sender closes the socket.
	pub outbound: mpsc::UnboundedSender<String>,
	/// Frames read and the final close event.
	pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Opens sockets for a connection.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
	/// Open a socket to `url`.
	async fn connect(&self, url: &Url) -> Result<TransportChannel, ConnectionError>;
}
