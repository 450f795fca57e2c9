#![forbid(unsafe_code)]

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, warn};
use url::Url;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;
pub type BoxSocket = Box<dyn EventSubSocket>;
pub type SocketConnector = Arc<dyn Fn(Url) -> BoxFuture<'static, anyhow::Result<BoxSocket>> + Send + Sync>;

/// Close code reported when the peer closed without a status.
pub const CLOSE_CODE_NO_STATUS: u16 = 1005;

/// What a socket read produced.
#[derive(Debug)]
pub enum Frame {
	Text(String),
	/// The peer sent a close frame.
	Closed { code: u16, reason: Option<String> },
	/// The stream ended without a close frame.
	Ended,
	Failed(anyhow::Error),
}

/// One eventsub connection. The connection manager only talks to sockets through this seam.
#[async_trait]
pub trait EventSubSocket: Send {
	/// Next frame carrying data or a terminal condition. Must be cancel-safe.
	async fn next_frame(&mut self) -> Frame;

	/// Start a graceful close; frames already in flight may still be read afterwards.
	async fn send_close(&mut self) -> anyhow::Result<()>;

	/// Whether a graceful close can make progress.
	fn is_open(&self) -> bool;

	/// Drop the connection without a close handshake.
	fn abort(&mut self);
}

/// WebSocket transport backed by `tokio-tungstenite`.
pub struct WsSocket {
	ws: Option<WsStream>,
	open: bool,
}

impl WsSocket {
	pub fn new(ws: WsStream) -> Self {
		Self { ws: Some(ws), open: true }
	}

	pub async fn connect(url: Url) -> anyhow::Result<Self> {
		let (ws, _resp) = tokio_tungstenite::connect_async(url.as_str())
			.await
			.context("connect_async to eventsub ws")?;
		Ok(Self::new(ws))
	}
}

#[async_trait]
impl EventSubSocket for WsSocket {
	async fn next_frame(&mut self) -> Frame {
		loop {
			let Some(ws) = self.ws.as_mut() else {
				return Frame::Ended;
			};

			let Some(msg) = ws.next().await else {
				self.open = false;
				return Frame::Ended;
			};

			let msg = match msg {
				Ok(m) => m,
				Err(e) => {
					self.open = false;
					return Frame::Failed(anyhow::Error::new(e).context("eventsub ws read"));
				}
			};

			match msg {
				Message::Text(t) => return Frame::Text(t.to_string()),
				Message::Ping(p) => {
					let _ = ws.send(Message::Pong(p)).await;
				}
				Message::Pong(_) => {}
				Message::Close(frame) => {
					self.open = false;
					return match frame {
						Some(frame) => Frame::Closed {
							code: u16::from(frame.code),
							reason: Some(frame.reason.to_string()).filter(|r| !r.is_empty()),
						},
						None => Frame::Closed {
							code: CLOSE_CODE_NO_STATUS,
							reason: None,
						},
					};
				}
				Message::Binary(b) => {
					warn!(len = b.len(), "eventsub ws: ignoring binary frame");
				}
				Message::Frame(_) => {}
			}
		}
	}

	async fn send_close(&mut self) -> anyhow::Result<()> {
		let Some(ws) = self.ws.as_mut() else {
			return Ok(());
		};
		self.open = false;
		ws.close(None).await.context("send eventsub ws close frame")
	}

	fn is_open(&self) -> bool {
		self.ws.is_some() && self.open
	}

	fn abort(&mut self) {
		self.open = false;
		self.ws = None;
	}
}

/// The production connector.
pub fn default_connector() -> SocketConnector {
	Arc::new(|url: Url| {
		Box::pin(async move {
			let socket = WsSocket::connect(url).await?;
			Ok(Box::new(socket) as BoxSocket)
		}) as BoxFuture<'static, anyhow::Result<BoxSocket>>
	})
}

/// Two-step shutdown: close handshake bounded by `timeout`, then abort.
pub async fn close_gracefully(socket: &mut dyn EventSubSocket, timeout: Duration) {
	if !socket.is_open() {
		socket.abort();
		return;
	}

	let handshake = async {
		if let Err(e) = socket.send_close().await {
			return Err(e);
		}
		loop {
			match socket.next_frame().await {
				Frame::Text(_) => continue,
				Frame::Closed { .. } | Frame::Ended => return Ok(()),
				Frame::Failed(e) => return Err(e),
			}
		}
	};

	match tokio::time::timeout(timeout, handshake).await {
		Ok(Ok(())) => debug!("eventsub socket closed gracefully"),
		Ok(Err(e)) => {
			debug!(error = %e, "eventsub graceful close failed; aborting");
			socket.abort();
		}
		Err(_) => {
			warn!(timeout_ms = timeout.as_millis() as u64, "eventsub graceful close timed out; aborting");
			socket.abort();
		}
	}
}
