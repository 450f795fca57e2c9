#![forbid(unsafe_code)]

//! Server-initiated reconnect: open the new socket and wait for its welcome.
//!
//! Runs in its own task and never touches the active socket. The connection manager owns the swap.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};
use url::Url;

use crate::error::ClientError;
use crate::message::{Message, SessionWelcome};
use crate::parse::ParseResult;
use crate::registry::Registry;
use crate::socket::{BoxSocket, Frame, SocketConnector, close_gracefully};

/// A replacement connection that already delivered its welcome.
pub struct Changeover {
	pub socket: BoxSocket,
	pub welcome: SessionWelcome,
	/// Local receipt time of the welcome; the keepalive deadline restarts from here.
	pub received_at: Instant,
}

pub type ChangeoverHandle = JoinHandle<Result<Changeover, ClientError>>;

pub fn spawn_changeover(
	connector: SocketConnector,
	registry: Arc<Registry>,
	url: Url,
	welcome_timeout: Duration,
	close_timeout: Duration,
) -> ChangeoverHandle {
	tokio::spawn(perform_changeover(connector, registry, url, welcome_timeout, close_timeout))
}

pub async fn perform_changeover(
	connector: SocketConnector,
	registry: Arc<Registry>,
	url: Url,
	welcome_timeout: Duration,
	close_timeout: Duration,
) -> Result<Changeover, ClientError> {
	debug!(%url, "eventsub changeover: connecting");
	let mut socket = connector(url.clone())
		.await
		.map_err(|e| ClientError::Changeover(e.context(format!("connect to reconnect url {url}"))))?;

	let Ok(frame) = tokio::time::timeout(welcome_timeout, socket.next_frame()).await else {
		socket.abort();
		return Err(ClientError::violation(format!(
			"no message on reconnect socket within {}s",
			welcome_timeout.as_secs()
		)));
	};
	let received_at = Instant::now();

	let raw = match frame {
		Frame::Text(raw) => raw,
		Frame::Closed { code, reason } => {
			return Err(ClientError::violation(format!(
				"reconnect socket closed before its welcome (code={code}, reason={})",
				reason.unwrap_or_default()
			)));
		}
		Frame::Ended => {
			return Err(ClientError::violation("reconnect socket ended before its welcome"));
		}
		Frame::Failed(e) => {
			return Err(ClientError::Changeover(e.context("read welcome from reconnect socket")));
		}
	};

	match registry.parse(&raw) {
		ParseResult::Ok(Message::Welcome(welcome)) => {
			info!(
				%url,
				session_id = %welcome.session().id,
				message_id = %welcome.metadata.message_id,
				"eventsub changeover: new socket welcomed"
			);
			Ok(Changeover {
				socket,
				welcome,
				received_at,
			})
		}
		other => {
			close_gracefully(socket.as_mut(), close_timeout).await;
			let got = match other {
				ParseResult::Ok(message) => format!("message_type {}", message.message_type()),
				ParseResult::InvalidMessage(reason) => format!("an invalid message ({reason})"),
				ParseResult::UnknownMessageType(t) => format!("unknown message_type {t}"),
				ParseResult::UnknownSubscriptionType(t) => format!("notification of unknown subscription_type {t}"),
			};
			Err(ClientError::violation(format!(
				"expected first message on reconnect socket to be session_welcome, but got {got}"
			)))
		}
	}
}
