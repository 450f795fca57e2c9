#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::task::JoinError;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::changeover::{Changeover, ChangeoverHandle, spawn_changeover};
use crate::config::{EventSubConfig, clamp_keepalive};
use crate::error::{ClientError, ConfigError};
use crate::guard::{Clock, ClockSkew, MessageGuard, SystemClock, Verdict};
use crate::message::{Message, Metadata, SessionReconnect, SessionWelcome};
use crate::parse::ParseResult;
use crate::registry::Registry;
use crate::socket::{BoxSocket, EventSubSocket, Frame, SocketConnector, close_gracefully, default_connector};
use crate::{EventSubEvent, EventSubEventTx};

/// Why a connection run ended without a fatal error. Callers are expected to reconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
	/// Nothing was received within the keepalive interval (plus grace).
	KeepaliveTimeout(Duration),
	/// The stream ended or failed without a close frame.
	ConnectionClosed,
	/// The server sent a close frame.
	WebsocketClosed { code: u16, reason: Option<String> },
	/// The socket could not be opened at all.
	ConnectFailed(String),
}

impl DisconnectReason {
	pub fn as_label(&self) -> &'static str {
		match self {
			Self::KeepaliveTimeout(_) => "keepalive_timeout",
			Self::ConnectionClosed => "connection_closed",
			Self::WebsocketClosed { .. } => "websocket_closed",
			Self::ConnectFailed(_) => "connect_failed",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
	Disconnected(DisconnectReason),
	Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
	AwaitingWelcome,
	Steady,
}

/// Per-run state around the active socket.
struct Connection {
	socket: BoxSocket,
	state: ConnectionState,
	last_message_at: Instant,
	changeover: Option<ChangeoverHandle>,
	/// Set while a retired socket is being drained; reconnect requests on it are ignored.
	draining: bool,
	receiver_gone: bool,
}

enum Wake {
	Frame(Frame),
	Changeover(Result<Result<Changeover, ClientError>, JoinError>),
	KeepaliveExpired,
}

/// EventSub websocket client: one connection run per [`EventSubClient::connect_and_receive`] call.
///
/// Replay protection and the last known keepalive survive across runs.
pub struct EventSubClient {
	cfg: EventSubConfig,
	url: Url,
	registry: Arc<Registry>,
	connector: SocketConnector,
	clock: Arc<dyn Clock>,
	guard: MessageGuard,
	keepalive: Duration,
}

impl EventSubClient {
	pub fn new(cfg: EventSubConfig, registry: Arc<Registry>) -> Result<Self, ConfigError> {
		cfg.validate()?;
		let url = cfg.connect_url()?;
		Ok(Self {
			url,
			registry,
			connector: default_connector(),
			clock: Arc::new(SystemClock),
			guard: MessageGuard::new(cfg.max_message_age, cfg.keepalive_grace),
			keepalive: cfg.initial_keepalive(),
			cfg,
		})
	}

	pub fn with_connector(mut self, connector: SocketConnector) -> Self {
		self.connector = connector;
		self
	}

	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	pub fn config(&self) -> &EventSubConfig {
		&self.cfg
	}

	pub fn url(&self) -> &Url {
		&self.url
	}

	pub fn registry(&self) -> &Arc<Registry> {
		&self.registry
	}

	/// Keepalive interval currently in effect.
	pub fn keepalive(&self) -> Duration {
		self.keepalive
	}

	/// Connect and process messages until the connection dies, the server breaks the protocol,
	/// or `cancel` fires.
	pub async fn connect_and_receive(
		&mut self,
		events_tx: &EventSubEventTx,
		cancel: &CancellationToken,
	) -> Result<RunOutcome, ClientError> {
		if cancel.is_cancelled() {
			return Ok(RunOutcome::Cancelled);
		}

		info!(url = %self.url, "eventsub connecting");
		let connect = (self.connector)(self.url.clone());
		let socket = tokio::select! {
			biased;
			_ = cancel.cancelled() => return Ok(RunOutcome::Cancelled),
			res = connect => match res {
				Ok(socket) => socket,
				Err(e) => {
					warn!(url = %self.url, error = %format!("{e:#}"), "eventsub connect failed");
					metrics::counter!("chatty_eventsub_connect_failures_total").increment(1);
					return Ok(RunOutcome::Disconnected(DisconnectReason::ConnectFailed(format!("{e:#}"))));
				}
			}
		};
		debug!(url = %self.url, "eventsub socket open; awaiting session_welcome");

		let mut conn = Connection {
			socket,
			state: ConnectionState::AwaitingWelcome,
			last_message_at: Instant::now(),
			changeover: None,
			draining: false,
			receiver_gone: false,
		};

		let result = self.receive_loop(&mut conn, events_tx, cancel).await;

		if let Some(changeover) = conn.changeover.take() {
			debug!("eventsub abandoning in-flight changeover");
			changeover.abort();
		}

		match &result {
			Ok(RunOutcome::Disconnected(reason)) => {
				info!(reason = reason.as_label(), "eventsub connection terminated");
				metrics::counter!("chatty_eventsub_disconnects_total", "reason" => reason.as_label()).increment(1);
				conn.socket.abort();
			}
			Ok(RunOutcome::Cancelled) => {
				info!("eventsub client cancelled; closing socket");
				close_gracefully(conn.socket.as_mut(), self.cfg.close_timeout).await;
			}
			Err(e) => {
				error!(error = %e, "eventsub connection failed");
				close_gracefully(conn.socket.as_mut(), self.cfg.close_timeout).await;
			}
		}

		result
	}

	async fn receive_loop(
		&mut self,
		conn: &mut Connection,
		events_tx: &EventSubEventTx,
		cancel: &CancellationToken,
	) -> Result<RunOutcome, ClientError> {
		loop {
			if cancel.is_cancelled() {
				return Ok(RunOutcome::Cancelled);
			}

			let deadline = conn.last_message_at + self.keepalive + self.cfg.keepalive_grace;

			let wake = tokio::select! {
				biased;
				_ = cancel.cancelled() => return Ok(RunOutcome::Cancelled),
				frame = conn.socket.next_frame() => Wake::Frame(frame),
				joined = wait_changeover(&mut conn.changeover) => Wake::Changeover(joined),
				_ = sleep_until(deadline) => Wake::KeepaliveExpired,
			};

			match wake {
				Wake::Frame(frame) => {
					let Some(reason) = self.handle_frame(conn, frame, events_tx, cancel).await? else {
						continue;
					};
					let Some(handle) = conn.changeover.take() else {
						return Ok(RunOutcome::Disconnected(reason));
					};
					// The server retires the old socket once the new one is welcomed.
					debug!(reason = reason.as_label(), "eventsub socket ended mid-changeover; waiting for the replacement");
					let Some(changeover) = self.await_changeover(handle, cancel).await? else {
						return Ok(RunOutcome::Cancelled);
					};
					self.complete_changeover(conn, changeover, events_tx, cancel).await?;
				}
				Wake::Changeover(joined) => {
					conn.changeover = None;
					let changeover =
						joined.map_err(|e| ClientError::Internal(format!("eventsub changeover task failed: {e}")))??;
					self.complete_changeover(conn, changeover, events_tx, cancel).await?;
				}
				Wake::KeepaliveExpired => {
					warn!(
						keepalive_secs = self.keepalive.as_secs(),
						grace_secs = self.cfg.keepalive_grace.as_secs(),
						"eventsub keepalive timeout; connection presumed dead"
					);
					return Ok(RunOutcome::Disconnected(DisconnectReason::KeepaliveTimeout(self.keepalive)));
				}
			}
		}
	}

	async fn handle_frame(
		&mut self,
		conn: &mut Connection,
		frame: Frame,
		events_tx: &EventSubEventTx,
		cancel: &CancellationToken,
	) -> Result<Option<DisconnectReason>, ClientError> {
		match frame {
			Frame::Text(raw) => {
				self.handle_text(conn, &raw, events_tx, cancel).await?;
				Ok(None)
			}
			Frame::Closed { code, reason } => {
				info!(code, reason = reason.as_deref().unwrap_or(""), "eventsub websocket closed by server");
				Ok(Some(DisconnectReason::WebsocketClosed { code, reason }))
			}
			Frame::Ended => {
				info!("eventsub connection ended");
				Ok(Some(DisconnectReason::ConnectionClosed))
			}
			Frame::Failed(e) => {
				warn!(error = %format!("{e:#}"), "eventsub read failed; treating connection as closed");
				Ok(Some(DisconnectReason::ConnectionClosed))
			}
		}
	}

	async fn handle_text(
		&mut self,
		conn: &mut Connection,
		raw: &str,
		events_tx: &EventSubEventTx,
		cancel: &CancellationToken,
	) -> Result<(), ClientError> {
		metrics::counter!("chatty_eventsub_frames_total").increment(1);

		let message = match self.registry.parse(raw) {
			ParseResult::Ok(message) => message,
			ParseResult::InvalidMessage(reason) => {
				error!(%reason, "eventsub message skipped: failed to parse");
				dropped("invalid");
				return Ok(());
			}
			ParseResult::UnknownMessageType(message_type) => {
				warn!(%message_type, "eventsub message skipped: unknown message type");
				dropped("unknown_message_type");
				return Ok(());
			}
			ParseResult::UnknownSubscriptionType(subscription_type) => {
				warn!(%subscription_type, "eventsub notification skipped: unknown subscription type");
				dropped("unknown_subscription_type");
				return Ok(());
			}
		};

		let now = self.clock.now();
		let metadata = message.metadata();
		match self.guard.check(metadata, now) {
			Verdict::Fresh => {}
			Verdict::Stale { age } => {
				warn!(
					message_id = %metadata.message_id,
					message_type = %metadata.message_type,
					timestamp = %metadata.message_timestamp,
					age_secs = age.as_secs(),
					"eventsub message skipped: older than the replay window"
				);
				dropped("stale");
				return Ok(());
			}
			Verdict::Duplicate => {
				debug!(
					message_id = %metadata.message_id,
					message_type = %metadata.message_type,
					timestamp = %metadata.message_timestamp,
					"eventsub message skipped: duplicate"
				);
				dropped("duplicate");
				return Ok(());
			}
		}

		self.warn_on_clock_skew(metadata, now);

		conn.last_message_at = Instant::now();
		self.dispatch(conn, message, events_tx, cancel).await
	}

	async fn dispatch(
		&mut self,
		conn: &mut Connection,
		message: Message,
		events_tx: &EventSubEventTx,
		cancel: &CancellationToken,
	) -> Result<(), ClientError> {
		if conn.state == ConnectionState::AwaitingWelcome && !matches!(message, Message::Welcome(_)) {
			return Err(ClientError::violation(format!(
				"expected first message on socket to be session_welcome, but was {} (message_id={})",
				message.message_type(),
				message.metadata().message_id
			)));
		}

		match message {
			Message::Welcome(welcome) => {
				if conn.state == ConnectionState::Steady {
					return Err(ClientError::violation(format!(
						"received a second session_welcome on the same socket (message_id={})",
						welcome.metadata.message_id
					)));
				}
				conn.state = ConnectionState::Steady;
				self.adopt_keepalive(&welcome);
				info!(
					session_id = %welcome.session().id,
					keepalive_secs = self.keepalive.as_secs(),
					"eventsub session established"
				);
				emit(conn, EventSubEvent::Connected(welcome), events_tx, cancel, "connected").await;
			}
			Message::Keepalive(_) => {
				trace!("eventsub keepalive");
			}
			Message::Reconnect(reconnect) => self.begin_changeover(conn, reconnect)?,
			Message::Revocation(revocation) => {
				info!(
					subscription_id = %revocation.payload.subscription.id,
					subscription_type = %revocation.metadata.subscription_type,
					status = %revocation.payload.subscription.status,
					"eventsub subscription revoked"
				);
				emit(conn, EventSubEvent::Revocation(revocation), events_tx, cancel, "revocation").await;
			}
			Message::Notification(notification) => {
				trace!(
					message_id = %notification.metadata().base.message_id,
					subscription_type = notification.subscription_type(),
					"eventsub notification"
				);
				emit(conn, EventSubEvent::Notification(notification), events_tx, cancel, "notification").await;
			}
			Message::Other(other) => {
				warn!(
					message_type = other.message_type(),
					message_id = %other.metadata().message_id,
					"eventsub message skipped: no handler for registered message type"
				);
				dropped("unhandled");
			}
		}
		Ok(())
	}

	fn begin_changeover(&self, conn: &mut Connection, reconnect: SessionReconnect) -> Result<(), ClientError> {
		if conn.draining {
			debug!(message_id = %reconnect.metadata.message_id, "ignoring session_reconnect on a retired socket");
			return Ok(());
		}
		if conn.changeover.is_some() {
			debug!(message_id = %reconnect.metadata.message_id, "eventsub changeover already in flight; ignoring session_reconnect");
			return Ok(());
		}

		let Some(raw_url) = reconnect.payload.session.reconnect_url else {
			return Err(ClientError::violation(format!(
				"session_reconnect without reconnect_url (message_id={})",
				reconnect.metadata.message_id
			)));
		};
		let url = Url::parse(&raw_url)
			.map_err(|e| ClientError::violation(format!("session_reconnect carried an invalid reconnect_url {raw_url:?}: {e}")))?;

		info!(%url, "eventsub reconnect requested; starting changeover");
		conn.changeover = Some(spawn_changeover(
			self.connector.clone(),
			self.registry.clone(),
			url,
			self.cfg.changeover_timeout,
			self.cfg.close_timeout,
		));
		Ok(())
	}

	/// Wait for an in-flight changeover after the active socket is gone. `None` when cancelled.
	async fn await_changeover(
		&self,
		mut handle: ChangeoverHandle,
		cancel: &CancellationToken,
	) -> Result<Option<Changeover>, ClientError> {
		let joined = tokio::select! {
			biased;
			_ = cancel.cancelled() => {
				handle.abort();
				return Ok(None);
			}
			joined = tokio::time::timeout(self.cfg.changeover_timeout, &mut handle) => joined,
		};

		let Ok(joined) = joined else {
			handle.abort();
			return Err(ClientError::violation(format!(
				"socket closed during changeover and the replacement was not ready within {}s",
				self.cfg.changeover_timeout.as_secs()
			)));
		};
		let changeover = joined.map_err(|e| ClientError::Internal(format!("eventsub changeover task failed: {e}")))??;
		Ok(Some(changeover))
	}

	/// Swap in the replacement socket. Whatever the retired socket still delivers is processed first.
	async fn complete_changeover(
		&mut self,
		conn: &mut Connection,
		changeover: Changeover,
		events_tx: &EventSubEventTx,
		cancel: &CancellationToken,
	) -> Result<(), ClientError> {
		let Changeover {
			mut socket,
			welcome,
			received_at,
		} = changeover;

		let now = self.clock.now();
		let rejected = match self.guard.check(&welcome.metadata, now) {
			Verdict::Fresh => None,
			Verdict::Stale { age } => Some(format!("older than the replay window ({}s)", age.as_secs())),
			Verdict::Duplicate => Some("a replayed message id".to_string()),
		};
		if let Some(why) = rejected {
			socket.abort();
			return Err(ClientError::violation(format!(
				"welcome on reconnect socket rejected as {why} (message_id={})",
				welcome.metadata.message_id
			)));
		}
		self.warn_on_clock_skew(&welcome.metadata, now);

		let mut retired = std::mem::replace(&mut conn.socket, socket);
		conn.draining = true;
		let drained = self.drain_retired(conn, retired.as_mut(), events_tx, cancel).await;
		conn.draining = false;
		retired.abort();
		drained?;

		self.adopt_keepalive(&welcome);
		conn.last_message_at = conn.last_message_at.max(received_at);

		info!(
			session_id = %welcome.session().id,
			keepalive_secs = self.keepalive.as_secs(),
			"eventsub changeover complete"
		);
		metrics::counter!("chatty_eventsub_changeovers_total").increment(1);
		emit(conn, EventSubEvent::Connected(welcome), events_tx, cancel, "connected").await;
		Ok(())
	}

	async fn drain_retired(
		&mut self,
		conn: &mut Connection,
		retired: &mut dyn EventSubSocket,
		events_tx: &EventSubEventTx,
		cancel: &CancellationToken,
	) -> Result<(), ClientError> {
		if !retired.is_open() {
			return Ok(());
		}
		if let Err(e) = retired.send_close().await {
			debug!(error = %format!("{e:#}"), "failed to send close frame to retired eventsub socket");
			return Ok(());
		}

		let deadline = Instant::now() + self.cfg.close_timeout;
		loop {
			let frame = tokio::select! {
				biased;
				_ = cancel.cancelled() => return Ok(()),
				_ = sleep_until(deadline) => {
					warn!("retired eventsub socket did not close in time; aborting it");
					return Ok(());
				}
				frame = retired.next_frame() => frame,
			};

			match frame {
				Frame::Text(raw) => self.handle_text(conn, &raw, events_tx, cancel).await?,
				Frame::Closed { .. } | Frame::Ended => {
					debug!("retired eventsub socket closed");
					return Ok(());
				}
				Frame::Failed(e) => {
					debug!(error = %format!("{e:#}"), "retired eventsub socket failed while draining");
					return Ok(());
				}
			}
		}
	}

	fn warn_on_clock_skew(&self, metadata: &Metadata, now: SystemTime) {
		match self.guard.clock_skew(metadata, now) {
			Some(ClockSkew::ClientAhead(d)) => warn!(
				message_id = %metadata.message_id,
				timestamp = %metadata.message_timestamp,
				skew_ms = d.as_millis() as u64,
				"local clock is ahead of eventsub message timestamp"
			),
			Some(ClockSkew::ClientBehind(d)) => warn!(
				message_id = %metadata.message_id,
				timestamp = %metadata.message_timestamp,
				skew_ms = d.as_millis() as u64,
				"local clock is behind eventsub message timestamp"
			),
			None => {}
		}
	}

	fn adopt_keepalive(&mut self, welcome: &SessionWelcome) {
		let Some(secs) = welcome.session().keepalive_timeout_seconds else {
			return;
		};
		let keepalive = clamp_keepalive(secs);
		if keepalive.as_secs() != secs {
			warn!(stated_secs = secs, used_secs = keepalive.as_secs(), "eventsub keepalive outside supported range; clamped");
		}
		self.keepalive = keepalive;
	}
}

async fn wait_changeover(slot: &mut Option<ChangeoverHandle>) -> Result<Result<Changeover, ClientError>, JoinError> {
	match slot {
		Some(handle) => handle.await,
		None => std::future::pending().await,
	}
}

/// Hand an event to the application; waits for capacity but gives way to cancellation.
async fn emit(
	conn: &mut Connection,
	event: EventSubEvent,
	events_tx: &EventSubEventTx,
	cancel: &CancellationToken,
	kind: &'static str,
) {
	if conn.receiver_gone {
		return;
	}

	tokio::select! {
		biased;
		_ = cancel.cancelled() => {}
		sent = events_tx.send(event) => {
			if sent.is_err() {
				warn!("eventsub event receiver dropped; discarding further events");
				conn.receiver_gone = true;
			} else {
				metrics::counter!("chatty_eventsub_dispatched_total", "kind" => kind).increment(1);
			}
		}
	}
}

fn dropped(reason: &'static str) {
	metrics::counter!("chatty_eventsub_dropped_messages_total", "reason" => reason).increment(1);
}

