#![forbid(unsafe_code)]

//! In-memory sockets and wire builders for connection tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use url::Url;

use crate::guard::Clock;
use crate::message::SubscriptionEvent;
use crate::registry::Registry;
use crate::socket::{BoxFuture, BoxSocket, EventSubSocket, Frame, SocketConnector};

pub(crate) const PRIMARY_URL: &str = "ws://primary.test/ws";

/// Test side of a [`ScriptedSocket`].
#[derive(Clone)]
pub(crate) struct ScriptHandle {
	tx: mpsc::UnboundedSender<Frame>,
	close_requested: Arc<AtomicBool>,
	aborted: Arc<AtomicBool>,
}

impl ScriptHandle {
	pub(crate) fn text(&self, raw: impl Into<String>) {
		let _ = self.tx.send(Frame::Text(raw.into()));
	}

	pub(crate) fn close(&self, code: u16, reason: &str) {
		let _ = self.tx.send(Frame::Closed {
			code,
			reason: Some(reason.to_string()),
		});
	}

	pub(crate) fn end(&self) {
		let _ = self.tx.send(Frame::Ended);
	}

	pub(crate) fn close_requested(&self) -> bool {
		self.close_requested.load(Ordering::SeqCst)
	}

	pub(crate) fn aborted(&self) -> bool {
		self.aborted.load(Ordering::SeqCst)
	}
}

/// Socket fed by a [`ScriptHandle`]. Silent when the script runs dry.
///
/// After `send_close` it yields what is still queued, then `in_flight_on_close`, then a close frame.
pub(crate) struct ScriptedSocket {
	rx: mpsc::UnboundedReceiver<Frame>,
	in_flight_on_close: VecDeque<Frame>,
	closing: bool,
	finished: bool,
	close_requested: Arc<AtomicBool>,
	aborted: Arc<AtomicBool>,
}

impl ScriptedSocket {
	pub(crate) fn new(in_flight_on_close: Vec<Frame>) -> (Self, ScriptHandle) {
		let (tx, rx) = mpsc::unbounded_channel();
		let close_requested = Arc::new(AtomicBool::new(false));
		let aborted = Arc::new(AtomicBool::new(false));
		let socket = Self {
			rx,
			in_flight_on_close: in_flight_on_close.into(),
			closing: false,
			finished: false,
			close_requested: close_requested.clone(),
			aborted: aborted.clone(),
		};
		let handle = ScriptHandle {
			tx,
			close_requested,
			aborted,
		};
		(socket, handle)
	}

	fn observe(&mut self, frame: Frame) -> Frame {
		if !matches!(frame, Frame::Text(_)) {
			self.finished = true;
		}
		frame
	}
}

#[async_trait]
impl EventSubSocket for ScriptedSocket {
	async fn next_frame(&mut self) -> Frame {
		if self.finished || self.aborted.load(Ordering::SeqCst) {
			return Frame::Ended;
		}

		if self.closing {
			if let Ok(frame) = self.rx.try_recv() {
				return self.observe(frame);
			}
			if let Some(frame) = self.in_flight_on_close.pop_front() {
				return self.observe(frame);
			}
			self.finished = true;
			return Frame::Closed {
				code: 1000,
				reason: None,
			};
		}

		match self.rx.recv().await {
			Some(frame) => self.observe(frame),
			None => std::future::pending().await,
		}
	}

	async fn send_close(&mut self) -> anyhow::Result<()> {
		self.close_requested.store(true, Ordering::SeqCst);
		self.closing = true;
		Ok(())
	}

	fn is_open(&self) -> bool {
		!self.finished && !self.closing && !self.aborted.load(Ordering::SeqCst)
	}

	fn abort(&mut self) {
		self.aborted.store(true, Ordering::SeqCst);
	}
}

/// Hands out scripted sockets by url host, in scripting order.
#[derive(Clone, Default)]
pub(crate) struct ScriptedConnector {
	sockets: Arc<Mutex<HashMap<String, VecDeque<ScriptedSocket>>>>,
	connects: Arc<Mutex<Vec<Url>>>,
}

impl ScriptedConnector {
	pub(crate) fn script(&self, host: &str) -> ScriptHandle {
		self.script_with_in_flight(host, Vec::new())
	}

	pub(crate) fn script_with_in_flight(&self, host: &str, in_flight_on_close: Vec<Frame>) -> ScriptHandle {
		let (socket, handle) = ScriptedSocket::new(in_flight_on_close);
		self.sockets.lock().entry(host.to_string()).or_default().push_back(socket);
		handle
	}

	pub(crate) fn connects(&self) -> Vec<Url> {
		self.connects.lock().clone()
	}

	pub(crate) fn connector(&self) -> SocketConnector {
		let this = self.clone();
		Arc::new(move |url: Url| {
			let this = this.clone();
			Box::pin(async move {
				this.connects.lock().push(url.clone());
				let host = url.host_str().unwrap_or_default().to_string();
				let socket = this.sockets.lock().get_mut(&host).and_then(VecDeque::pop_front);
				match socket {
					Some(socket) => Ok(Box::new(socket) as BoxSocket),
					None => Err(anyhow::anyhow!("connection refused: {url}")),
				}
			}) as BoxFuture<'static, anyhow::Result<BoxSocket>>
		})
	}
}

/// Wall clock that advances with tokio's (paused) time.
#[derive(Debug)]
pub(crate) struct PausedClock {
	wall_base: SystemTime,
	instant_base: tokio::time::Instant,
}

impl PausedClock {
	pub(crate) fn new() -> Arc<Self> {
		Arc::new(Self {
			wall_base: SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000),
			instant_base: tokio::time::Instant::now(),
		})
	}
}

impl Clock for PausedClock {
	fn now(&self) -> SystemTime {
		self.wall_base + self.instant_base.elapsed()
	}
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct TestFollow {
	pub(crate) user_login: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct TestCondition {
	pub(crate) broadcaster_user_id: String,
}

impl SubscriptionEvent for TestFollow {
	const SUBSCRIPTION_TYPE: &'static str = "channel.follow";
	const SUBSCRIPTION_VERSION: &'static str = "2";
	type Condition = TestCondition;
}

pub(crate) fn test_registry() -> Arc<Registry> {
	let registry = Registry::default();
	registry.register_subscription_type::<TestFollow>();
	Arc::new(registry)
}

fn ts(at: SystemTime) -> String {
	DateTime::<Utc>::from(at).to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn welcome(id: &str, at: SystemTime, keepalive_secs: Option<u64>) -> String {
	json!({
		"metadata": {"message_id": id, "message_type": "session_welcome", "message_timestamp": ts(at)},
		"payload": {"session": {
			"id": format!("session-{id}"),
			"status": "connected",
			"connected_at": ts(at),
			"keepalive_timeout_seconds": keepalive_secs,
			"reconnect_url": null
		}}
	})
	.to_string()
}

pub(crate) fn keepalive(id: &str, at: SystemTime) -> String {
	json!({
		"metadata": {"message_id": id, "message_type": "session_keepalive", "message_timestamp": ts(at)},
		"payload": {}
	})
	.to_string()
}

pub(crate) fn reconnect(id: &str, at: SystemTime, url: Option<&str>) -> String {
	json!({
		"metadata": {"message_id": id, "message_type": "session_reconnect", "message_timestamp": ts(at)},
		"payload": {"session": {
			"id": "session-reconnect",
			"status": "reconnecting",
			"keepalive_timeout_seconds": null,
			"reconnect_url": url,
			"connected_at": ts(at)
		}}
	})
	.to_string()
}

pub(crate) fn follow(id: &str, at: SystemTime, user_login: &str) -> String {
	json!({
		"metadata": {
			"message_id": id,
			"message_type": "notification",
			"message_timestamp": ts(at),
			"subscription_type": "channel.follow",
			"subscription_version": "2"
		},
		"payload": {
			"subscription": subscription_json("channel.follow", "enabled", at),
			"event": {"user_login": user_login}
		}
	})
	.to_string()
}

pub(crate) fn revocation(id: &str, at: SystemTime, subscription_type: &str) -> String {
	json!({
		"metadata": {
			"message_id": id,
			"message_type": "revocation",
			"message_timestamp": ts(at),
			"subscription_type": subscription_type,
			"subscription_version": "1"
		},
		"payload": {"subscription": subscription_json(subscription_type, "authorization_revoked", at)}
	})
	.to_string()
}

fn subscription_json(kind: &str, status: &str, at: SystemTime) -> serde_json::Value {
	json!({
		"id": "f1c2a387-161a-49f9-a165-0f21d7a4e1c4",
		"status": status,
		"type": kind,
		"version": "2",
		"cost": 0,
		"condition": {"broadcaster_user_id": "1337"},
		"transport": {"method": "websocket", "session_id": "session-1"},
		"created_at": ts(at)
	})
}
