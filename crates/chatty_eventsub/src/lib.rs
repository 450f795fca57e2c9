#![forbid(unsafe_code)]

pub mod changeover;
pub mod client;
pub mod config;
pub mod error;
pub mod guard;
pub mod message;
pub mod parse;
pub mod registry;
pub mod socket;
pub mod supervisor;

#[cfg(test)]
mod client_tests;
#[cfg(test)]
mod testing;

pub use client::{DisconnectReason, EventSubClient, RunOutcome};
pub use config::{DEFAULT_EVENTSUB_WS_URL, EventSubConfig, MAX_KEEPALIVE_SECS, MIN_KEEPALIVE_SECS};
pub use error::{ClientError, ConfigError};
pub use guard::{Clock, ClockSkew, MessageGuard, SystemClock, Verdict};
pub use message::{
	AnyMessage, AnyNotification, HasMetadata, Message, MessageKind, Metadata, Notification, NotificationMetadata,
	NotificationPayload, Revocation, Session, SessionKeepalive, SessionReconnect, SessionWelcome, Subscription,
	SubscriptionEvent, Transport,
};
pub use parse::ParseResult;
pub use registry::{Decoder, Registry};
pub use socket::{BoxFuture, BoxSocket, EventSubSocket, Frame, SocketConnector, WsSocket, default_connector};
pub use supervisor::reconnect_throttle;

use tokio::sync::mpsc;

/// Client → application event.
#[derive(Debug)]
pub enum EventSubEvent {
	/// A `session_welcome` was received, either on a fresh socket or at the end of a changeover.
	Connected(SessionWelcome),

	/// A decoded `notification` of some registered subscription type.
	Notification(Box<dyn AnyNotification>),

	/// The server revoked a subscription.
	Revocation(Revocation),
}

pub type EventSubEventTx = mpsc::Sender<EventSubEvent>;
pub type EventSubEventRx = mpsc::Receiver<EventSubEvent>;

/// Bounded event channel sized for bursty notification traffic.
pub fn event_channel(capacity: usize) -> (EventSubEventTx, EventSubEventRx) {
	mpsc::channel(capacity.max(1))
}
