#![forbid(unsafe_code)]

use std::any::Any;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// `metadata.message_type` of the notification envelope; sub-dispatched by subscription type.
pub const NOTIFICATION_MESSAGE_TYPE: &str = "notification";

/// EventSub metadata (present on all WebSocket messages).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Metadata {
	pub message_id: String,
	pub message_type: String,
	pub message_timestamp: DateTime<Utc>,
}

/// Metadata of `notification` and `revocation` messages.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NotificationMetadata {
	#[serde(flatten)]
	pub base: Metadata,
	pub subscription_type: String,
	pub subscription_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Session {
	pub id: String,
	#[serde(default)]
	pub status: Option<String>,
	#[serde(default)]
	pub keepalive_timeout_seconds: Option<u64>,
	#[serde(default)]
	pub reconnect_url: Option<String>,
	#[serde(default)]
	pub connected_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SessionPayload {
	pub session: Session,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SessionWelcome {
	pub metadata: Metadata,
	pub payload: SessionPayload,
}

impl SessionWelcome {
	pub fn session(&self) -> &Session {
		&self.payload.session
	}
}

/// Keepalives carry an empty payload; their only job is to refresh the liveness deadline.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SessionKeepalive {
	pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SessionReconnect {
	pub metadata: Metadata,
	pub payload: SessionPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Transport {
	pub method: String,
	#[serde(default)]
	pub session_id: Option<String>,
}

/// Subscription object as embedded in notifications and revocations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Subscription<C> {
	pub id: String,
	pub status: String,
	#[serde(rename = "type")]
	pub kind: String,
	pub version: String,
	#[serde(default)]
	pub cost: u32,
	pub condition: C,
	pub transport: Transport,
	pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RevocationPayload {
	pub subscription: Subscription<serde_json::Value>,
}

/// Sent once when the server stops delivering a subscription (`status` says why).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Revocation {
	pub metadata: NotificationMetadata,
	pub payload: RevocationPayload,
}

/// A concrete subscription event payload, keyed by `metadata.subscription_type`.
pub trait SubscriptionEvent: DeserializeOwned + fmt::Debug + Clone + PartialEq + Send + Sync + 'static {
	const SUBSCRIPTION_TYPE: &'static str;
	const SUBSCRIPTION_VERSION: &'static str;

	type Condition: DeserializeOwned + fmt::Debug + Clone + PartialEq + Send + Sync + 'static;
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(bound(deserialize = "E: SubscriptionEvent"))]
pub struct NotificationPayload<E: SubscriptionEvent> {
	pub subscription: Subscription<E::Condition>,
	pub event: E,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(bound(deserialize = "E: SubscriptionEvent"))]
pub struct Notification<E: SubscriptionEvent> {
	pub metadata: NotificationMetadata,
	pub payload: NotificationPayload<E>,
}

impl<E: SubscriptionEvent> Notification<E> {
	pub fn event(&self) -> &E {
		&self.payload.event
	}

	pub fn condition(&self) -> &E::Condition {
		&self.payload.subscription.condition
	}
}

/// Type-erased notification as handed to the application.
pub trait AnyNotification: fmt::Debug + Send + Sync {
	fn metadata(&self) -> &NotificationMetadata;
	fn subscription_id(&self) -> &str;
	fn subscription_type(&self) -> &'static str;
	fn subscription_version(&self) -> &'static str;
	fn as_any(&self) -> &dyn Any;
}

impl<E: SubscriptionEvent> AnyNotification for Notification<E> {
	fn metadata(&self) -> &NotificationMetadata {
		&self.metadata
	}

	fn subscription_id(&self) -> &str {
		&self.payload.subscription.id
	}

	fn subscription_type(&self) -> &'static str {
		E::SUBSCRIPTION_TYPE
	}

	fn subscription_version(&self) -> &'static str {
		E::SUBSCRIPTION_VERSION
	}

	fn as_any(&self) -> &dyn Any {
		self
	}
}

impl<'a> dyn AnyNotification + 'a {
	pub fn downcast_ref<E: SubscriptionEvent>(&self) -> Option<&Notification<E>> {
		self.as_any().downcast_ref::<Notification<E>>()
	}

	pub fn event<E: SubscriptionEvent>(&self) -> Option<&E> {
		self.downcast_ref::<E>().map(Notification::event)
	}

	pub fn is<E: SubscriptionEvent>(&self) -> bool {
		self.as_any().is::<Notification<E>>()
	}
}

/// Access to the envelope metadata shared by every message kind.
pub trait HasMetadata {
	fn metadata(&self) -> &Metadata;
}

/// A top-level message kind, keyed by `metadata.message_type`.
///
/// Custom kinds surface as [`Message::Other`]; the four built-in kinds map onto their own variants.
pub trait MessageKind: HasMetadata + DeserializeOwned + fmt::Debug + Send + Sync + 'static {
	const MESSAGE_TYPE: &'static str;

	fn into_message(self) -> Message
	where
		Self: Sized,
	{
		Message::Other(Box::new(self))
	}
}

/// Type-erased custom message kind.
pub trait AnyMessage: HasMetadata + fmt::Debug + Send + Sync {
	fn message_type(&self) -> &'static str;
	fn as_any(&self) -> &dyn Any;
}

impl<T: MessageKind> AnyMessage for T {
	fn message_type(&self) -> &'static str {
		T::MESSAGE_TYPE
	}

	fn as_any(&self) -> &dyn Any {
		self
	}
}

impl<'a> dyn AnyMessage + 'a {
	pub fn downcast_ref<T: MessageKind>(&self) -> Option<&T> {
		self.as_any().downcast_ref::<T>()
	}
}

#[derive(Debug)]
pub enum Message {
	Welcome(SessionWelcome),
	Keepalive(SessionKeepalive),
	Reconnect(SessionReconnect),
	Revocation(Revocation),
	Notification(Box<dyn AnyNotification>),
	Other(Box<dyn AnyMessage>),
}

impl Message {
	pub fn metadata(&self) -> &Metadata {
		match self {
			Self::Welcome(m) => &m.metadata,
			Self::Keepalive(m) => &m.metadata,
			Self::Reconnect(m) => &m.metadata,
			Self::Revocation(m) => &m.metadata.base,
			Self::Notification(n) => &n.metadata().base,
			Self::Other(m) => m.metadata(),
		}
	}

	pub fn message_type(&self) -> &str {
		&self.metadata().message_type
	}
}

impl HasMetadata for SessionWelcome {
	fn metadata(&self) -> &Metadata {
		&self.metadata
	}
}

impl MessageKind for SessionWelcome {
	const MESSAGE_TYPE: &'static str = "session_welcome";

	fn into_message(self) -> Message {
		Message::Welcome(self)
	}
}

impl HasMetadata for SessionKeepalive {
	fn metadata(&self) -> &Metadata {
		&self.metadata
	}
}

impl MessageKind for SessionKeepalive {
	const MESSAGE_TYPE: &'static str = "session_keepalive";

	fn into_message(self) -> Message {
		Message::Keepalive(self)
	}
}

impl HasMetadata for SessionReconnect {
	fn metadata(&self) -> &Metadata {
		&self.metadata
	}
}

impl MessageKind for SessionReconnect {
	const MESSAGE_TYPE: &'static str = "session_reconnect";

	fn into_message(self) -> Message {
		Message::Reconnect(self)
	}
}

impl HasMetadata for Revocation {
	fn metadata(&self) -> &Metadata {
		&self.metadata.base
	}
}

impl MessageKind for Revocation {
	const MESSAGE_TYPE: &'static str = "revocation";

	fn into_message(self) -> Message {
		Message::Revocation(self)
	}
}
