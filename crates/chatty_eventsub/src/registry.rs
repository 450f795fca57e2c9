#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::message::{
	Message, MessageKind, NOTIFICATION_MESSAGE_TYPE, Notification, Revocation, SessionKeepalive, SessionReconnect,
	SessionWelcome, SubscriptionEvent,
};

/// Turns a whole message envelope into a [`Message`].
pub type Decoder = Arc<dyn Fn(serde_json::Value) -> Result<Message, serde_json::Error> + Send + Sync>;

/// Tag → decoder tables for top-level message types and notification subscription types.
///
/// Registration is expected at startup, but lookups stay safe while another thread registers.
/// Re-registering a tag replaces the previous decoder.
pub struct Registry {
	message_types: RwLock<HashMap<String, Decoder>>,
	subscription_types: RwLock<HashMap<String, Decoder>>,
}

impl Registry {
	/// An empty registry: every message parses as an unknown type.
	pub fn new() -> Self {
		Self {
			message_types: RwLock::new(HashMap::new()),
			subscription_types: RwLock::new(HashMap::new()),
		}
	}

	pub fn register_message_type<T: MessageKind>(&self) {
		self.register_message_decoder(T::MESSAGE_TYPE, |value| {
			serde_json::from_value::<T>(value).map(T::into_message)
		});
	}

	pub fn register_subscription_type<E: SubscriptionEvent>(&self) {
		self.register_subscription_decoder(E::SUBSCRIPTION_TYPE, |value| {
			serde_json::from_value::<Notification<E>>(value).map(|n| Message::Notification(Box::new(n)))
		});
	}

	pub fn register_message_decoder<F>(&self, message_type: impl Into<String>, decode: F)
	where
		F: Fn(serde_json::Value) -> Result<Message, serde_json::Error> + Send + Sync + 'static,
	{
		let message_type = message_type.into();
		if message_type == NOTIFICATION_MESSAGE_TYPE {
			warn!("message decoder registered for `notification` is never used; register a subscription type instead");
		}
		insert(&self.message_types, message_type, Arc::new(decode), "message type");
	}

	pub fn register_subscription_decoder<F>(&self, subscription_type: impl Into<String>, decode: F)
	where
		F: Fn(serde_json::Value) -> Result<Message, serde_json::Error> + Send + Sync + 'static,
	{
		insert(
			&self.subscription_types,
			subscription_type.into(),
			Arc::new(decode),
			"subscription type",
		);
	}

	pub(crate) fn message_decoder(&self, message_type: &str) -> Option<Decoder> {
		self.message_types.read().get(message_type).cloned()
	}

	pub(crate) fn subscription_decoder(&self, subscription_type: &str) -> Option<Decoder> {
		self.subscription_types.read().get(subscription_type).cloned()
	}

	pub fn message_types(&self) -> Vec<String> {
		sorted_keys(&self.message_types)
	}

	pub fn subscription_types(&self) -> Vec<String> {
		sorted_keys(&self.subscription_types)
	}
}

fn insert(table: &RwLock<HashMap<String, Decoder>>, tag: String, decoder: Decoder, what: &'static str) {
	let replaced = table.write().insert(tag.clone(), decoder).is_some();
	if replaced {
		debug!(tag = %tag, "replaced registered eventsub {what}");
	} else {
		debug!(tag = %tag, "registered eventsub {what}");
	}
}

fn sorted_keys(table: &RwLock<HashMap<String, Decoder>>) -> Vec<String> {
	let mut keys: Vec<String> = table.read().keys().cloned().collect();
	keys.sort();
	keys
}

impl Default for Registry {
	/// Registry holding the four built-in session message kinds.
	fn default() -> Self {
		let registry = Self::new();
		registry.register_message_type::<SessionWelcome>();
		registry.register_message_type::<SessionKeepalive>();
		registry.register_message_type::<SessionReconnect>();
		registry.register_message_type::<Revocation>();
		registry
	}
}

impl fmt::Debug for Registry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Registry")
			.field("message_types", &self.message_types())
			.field("subscription_types", &self.subscription_types())
			.finish()
	}
}
