#![forbid(unsafe_code)]

use serde_json::Value;

use crate::message::{Message, NOTIFICATION_MESSAGE_TYPE};
use crate::registry::{Decoder, Registry};

/// Outcome of [`Registry::parse`]. Every input maps onto exactly one variant.
#[derive(Debug)]
pub enum ParseResult {
	Ok(Message),
	InvalidMessage(String),
	UnknownMessageType(String),
	UnknownSubscriptionType(String),
}

impl ParseResult {
	pub fn ok(self) -> Option<Message> {
		match self {
			Self::Ok(message) => Some(message),
			_ => None,
		}
	}
}

impl Registry {
	/// Decode one raw text frame.
	pub fn parse(&self, raw: &str) -> ParseResult {
		let value: Value = match serde_json::from_str(raw) {
			Ok(v) => v,
			Err(e) => return ParseResult::InvalidMessage(format!("not valid json: {e}")),
		};

		let Some(metadata) = value.get("metadata") else {
			return ParseResult::InvalidMessage("missing metadata".to_string());
		};
		let message_type = match string_field(metadata, "message_type") {
			Ok(t) => t.to_string(),
			Err(reason) => return ParseResult::InvalidMessage(reason),
		};

		if message_type == NOTIFICATION_MESSAGE_TYPE {
			let subscription_type = match string_field(metadata, "subscription_type") {
				Ok(t) => t.to_string(),
				Err(reason) => return ParseResult::InvalidMessage(reason),
			};
			return match self.subscription_decoder(&subscription_type) {
				Some(decoder) => decode(&decoder, value, &subscription_type),
				None => ParseResult::UnknownSubscriptionType(subscription_type),
			};
		}

		match self.message_decoder(&message_type) {
			Some(decoder) => decode(&decoder, value, &message_type),
			None => ParseResult::UnknownMessageType(message_type),
		}
	}
}

fn string_field<'a>(metadata: &'a Value, field: &str) -> Result<&'a str, String> {
	match metadata.get(field) {
		Some(Value::String(s)) => Ok(s),
		Some(other) => Err(format!("metadata.{field} must be a string, got {}", json_kind(other))),
		None => Err(format!("missing metadata.{field}")),
	}
}

fn json_kind(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "bool",
		Value::Number(_) => "number",
		Value::String(_) => "string",
		Value::Array(_) => "array",
		Value::Object(_) => "object",
	}
}

fn decode(decoder: &Decoder, value: Value, tag: &str) -> ParseResult {
	match decoder(value) {
		Ok(message) => ParseResult::Ok(message),
		Err(e) => ParseResult::InvalidMessage(format!("failed to decode {tag}: {e}")),
	}
}
