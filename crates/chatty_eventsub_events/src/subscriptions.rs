#![forbid(unsafe_code)]

use std::fmt;

use chatty_eventsub::SubscriptionEvent;
use serde::{Deserialize, Serialize};

use crate::BroadcasterCondition;

/// Subscription tier; serialized as Twitch's numeric strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Tier {
	#[serde(rename = "1000")]
	Tier1,
	#[serde(rename = "2000")]
	Tier2,
	#[serde(rename = "3000")]
	Tier3,
}

impl Tier {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Tier1 => "1000",
			Self::Tier2 => "2000",
			Self::Tier3 => "3000",
		}
	}
}

impl fmt::Display for Tier {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChannelSubscribeEvent {
	pub user_id: String,
	pub user_login: String,
	pub user_name: String,

	pub broadcaster_user_id: String,
	pub broadcaster_user_login: String,
	pub broadcaster_user_name: String,

	pub tier: Tier,
	pub is_gift: bool,
}

impl SubscriptionEvent for ChannelSubscribeEvent {
	const SUBSCRIPTION_TYPE: &'static str = "channel.subscribe";
	const SUBSCRIPTION_VERSION: &'static str = "1";
	type Condition = BroadcasterCondition;
}

/// Gifter fields are `None` when the gift is anonymous.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChannelSubscriptionGiftEvent {
	#[serde(default)]
	pub user_id: Option<String>,
	#[serde(default)]
	pub user_login: Option<String>,
	#[serde(default)]
	pub user_name: Option<String>,

	pub broadcaster_user_id: String,
	pub broadcaster_user_login: String,
	pub broadcaster_user_name: String,

	pub total: u32,
	pub tier: Tier,
	/// Only shared if the gifter opted in; never for anonymous gifts.
	#[serde(default)]
	pub cumulative_total: Option<u32>,
	pub is_anonymous: bool,
}

impl SubscriptionEvent for ChannelSubscriptionGiftEvent {
	const SUBSCRIPTION_TYPE: &'static str = "channel.subscription.gift";
	const SUBSCRIPTION_VERSION: &'static str = "1";
	type Condition = BroadcasterCondition;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SubscriptionEmote {
	pub begin: u32,
	pub end: u32,
	pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SubscriptionMessage {
	#[serde(default)]
	pub text: Option<String>,
	#[serde(default)]
	pub emotes: Option<Vec<SubscriptionEmote>>,
}

/// A resubscription announced in chat.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChannelSubscriptionMessageEvent {
	pub user_id: String,
	pub user_login: String,
	pub user_name: String,

	pub broadcaster_user_id: String,
	pub broadcaster_user_login: String,
	pub broadcaster_user_name: String,

	pub tier: Tier,
	#[serde(default)]
	pub message: Option<SubscriptionMessage>,
	pub cumulative_months: u32,
	#[serde(default)]
	pub streak_months: Option<u32>,
	pub duration_months: u32,
}

impl SubscriptionEvent for ChannelSubscriptionMessageEvent {
	const SUBSCRIPTION_TYPE: &'static str = "channel.subscription.message";
	const SUBSCRIPTION_VERSION: &'static str = "1";
	type Condition = BroadcasterCondition;
}
