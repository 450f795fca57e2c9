#![forbid(unsafe_code)]

use chatty_eventsub::SubscriptionEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::BroadcasterCondition;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChannelFollowCondition {
	pub broadcaster_user_id: String,
	pub moderator_user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChannelFollowEvent {
	pub user_id: String,
	pub user_login: String,
	pub user_name: String,

	pub broadcaster_user_id: String,
	pub broadcaster_user_login: String,
	pub broadcaster_user_name: String,

	pub followed_at: DateTime<Utc>,
}

impl SubscriptionEvent for ChannelFollowEvent {
	const SUBSCRIPTION_TYPE: &'static str = "channel.follow";
	const SUBSCRIPTION_VERSION: &'static str = "2";
	type Condition = ChannelFollowCondition;
}

/// Either side of the raid may be the subscribed broadcaster.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChannelRaidCondition {
	#[serde(default)]
	pub from_broadcaster_user_id: Option<String>,
	#[serde(default)]
	pub to_broadcaster_user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChannelRaidEvent {
	pub from_broadcaster_user_id: String,
	pub from_broadcaster_user_login: String,
	pub from_broadcaster_user_name: String,

	pub to_broadcaster_user_id: String,
	pub to_broadcaster_user_login: String,
	pub to_broadcaster_user_name: String,

	pub viewers: u64,
}

impl SubscriptionEvent for ChannelRaidEvent {
	const SUBSCRIPTION_TYPE: &'static str = "channel.raid";
	const SUBSCRIPTION_VERSION: &'static str = "1";
	type Condition = ChannelRaidCondition;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChannelBanEvent {
	pub user_id: String,
	pub user_login: String,
	pub user_name: String,

	pub broadcaster_user_id: String,
	pub broadcaster_user_login: String,
	pub broadcaster_user_name: String,

	pub moderator_user_id: String,
	pub moderator_user_login: String,
	pub moderator_user_name: String,

	#[serde(default)]
	pub reason: Option<String>,

	pub banned_at: DateTime<Utc>,

	/// Set for timeouts; `None` if permanent.
	#[serde(default)]
	pub ends_at: Option<DateTime<Utc>>,

	pub is_permanent: bool,
}

impl ChannelBanEvent {
	/// Timeout length, `None` for permanent bans.
	pub fn timeout(&self) -> Option<chrono::Duration> {
		self.ends_at.map(|ends_at| ends_at - self.banned_at)
	}
}

impl SubscriptionEvent for ChannelBanEvent {
	const SUBSCRIPTION_TYPE: &'static str = "channel.ban";
	const SUBSCRIPTION_VERSION: &'static str = "1";
	type Condition = BroadcasterCondition;
}

/// User fields are absent for anonymous cheers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChannelCheerEvent {
	pub is_anonymous: bool,

	#[serde(default)]
	pub user_id: Option<String>,
	#[serde(default)]
	pub user_login: Option<String>,
	#[serde(default)]
	pub user_name: Option<String>,

	pub broadcaster_user_id: String,
	pub broadcaster_user_login: String,
	pub broadcaster_user_name: String,

	#[serde(default)]
	pub message: Option<String>,

	pub bits: u64,
}

impl SubscriptionEvent for ChannelCheerEvent {
	const SUBSCRIPTION_TYPE: &'static str = "channel.cheer";
	const SUBSCRIPTION_VERSION: &'static str = "1";
	type Condition = BroadcasterCondition;
}
