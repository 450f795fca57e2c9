#![forbid(unsafe_code)]

use std::ops::Deref;

use chatty_eventsub::SubscriptionEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChannelPointsRedemptionCondition {
	pub broadcaster_user_id: String,
	/// Restricts the subscription to a single reward.
	#[serde(default)]
	pub reward_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RedemptionStatus {
	Unknown,
	Unfulfilled,
	Fulfilled,
	Canceled,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RedemptionReward {
	pub id: String,
	pub title: String,
	pub cost: u64,
	#[serde(default)]
	pub prompt: String,
}

/// Body shared by the redemption `add` and `update` notifications.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Redemption {
	pub id: String,

	pub broadcaster_user_id: String,
	pub broadcaster_user_login: String,
	pub broadcaster_user_name: String,

	pub user_id: String,
	pub user_login: String,
	pub user_name: String,

	#[serde(default)]
	pub user_input: String,
	pub status: RedemptionStatus,
	pub reward: RedemptionReward,
	pub redeemed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ChannelPointsRedemptionAddEvent(pub Redemption);

impl Deref for ChannelPointsRedemptionAddEvent {
	type Target = Redemption;

	fn deref(&self) -> &Redemption {
		&self.0
	}
}

impl SubscriptionEvent for ChannelPointsRedemptionAddEvent {
	const SUBSCRIPTION_TYPE: &'static str = "channel.channel_points_custom_reward_redemption.add";
	const SUBSCRIPTION_VERSION: &'static str = "1";
	type Condition = ChannelPointsRedemptionCondition;
}

/// A moderator fulfilled or canceled a redemption.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ChannelPointsRedemptionUpdateEvent(pub Redemption);

impl Deref for ChannelPointsRedemptionUpdateEvent {
	type Target = Redemption;

	fn deref(&self) -> &Redemption {
		&self.0
	}
}

impl SubscriptionEvent for ChannelPointsRedemptionUpdateEvent {
	const SUBSCRIPTION_TYPE: &'static str = "channel.channel_points_custom_reward_redemption.update";
	const SUBSCRIPTION_VERSION: &'static str = "1";
	type Condition = ChannelPointsRedemptionCondition;
}
