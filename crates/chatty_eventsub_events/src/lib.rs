#![forbid(unsafe_code)]

//! Notification payloads for the Twitch EventSub subscription types this workspace consumes.

pub mod channel;
pub mod channel_points;
pub mod chat;
pub mod subscriptions;


use std::sync::Arc;

use chatty_eventsub::Registry;
use serde::{Deserialize, Serialize};

pub use channel::{ChannelBanEvent, ChannelCheerEvent, ChannelFollowCondition, ChannelFollowEvent, ChannelRaidCondition, ChannelRaidEvent};
pub use channel_points::{
	ChannelPointsRedemptionAddEvent, ChannelPointsRedemptionCondition, ChannelPointsRedemptionUpdateEvent, Redemption,
	RedemptionReward, RedemptionStatus,
};
pub use chat::{
	ChannelChatMessageDeleteEvent, ChannelChatMessageEvent, ChannelChatSettingsUpdateEvent, ChatBadge, ChatCondition, ChatFragment, ChatMessageContent,
	FragmentEmote,
};
pub use subscriptions::{
	ChannelSubscribeEvent, ChannelSubscriptionGiftEvent, ChannelSubscriptionMessageEvent, SubscriptionEmote,
	SubscriptionMessage, Tier,
};

/// Condition of subscription types scoped to one broadcaster.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BroadcasterCondition {
	pub broadcaster_user_id: String,
}

/// Register every notification type of this crate.
pub fn register_all(registry: &Registry) {
	registry.register_subscription_type::<ChannelFollowEvent>();
	registry.register_subscription_type::<ChannelChatMessageEvent>();
	registry.register_subscription_type::<ChannelChatMessageDeleteEvent>();
	registry.register_subscription_type::<ChannelChatSettingsUpdateEvent>();
	registry.register_subscription_type::<ChannelSubscribeEvent>();
	registry.register_subscription_type::<ChannelSubscriptionGiftEvent>();
	registry.register_subscription_type::<ChannelSubscriptionMessageEvent>();
	registry.register_subscription_type::<ChannelCheerEvent>();
	registry.register_subscription_type::<ChannelRaidEvent>();
	registry.register_subscription_type::<ChannelBanEvent>();
	registry.register_subscription_type::<ChannelPointsRedemptionAddEvent>();
	registry.register_subscription_type::<ChannelPointsRedemptionUpdateEvent>();
}

/// Built-in session messages plus every notification type of this crate.
pub fn default_registry() -> Arc<Registry> {
	let registry = Registry::default();
	register_all(&registry);
	Arc::new(registry)
}
