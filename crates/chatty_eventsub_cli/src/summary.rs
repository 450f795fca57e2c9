#![forbid(unsafe_code)]

use chatty_eventsub::AnyNotification;
use chatty_eventsub_events::{
	ChannelBanEvent, ChannelChatMessageDeleteEvent, ChannelChatMessageEvent, ChannelChatSettingsUpdateEvent,
	ChannelCheerEvent, ChannelFollowEvent, ChannelPointsRedemptionAddEvent, ChannelPointsRedemptionUpdateEvent,
	ChannelRaidEvent, ChannelSubscribeEvent, ChannelSubscriptionGiftEvent, ChannelSubscriptionMessageEvent,
};

/// One-line human readable summary of a notification, `None` for types this binary does not know.
pub fn summarize(n: &dyn AnyNotification) -> Option<String> {
	if let Some(e) = n.event::<ChannelChatMessageEvent>() {
		return Some(format!("[{}] {}: {}", e.broadcaster_user_login, e.chatter_user_name, e.message.text));
	}
	if let Some(e) = n.event::<ChannelChatMessageDeleteEvent>() {
		return Some(format!(
			"[{}] message {} from {} deleted",
			e.broadcaster_user_login, e.message_id, e.target_user_name
		));
	}
	if let Some(e) = n.event::<ChannelFollowEvent>() {
		return Some(format!("[{}] {} followed", e.broadcaster_user_login, e.user_name));
	}
	if let Some(e) = n.event::<ChannelSubscribeEvent>() {
		let gift = if e.is_gift { " (gift)" } else { "" };
		return Some(format!(
			"[{}] {} subscribed at tier {}{gift}",
			e.broadcaster_user_login, e.user_name, e.tier
		));
	}
	if let Some(e) = n.event::<ChannelSubscriptionGiftEvent>() {
		let gifter = e.user_name.as_deref().unwrap_or("anonymous");
		return Some(format!(
			"[{}] {gifter} gifted {} tier {} subs",
			e.broadcaster_user_login, e.total, e.tier
		));
	}
	if let Some(e) = n.event::<ChannelSubscriptionMessageEvent>() {
		return Some(format!(
			"[{}] {} resubscribed for {} months",
			e.broadcaster_user_login, e.user_name, e.cumulative_months
		));
	}
	if let Some(e) = n.event::<ChannelCheerEvent>() {
		let cheerer = e.user_name.as_deref().unwrap_or("anonymous");
		return Some(format!("[{}] {cheerer} cheered {} bits", e.broadcaster_user_login, e.bits));
	}
	if let Some(e) = n.event::<ChannelRaidEvent>() {
		return Some(format!(
			"[{}] raided by {} with {} viewers",
			e.to_broadcaster_user_login, e.from_broadcaster_user_name, e.viewers
		));
	}
	if let Some(e) = n.event::<ChannelBanEvent>() {
		let what = match e.timeout() {
			Some(d) => format!("timed out for {}s", d.num_seconds()),
			None => "banned".to_string(),
		};
		return Some(format!(
			"[{}] {} {what} by {}",
			e.broadcaster_user_login, e.user_name, e.moderator_user_name
		));
	}
	if let Some(e) = n.event::<ChannelPointsRedemptionAddEvent>() {
		return Some(format!(
			"[{}] {} redeemed \"{}\" ({} points)",
			e.broadcaster_user_login, e.user_name, e.reward.title, e.reward.cost
		));
	}
	if let Some(e) = n.event::<ChannelPointsRedemptionUpdateEvent>() {
		return Some(format!(
			"[{}] redemption of \"{}\" by {} is now {:?}",
			e.broadcaster_user_login, e.reward.title, e.user_name, e.status
		));
	}
	if let Some(e) = n.event::<ChannelChatSettingsUpdateEvent>() {
		let slow = match e.slow_mode_wait_time_seconds {
			Some(secs) if e.slow_mode => format!("slow {secs}s"),
			_ => "slow off".to_string(),
		};
		return Some(format!(
			"[{}] chat settings: {slow}, emote-only {}, subscribers-only {}",
			e.broadcaster_user_login, e.emote_mode, e.subscriber_mode
		));
	}
	None
}
