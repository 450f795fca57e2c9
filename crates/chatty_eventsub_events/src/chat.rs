#![forbid(unsafe_code)]

use std::collections::HashSet;

use chatty_eventsub::SubscriptionEvent;
use serde::{Deserialize, Serialize};

/// Chat subscriptions are read on behalf of a user.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChatCondition {
	pub broadcaster_user_id: String,
	pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChatBadge {
	pub set_id: String,
	pub id: String,
	#[serde(default)]
	pub info: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FragmentEmote {
	pub id: String,
	#[serde(default)]
	pub emote_set_id: Option<String>,
	#[serde(default)]
	pub owner_id: Option<String>,
	#[serde(default)]
	pub format: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FragmentCheermote {
	pub prefix: String,
	pub bits: u64,
	pub tier: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FragmentMention {
	pub user_id: String,
	pub user_name: String,
	pub user_login: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChatFragment {
	/// `text`, `cheermote`, `emote` or `mention`.
	#[serde(rename = "type")]
	pub kind: String,
	pub text: String,
	#[serde(default)]
	pub cheermote: Option<FragmentCheermote>,
	#[serde(default)]
	pub emote: Option<FragmentEmote>,
	#[serde(default)]
	pub mention: Option<FragmentMention>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChatMessageContent {
	pub text: String,
	#[serde(default)]
	pub fragments: Vec<ChatFragment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChatCheer {
	pub bits: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChatReply {
	pub parent_message_id: String,
	pub parent_message_body: String,
	pub parent_user_id: String,
	pub parent_user_name: String,
	pub parent_user_login: String,
	pub thread_message_id: String,
	pub thread_user_id: String,
	pub thread_user_name: String,
	pub thread_user_login: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChannelChatMessageEvent {
	pub broadcaster_user_id: String,
	pub broadcaster_user_login: String,
	pub broadcaster_user_name: String,

	pub chatter_user_id: String,
	pub chatter_user_login: String,
	pub chatter_user_name: String,

	pub message_id: String,
	pub message: ChatMessageContent,

	/// `text`, `channel_points_highlighted`, `user_intro`, ...
	#[serde(default)]
	pub message_type: Option<String>,
	#[serde(default)]
	pub badges: Vec<ChatBadge>,
	#[serde(default)]
	pub cheer: Option<ChatCheer>,
	#[serde(default)]
	pub color: Option<String>,
	#[serde(default)]
	pub reply: Option<ChatReply>,
	#[serde(default)]
	pub channel_points_custom_reward_id: Option<String>,
}

impl ChannelChatMessageEvent {
	/// Emotes used in the message as `(id, code)`, first occurrence only.
	pub fn emotes(&self) -> Vec<(&str, &str)> {
		let mut seen = HashSet::new();
		let mut emotes = Vec::new();
		for fragment in &self.message.fragments {
			if fragment.kind != "emote" {
				continue;
			}

			let Some(emote) = fragment.emote.as_ref() else {
				continue;
			};

			if !seen.insert(emote.id.as_str()) {
				continue;
			}

			emotes.push((emote.id.as_str(), fragment.text.as_str()));
		}

		emotes
	}
}

impl SubscriptionEvent for ChannelChatMessageEvent {
	const SUBSCRIPTION_TYPE: &'static str = "channel.chat.message";
	const SUBSCRIPTION_VERSION: &'static str = "1";
	type Condition = ChatCondition;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChannelChatMessageDeleteEvent {
	pub broadcaster_user_id: String,
	pub broadcaster_user_login: String,
	pub broadcaster_user_name: String,

	pub target_user_id: String,
	pub target_user_login: String,
	pub target_user_name: String,

	pub message_id: String,
}

impl SubscriptionEvent for ChannelChatMessageDeleteEvent {
	const SUBSCRIPTION_TYPE: &'static str = "channel.chat.message_delete";
	const SUBSCRIPTION_VERSION: &'static str = "1";
	type Condition = ChatCondition;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChannelChatSettingsUpdateEvent {
	pub broadcaster_user_id: String,
	pub broadcaster_user_login: String,
	pub broadcaster_user_name: String,

	pub emote_mode: bool,
	pub follower_mode: bool,
	/// Minimum follow age in minutes; `None` when follower mode is off.
	#[serde(default)]
	pub follower_mode_duration_minutes: Option<u32>,
	pub slow_mode: bool,
	#[serde(default)]
	pub slow_mode_wait_time_seconds: Option<u32>,
	pub subscriber_mode: bool,
	pub unique_chat_mode: bool,
}

impl SubscriptionEvent for ChannelChatSettingsUpdateEvent {
	const SUBSCRIPTION_TYPE: &'static str = "channel.chat_settings.update";
	const SUBSCRIPTION_VERSION: &'static str = "1";
	type Condition = ChatCondition;
}
