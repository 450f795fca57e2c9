#![forbid(unsafe_code)]

use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_EVENTSUB_WS_URL: &str = "wss://eventsub.wss.twitch.tv/ws";

pub const MIN_KEEPALIVE_SECS: u32 = 10;
pub const MAX_KEEPALIVE_SECS: u32 = 600;

/// Keepalive assumed until a welcome states one, when none was requested.
pub const FALLBACK_KEEPALIVE: Duration = Duration::from_secs(MAX_KEEPALIVE_SECS as u64);

const KEEPALIVE_QUERY_PARAM: &str = "keepalive_timeout_seconds";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSubConfig {
	pub url: String,

	/// Requested from the server through the connect url. Valid range: 10..=600.
	pub keepalive_timeout_seconds: Option<u32>,

	/// Replay window: older messages are dropped, ids are remembered this long.
	pub max_message_age: Duration,

	/// Added to the keepalive interval before declaring the connection dead; also the clock-skew grace.
	pub keepalive_grace: Duration,

	/// Bound on the graceful close (close frame sent, waiting for the peer to finish).
	pub close_timeout: Duration,

	/// How long a changeover may take to deliver its welcome.
	pub changeover_timeout: Duration,

	pub reconnect_min_delay: Duration,
	pub reconnect_max_delay: Duration,

	/// Connect attempts within this window count towards reconnect throttling.
	pub reconnect_window: Duration,
}

impl EventSubConfig {
	pub fn new(url: impl Into<String>) -> Self {
		Self {
			url: url.into(),
			keepalive_timeout_seconds: None,
			max_message_age: Duration::from_secs(10 * 60),
			keepalive_grace: Duration::from_secs(5),
			close_timeout: Duration::from_secs(5),
			changeover_timeout: Duration::from_secs(30),
			reconnect_min_delay: Duration::from_secs(1),
			reconnect_max_delay: Duration::from_secs(30),
			reconnect_window: Duration::from_secs(10 * 60),
		}
	}

	pub fn with_keepalive_timeout_seconds(mut self, secs: u32) -> Self {
		self.keepalive_timeout_seconds = Some(secs);
		self
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if let Some(secs) = self.keepalive_timeout_seconds
			&& !(MIN_KEEPALIVE_SECS..=MAX_KEEPALIVE_SECS).contains(&secs)
		{
			return Err(ConfigError::KeepaliveOutOfRange(secs));
		}

		for (name, value) in [
			("max_message_age", self.max_message_age),
			("close_timeout", self.close_timeout),
			("changeover_timeout", self.changeover_timeout),
			("reconnect_window", self.reconnect_window),
		] {
			if value.is_zero() {
				return Err(ConfigError::ZeroDuration(name));
			}
		}

		if self.reconnect_min_delay > self.reconnect_max_delay {
			return Err(ConfigError::InvertedReconnectDelays {
				min: self.reconnect_min_delay,
				max: self.reconnect_max_delay,
			});
		}

		self.connect_url().map(|_| ())
	}

	/// The url to open, with the requested keepalive appended as a query parameter.
	pub fn connect_url(&self) -> Result<Url, ConfigError> {
		let mut url = Url::parse(&self.url).map_err(|source| ConfigError::InvalidUrl {
			url: self.url.clone(),
			source,
		})?;

		if !matches!(url.scheme(), "ws" | "wss") {
			return Err(ConfigError::UnsupportedScheme(url.scheme().to_string()));
		}

		if let Some(secs) = self.keepalive_timeout_seconds {
			url.query_pairs_mut().append_pair(KEEPALIVE_QUERY_PARAM, &secs.to_string());
		}
		Ok(url)
	}

	/// Keepalive interval in effect before the first welcome.
	pub fn initial_keepalive(&self) -> Duration {
		self.keepalive_timeout_seconds
			.map(|secs| Duration::from_secs(u64::from(secs)))
			.unwrap_or(FALLBACK_KEEPALIVE)
	}
}

impl Default for EventSubConfig {
	fn default() -> Self {
		Self::new(DEFAULT_EVENTSUB_WS_URL)
	}
}

/// Clamp a server-stated keepalive into the supported range.
pub(crate) fn clamp_keepalive(secs: u64) -> Duration {
	Duration::from_secs(secs.clamp(u64::from(MIN_KEEPALIVE_SECS), u64::from(MAX_KEEPALIVE_SECS)))
}
