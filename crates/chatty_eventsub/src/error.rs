#![forbid(unsafe_code)]

use std::time::Duration;

use thiserror::Error;

/// Rejected client configuration; raised before any connection attempt.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("keepalive_timeout_seconds must be between 10 and 600, got {0}")]
	KeepaliveOutOfRange(u32),

	#[error("invalid eventsub url {url:?}: {source}")]
	InvalidUrl {
		url: String,
		#[source]
		source: url::ParseError,
	},

	#[error("unsupported eventsub url scheme {0:?} (expected ws or wss)")]
	UnsupportedScheme(String),

	#[error("{0} must be greater than zero")]
	ZeroDuration(&'static str),

	#[error("reconnect_min_delay ({min:?}) exceeds reconnect_max_delay ({max:?})")]
	InvertedReconnectDelays { min: Duration, max: Duration },
}

/// Fatal outcome of a connection run. The server broke the protocol or the client itself failed.
#[derive(Debug, Error)]
pub enum ClientError {
	#[error("eventsub protocol violation: {0}")]
	ProtocolViolation(String),

	#[error("eventsub changeover failed: {0:#}")]
	Changeover(anyhow::Error),

	#[error("eventsub client internal error: {0}")]
	Internal(String),
}

impl ClientError {
	pub(crate) fn violation(reason: impl Into<String>) -> Self {
		Self::ProtocolViolation(reason.into())
	}
}
