#![forbid(unsafe_code)]

use std::fmt;
use std::time::{Duration, SystemTime};

use chatty_util::TtlSet;

use crate::message::Metadata;

/// Wall-clock source used for freshness checks.
pub trait Clock: fmt::Debug + Send + Sync {
	fn now(&self) -> SystemTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> SystemTime {
		SystemTime::now()
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
	Fresh,
	Stale { age: Duration },
	Duplicate,
}

/// Local clock offset relative to a message timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSkew {
	/// Local time is later than the message timestamp.
	ClientAhead(Duration),
	/// Local time is earlier than the message timestamp.
	ClientBehind(Duration),
}

impl ClockSkew {
	pub fn magnitude(&self) -> Duration {
		match *self {
			Self::ClientAhead(d) | Self::ClientBehind(d) => d,
		}
	}
}

/// Replay protection: staleness check plus a time-windowed set of seen message ids.
#[derive(Debug)]
pub struct MessageGuard {
	max_message_age: Duration,
	clock_skew_grace: Duration,
	seen: TtlSet<String>,
}

impl MessageGuard {
	pub fn new(max_message_age: Duration, clock_skew_grace: Duration) -> Self {
		Self {
			max_message_age,
			clock_skew_grace,
			seen: TtlSet::new(max_message_age),
		}
	}

	pub fn max_message_age(&self) -> Duration {
		self.max_message_age
	}

	/// Stale messages are not recorded, so a stale copy never shadows a later fresh one.
	pub fn check(&mut self, metadata: &Metadata, now: SystemTime) -> Verdict {
		let sent_at = SystemTime::from(metadata.message_timestamp);
		if let Ok(age) = now.duration_since(sent_at)
			&& age > self.max_message_age
		{
			return Verdict::Stale { age };
		}

		if self.seen.insert(metadata.message_id.clone(), now) {
			Verdict::Fresh
		} else {
			Verdict::Duplicate
		}
	}

	/// Mark a message as seen without judging it.
	pub fn record(&mut self, metadata: &Metadata, now: SystemTime) {
		self.seen.insert(metadata.message_id.clone(), now);
	}

	/// `Some` only when the offset exceeds the grace period.
	pub fn clock_skew(&self, metadata: &Metadata, now: SystemTime) -> Option<ClockSkew> {
		let sent_at = SystemTime::from(metadata.message_timestamp);
		let skew = match now.duration_since(sent_at) {
			Ok(ahead) => ClockSkew::ClientAhead(ahead),
			Err(e) => ClockSkew::ClientBehind(e.duration()),
		};
		(skew.magnitude() > self.clock_skew_grace).then_some(skew)
	}

	pub fn seen_len(&self) -> usize {
		self.seen.len()
	}
}
