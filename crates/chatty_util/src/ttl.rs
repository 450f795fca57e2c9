#![forbid(unsafe_code)]

//! Time-windowed collections with lazy eviction.
//!
//! Both types are generic over the time source so callers can use wall-clock
//! `SystemTime` (message timestamps) or a monotonic instant (connect attempts).
//! Time is always passed in explicitly; nothing here reads a clock.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::ops::Add;
use std::time::{Duration, SystemTime};

/// A set whose members expire `ttl` after insertion.
#[derive(Debug, Clone)]
pub struct TtlSet<T, I = SystemTime> {
	ttl: Duration,
	expiry_by_value: HashMap<T, I>,
	queue: VecDeque<(I, T)>,
}

impl<T, I> TtlSet<T, I>
where
	T: Eq + Hash + Clone,
	I: Copy + Ord + Add<Duration, Output = I>,
{
	pub fn new(ttl: Duration) -> Self {
		Self {
			ttl,
			expiry_by_value: HashMap::new(),
			queue: VecDeque::new(),
		}
	}

	pub fn ttl(&self) -> Duration {
		self.ttl
	}

	/// Insert `value`, returning `false` if it is already present and not yet expired.
	pub fn insert(&mut self, value: T, now: I) -> bool {
		self.evict_expired(now);

		if let Some(expires_at) = self.expiry_by_value.get(&value)
			&& *expires_at > now
		{
			return false;
		}

		let expires_at = now + self.ttl;
		self.queue.push_back((expires_at, value.clone()));
		self.expiry_by_value.insert(value, expires_at);
		true
	}

	pub fn contains(&self, value: &T, now: I) -> bool {
		self.expiry_by_value.get(value).is_some_and(|expires_at| *expires_at > now)
	}

	/// Number of tracked entries, including expired ones not yet evicted.
	pub fn len(&self) -> usize {
		self.expiry_by_value.len()
	}

	pub fn is_empty(&self) -> bool {
		self.expiry_by_value.is_empty()
	}

	fn evict_expired(&mut self, now: I) {
		while let Some((expires_at, _)) = self.queue.front() {
			if *expires_at > now {
				break;
			}
			let Some((expires_at, value)) = self.queue.pop_front() else {
				break;
			};
			// A re-inserted value has a newer expiry in the map; keep it.
			if self.expiry_by_value.get(&value) == Some(&expires_at) {
				self.expiry_by_value.remove(&value);
			}
		}
	}
}

/// Counts events that happened within the last `ttl`.
#[derive(Debug, Clone)]
pub struct TtlCounter<I> {
	ttl: Duration,
	expiries: VecDeque<I>,
}

impl<I> TtlCounter<I>
where
	I: Copy + Ord + Add<Duration, Output = I>,
{
	pub fn new(ttl: Duration) -> Self {
		Self {
			ttl,
			expiries: VecDeque::new(),
		}
	}

	pub fn increment(&mut self, now: I) {
		self.evict_expired(now);
		self.expiries.push_back(now + self.ttl);
	}

	pub fn count(&mut self, now: I) -> usize {
		self.evict_expired(now);
		self.expiries.len()
	}

	fn evict_expired(&mut self, now: I) {
		while self.expiries.front().is_some_and(|expires_at| *expires_at <= now) {
			self.expiries.pop_front();
		}
	}
}
