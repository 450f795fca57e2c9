#![forbid(unsafe_code)]

use std::time::Duration;

use chatty_util::{TtlCounter, backoff_delay};
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::EventSubEventTx;
use crate::client::{DisconnectReason, EventSubClient, RunOutcome};

/// Delay before the next connect, given how many attempts happened within the throttle window.
///
/// The first reconnect is immediate; later ones back off exponentially.
pub fn reconnect_throttle(recent_attempts: usize, min: Duration, max: Duration) -> Duration {
	let steps = recent_attempts.saturating_sub(1);
	if steps == 0 {
		return Duration::ZERO;
	}
	let attempt = u32::try_from(steps - 1).unwrap_or(u32::MAX);
	backoff_delay(attempt, min, max)
}

impl EventSubClient {
	/// Keep a connection up until `cancel` fires, reconnecting after every disconnect or fatal error.
	pub async fn run_forever(&mut self, events_tx: &EventSubEventTx, cancel: &CancellationToken) {
		let mut recent_attempts = TtlCounter::new(self.config().reconnect_window);

		loop {
			if cancel.is_cancelled() {
				break;
			}

			let throttle = reconnect_throttle(
				recent_attempts.count(Instant::now()),
				self.config().reconnect_min_delay,
				self.config().reconnect_max_delay,
			);
			if !throttle.is_zero() {
				warn!(
					throttle_ms = throttle.as_millis() as u64,
					"eventsub reconnect throttled"
				);
				tokio::select! {
					_ = cancel.cancelled() => break,
					_ = sleep(throttle) => {}
				}
			}

			recent_attempts.increment(Instant::now());
			metrics::counter!("chatty_eventsub_connect_attempts_total").increment(1);

			match self.connect_and_receive(events_tx, cancel).await {
				Ok(RunOutcome::Cancelled) => break,
				Ok(RunOutcome::Disconnected(reason)) => log_disconnect(&reason),
				Err(e) => error!(error = %e, "eventsub client failed; reconnecting"),
			}
		}

		info!("eventsub supervisor stopped");
	}
}

fn log_disconnect(reason: &DisconnectReason) {
	match reason {
		DisconnectReason::KeepaliveTimeout(keepalive) => {
			warn!(keepalive_secs = keepalive.as_secs(), "eventsub disconnected: keepalive timeout; reconnecting")
		}
		DisconnectReason::ConnectionClosed => info!("eventsub disconnected: connection closed; reconnecting"),
		DisconnectReason::WebsocketClosed { code, reason } => info!(
			code,
			reason = reason.as_deref().unwrap_or(""),
			"eventsub disconnected: websocket closed by server; reconnecting"
		),
		DisconnectReason::ConnectFailed(error) => warn!(%error, "eventsub connect failed; reconnecting"),
	}
}
