use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::*;
use crate::testing::{
	PRIMARY_URL, PausedClock, ScriptedConnector, TestFollow, follow, keepalive, reconnect, revocation, test_registry,
	welcome,
};
use crate::{EventSubEventRx, event_channel};

struct Harness {
	connector: ScriptedConnector,
	clock: Arc<PausedClock>,
	client: EventSubClient,
	tx: EventSubEventTx,
	rx: EventSubEventRx,
	cancel: CancellationToken,
}

fn harness(cfg: EventSubConfig) -> Harness {
	let connector = ScriptedConnector::default();
	let clock = PausedClock::new();
	let client = EventSubClient::new(cfg, test_registry())
		.unwrap()
		.with_connector(connector.connector())
		.with_clock(clock.clone());
	let (tx, rx) = event_channel(64);
	Harness {
		connector,
		clock,
		client,
		tx,
		rx,
		cancel: CancellationToken::new(),
	}
}

fn primary_harness() -> Harness {
	harness(EventSubConfig::new(PRIMARY_URL))
}

type RunHandle = JoinHandle<(EventSubClient, Result<RunOutcome, ClientError>)>;

fn spawn_run(mut client: EventSubClient, tx: EventSubEventTx, cancel: CancellationToken) -> RunHandle {
	tokio::spawn(async move {
		let outcome = client.connect_and_receive(&tx, &cancel).await;
		(client, outcome)
	})
}

fn describe(event: &EventSubEvent) -> String {
	match event {
		EventSubEvent::Connected(w) => format!("connected:{}", w.metadata.message_id),
		EventSubEvent::Notification(n) => format!(
			"notification:{}",
			n.event::<TestFollow>().map(|e| e.user_login.as_str()).unwrap_or("?")
		),
		EventSubEvent::Revocation(r) => format!("revocation:{}", r.metadata.subscription_type),
	}
}

fn drain(rx: &mut EventSubEventRx) -> Vec<String> {
	let mut out = Vec::new();
	while let Ok(event) = rx.try_recv() {
		out.push(describe(&event));
	}
	out
}

#[tokio::test(start_paused = true)]
async fn welcome_establishes_session_and_adopts_keepalive() {
	let mut h = primary_harness();
	let primary = h.connector.script("primary.test");
	primary.text(
		r#"{"metadata":{"message_id":"1","message_type":"session_welcome","message_timestamp":"2024-01-01T00:00:00Z"},"payload":{"session":{"id":"s1","keepalive_timeout_seconds":10}}}"#,
	);
	primary.close(4000, "internal server error");

	let outcome = h.client.connect_and_receive(&h.tx, &h.cancel).await.unwrap();

	assert_eq!(
		outcome,
		RunOutcome::Disconnected(DisconnectReason::WebsocketClosed {
			code: 4000,
			reason: Some("internal server error".to_string()),
		})
	);
	assert_eq!(h.client.keepalive(), Duration::from_secs(10));

	match h.rx.try_recv().unwrap() {
		EventSubEvent::Connected(w) => assert_eq!(w.session().id, "s1"),
		other => panic!("expected connected, got {other:?}"),
	}
	assert!(h.rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn first_message_must_be_welcome() {
	let mut h = primary_harness();
	let primary = h.connector.script("primary.test");
	primary.text(keepalive("k1", h.clock.now()));

	let err = h.client.connect_and_receive(&h.tx, &h.cancel).await.unwrap_err();

	assert!(matches!(err, ClientError::ProtocolViolation(_)), "{err}");
	assert!(primary.close_requested());
	assert!(drain(&mut h.rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn second_welcome_is_a_protocol_violation() {
	let mut h = primary_harness();
	let primary = h.connector.script("primary.test");
	let now = h.clock.now();
	primary.text(welcome("w1", now, Some(10)));
	primary.text(welcome("w2", now, Some(10)));

	let err = h.client.connect_and_receive(&h.tx, &h.cancel).await.unwrap_err();

	assert!(matches!(err, ClientError::ProtocolViolation(_)), "{err}");
	assert_eq!(drain(&mut h.rx), vec!["connected:w1"]);
}

#[tokio::test(start_paused = true)]
async fn duplicate_messages_are_dispatched_once() {
	let mut h = primary_harness();
	let primary = h.connector.script("primary.test");
	let now = h.clock.now();
	primary.text(welcome("w1", now, Some(10)));
	primary.text(follow("n1", now, "alice"));
	primary.text(follow("n1", now, "alice"));
	primary.text(follow("n2", now, "carol"));
	primary.end();

	let outcome = h.client.connect_and_receive(&h.tx, &h.cancel).await.unwrap();

	assert_eq!(outcome, RunOutcome::Disconnected(DisconnectReason::ConnectionClosed));
	assert_eq!(
		drain(&mut h.rx),
		vec!["connected:w1", "notification:alice", "notification:carol"]
	);
}

#[tokio::test(start_paused = true)]
async fn duplicate_ids_are_accepted_again_after_the_replay_window() {
	let mut cfg = EventSubConfig::new(PRIMARY_URL);
	cfg.max_message_age = Duration::from_secs(60);
	let h = harness(cfg);
	let Harness {
		connector,
		clock,
		client,
		tx,
		mut rx,
		cancel,
	} = h;

	let primary = connector.script("primary.test");
	primary.text(welcome("w1", clock.now(), Some(600)));
	primary.text(follow("n1", clock.now(), "alice"));
	let run = spawn_run(client, tx, cancel);

	tokio::time::sleep(Duration::from_secs(61)).await;
	primary.text(follow("n1", clock.now(), "alice"));
	primary.end();

	let (_client, outcome) = run.await.unwrap();
	assert_eq!(outcome.unwrap(), RunOutcome::Disconnected(DisconnectReason::ConnectionClosed));
	assert_eq!(
		drain(&mut rx),
		vec!["connected:w1", "notification:alice", "notification:alice"]
	);
}

#[tokio::test(start_paused = true)]
async fn stale_messages_are_dropped() {
	let mut h = primary_harness();
	let primary = h.connector.script("primary.test");
	let now = h.clock.now();
	primary.text(welcome("w1", now, Some(10)));
	primary.text(follow("old", now - Duration::from_secs(11 * 60), "mallory"));
	primary.text(follow("new", now, "alice"));
	primary.end();

	h.client.connect_and_receive(&h.tx, &h.cancel).await.unwrap();

	assert_eq!(drain(&mut h.rx), vec!["connected:w1", "notification:alice"]);
}

#[tokio::test(start_paused = true)]
async fn silence_past_keepalive_and_grace_times_out() {
	let mut h = primary_harness();
	let primary = h.connector.script("primary.test");
	primary.text(welcome("w1", h.clock.now(), Some(10)));

	let start = Instant::now();
	let outcome = h.client.connect_and_receive(&h.tx, &h.cancel).await.unwrap();

	assert_eq!(
		outcome,
		RunOutcome::Disconnected(DisconnectReason::KeepaliveTimeout(Duration::from_secs(10)))
	);
	let elapsed = start.elapsed();
	assert!(elapsed >= Duration::from_secs(15), "{elapsed:?}");
	assert!(elapsed < Duration::from_secs(16), "{elapsed:?}");
	assert!(primary.aborted());
}

#[tokio::test(start_paused = true)]
async fn keepalives_push_the_deadline_back() {
	let Harness {
		connector,
		clock,
		client,
		tx,
		rx: _rx,
		cancel,
	} = primary_harness();
	let primary = connector.script("primary.test");
	primary.text(welcome("w1", clock.now(), Some(10)));

	let start = Instant::now();
	let run = spawn_run(client, tx, cancel);

	tokio::time::sleep(Duration::from_secs(12)).await;
	primary.text(keepalive("k1", clock.now()));
	tokio::time::sleep(Duration::from_secs(12)).await;
	primary.text(keepalive("k2", clock.now()));

	let (_client, outcome) = run.await.unwrap();
	assert_eq!(
		outcome.unwrap(),
		RunOutcome::Disconnected(DisconnectReason::KeepaliveTimeout(Duration::from_secs(10)))
	);
	let elapsed = start.elapsed();
	assert!(elapsed >= Duration::from_secs(39), "{elapsed:?}");
	assert!(elapsed < Duration::from_secs(40), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn requested_keepalive_applies_before_welcome() {
	let mut h = harness(EventSubConfig::new(PRIMARY_URL).with_keepalive_timeout_seconds(10));
	let _primary = h.connector.script("primary.test");

	let outcome = h.client.connect_and_receive(&h.tx, &h.cancel).await.unwrap();

	assert_eq!(
		outcome,
		RunOutcome::Disconnected(DisconnectReason::KeepaliveTimeout(Duration::from_secs(10)))
	);
	let connects = h.connector.connects();
	assert_eq!(connects.len(), 1);
	assert_eq!(connects[0].query(), Some("keepalive_timeout_seconds=10"));
}

#[tokio::test(start_paused = true)]
async fn changeover_drains_old_socket_before_handing_off() {
	let mut h = primary_harness();
	let now = h.clock.now();
	let primary = h
		.connector
		.script_with_in_flight("primary.test", vec![Frame::Text(follow("b", now, "bob"))]);
	let replacement = h.connector.script("reconnect.test");

	primary.text(welcome("w1", now, Some(10)));
	primary.text(follow("a", now, "alice"));
	primary.text(reconnect("r1", now, Some("ws://reconnect.test/ws")));
	replacement.text(welcome("w2", now, Some(30)));
	replacement.text(follow("c", now, "carol"));
	replacement.close(4004, "reconnect grace time expired");

	let outcome = h.client.connect_and_receive(&h.tx, &h.cancel).await.unwrap();

	assert_eq!(
		drain(&mut h.rx),
		vec![
			"connected:w1",
			"notification:alice",
			"notification:bob",
			"connected:w2",
			"notification:carol",
		]
	);
	assert_eq!(
		outcome,
		RunOutcome::Disconnected(DisconnectReason::WebsocketClosed {
			code: 4004,
			reason: Some("reconnect grace time expired".to_string()),
		})
	);
	assert_eq!(h.client.keepalive(), Duration::from_secs(30));
	assert!(primary.close_requested());
	assert!(primary.aborted());

	let hosts: Vec<String> = h
		.connector
		.connects()
		.iter()
		.filter_map(|u| u.host_str().map(str::to_string))
		.collect();
	assert_eq!(hosts, vec!["primary.test", "reconnect.test"]);
}

#[tokio::test(start_paused = true)]
async fn old_socket_closing_mid_changeover_still_hands_off() {
	let mut h = primary_harness();
	let now = h.clock.now();
	let primary = h.connector.script("primary.test");
	let replacement = h.connector.script("reconnect.test");

	primary.text(welcome("w1", now, Some(10)));
	primary.text(reconnect("r1", now, Some("ws://reconnect.test/ws")));
	primary.close(4004, "reconnect grace time expired");
	replacement.text(welcome("w2", now, Some(10)));
	replacement.text(follow("c", now, "carol"));
	replacement.end();

	let outcome = h.client.connect_and_receive(&h.tx, &h.cancel).await.unwrap();

	assert_eq!(outcome, RunOutcome::Disconnected(DisconnectReason::ConnectionClosed));
	assert_eq!(
		drain(&mut h.rx),
		vec!["connected:w1", "connected:w2", "notification:carol"]
	);
	assert!(primary.aborted());
}

#[tokio::test(start_paused = true)]
async fn old_socket_close_racing_a_finished_changeover_still_hands_off() {
	let Harness {
		connector,
		clock,
		client,
		tx,
		mut rx,
		cancel,
	} = primary_harness();
	let now = clock.now();
	let primary = connector.script("primary.test");
	let replacement = connector.script("reconnect.test");
	primary.text(welcome("w1", now, Some(10)));
	primary.text(reconnect("r1", now, Some("ws://reconnect.test/ws")));
	replacement.text(welcome("w2", now, Some(10)));
	replacement.text(follow("c", now, "carol"));
	replacement.end();

	// The old socket is closed by the server as soon as the replacement is dialed.
	let scripted = connector.connector();
	let old = primary.clone();
	let closing_connector: SocketConnector = Arc::new(move |url: Url| {
		let scripted = scripted.clone();
		let old = old.clone();
		Box::pin(async move {
			let socket = scripted(url.clone()).await;
			if url.host_str() == Some("reconnect.test") {
				old.close(4004, "reconnect grace time expired");
			}
			socket
		}) as BoxFuture<'static, anyhow::Result<BoxSocket>>
	});
	let mut client = client.with_connector(closing_connector);

	let outcome = client.connect_and_receive(&tx, &cancel).await.unwrap();

	assert_eq!(outcome, RunOutcome::Disconnected(DisconnectReason::ConnectionClosed));
	assert_eq!(
		drain(&mut rx),
		vec!["connected:w1", "connected:w2", "notification:carol"]
	);
}

#[tokio::test(start_paused = true)]
async fn old_socket_closing_while_replacement_stays_silent_is_a_protocol_violation() {
	let mut h = primary_harness();
	let now = h.clock.now();
	let primary = h.connector.script("primary.test");
	let _silent_replacement = h.connector.script("reconnect.test");
	primary.text(welcome("w1", now, Some(600)));
	primary.text(reconnect("r1", now, Some("ws://reconnect.test/ws")));
	primary.close(4004, "reconnect grace time expired");

	let err = h.client.connect_and_receive(&h.tx, &h.cancel).await.unwrap_err();

	assert!(matches!(err, ClientError::ProtocolViolation(_)), "{err}");
	assert_eq!(drain(&mut h.rx), vec!["connected:w1"]);
}

#[tokio::test(start_paused = true)]
async fn stale_changeover_welcome_is_rejected() {
	let mut h = primary_harness();
	let now = h.clock.now();
	let primary = h.connector.script("primary.test");
	let replacement = h.connector.script("reconnect.test");
	primary.text(welcome("w1", now, Some(10)));
	primary.text(reconnect("r1", now, Some("ws://reconnect.test/ws")));
	replacement.text(welcome("w2", now - Duration::from_secs(11 * 60), Some(10)));

	let err = h.client.connect_and_receive(&h.tx, &h.cancel).await.unwrap_err();

	assert!(matches!(err, ClientError::ProtocolViolation(_)), "{err}");
	assert!(replacement.aborted());
	assert_eq!(drain(&mut h.rx), vec!["connected:w1"]);
}

#[tokio::test(start_paused = true)]
async fn replayed_changeover_welcome_is_rejected() {
	let mut h = primary_harness();
	let now = h.clock.now();
	let primary = h.connector.script("primary.test");
	let replacement = h.connector.script("reconnect.test");
	primary.text(welcome("w1", now, Some(10)));
	primary.text(reconnect("r1", now, Some("ws://reconnect.test/ws")));
	replacement.text(welcome("w1", now, Some(10)));

	let err = h.client.connect_and_receive(&h.tx, &h.cancel).await.unwrap_err();

	assert!(matches!(err, ClientError::ProtocolViolation(_)), "{err}");
	assert!(replacement.aborted());
	assert_eq!(drain(&mut h.rx), vec!["connected:w1"]);
}

#[tokio::test(start_paused = true)]
async fn reconnect_during_changeover_is_ignored() {
	let mut h = primary_harness();
	let now = h.clock.now();
	let primary = h.connector.script("primary.test");
	let replacement = h.connector.script("reconnect.test");

	primary.text(welcome("w1", now, Some(10)));
	primary.text(reconnect("r1", now, Some("ws://reconnect.test/ws")));
	primary.text(reconnect("r2", now, Some("ws://elsewhere.test/ws")));
	replacement.text(welcome("w2", now, Some(10)));
	replacement.end();

	let outcome = h.client.connect_and_receive(&h.tx, &h.cancel).await.unwrap();

	assert_eq!(outcome, RunOutcome::Disconnected(DisconnectReason::ConnectionClosed));
	assert_eq!(drain(&mut h.rx), vec!["connected:w1", "connected:w2"]);
	assert_eq!(h.connector.connects().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn reconnect_without_url_is_a_protocol_violation() {
	let mut h = primary_harness();
	let now = h.clock.now();
	let primary = h.connector.script("primary.test");
	primary.text(welcome("w1", now, Some(10)));
	primary.text(reconnect("r1", now, None));

	let err = h.client.connect_and_receive(&h.tx, &h.cancel).await.unwrap_err();

	assert!(matches!(err, ClientError::ProtocolViolation(_)), "{err}");
}

#[tokio::test(start_paused = true)]
async fn changeover_socket_must_start_with_welcome() {
	let mut h = primary_harness();
	let now = h.clock.now();
	let primary = h.connector.script("primary.test");
	let replacement = h.connector.script("reconnect.test");
	primary.text(welcome("w1", now, Some(10)));
	primary.text(reconnect("r1", now, Some("ws://reconnect.test/ws")));
	replacement.text(keepalive("k1", now));

	let err = h.client.connect_and_receive(&h.tx, &h.cancel).await.unwrap_err();

	assert!(matches!(err, ClientError::ProtocolViolation(_)), "{err}");
	assert!(replacement.close_requested());
	assert_eq!(drain(&mut h.rx), vec!["connected:w1"]);
}

#[tokio::test(start_paused = true)]
async fn changeover_connect_failure_is_fatal() {
	let mut h = primary_harness();
	let now = h.clock.now();
	let primary = h.connector.script("primary.test");
	primary.text(welcome("w1", now, Some(10)));
	primary.text(reconnect("r1", now, Some("ws://unreachable.test/ws")));

	let err = h.client.connect_and_receive(&h.tx, &h.cancel).await.unwrap_err();

	assert!(matches!(err, ClientError::Changeover(_)), "{err}");
}

#[tokio::test(start_paused = true)]
async fn changeover_welcome_must_arrive_in_time() {
	let mut h = primary_harness();
	let now = h.clock.now();
	let primary = h.connector.script("primary.test");
	let _silent_replacement = h.connector.script("reconnect.test");
	primary.text(welcome("w1", now, Some(600)));
	primary.text(reconnect("r1", now, Some("ws://reconnect.test/ws")));

	let start = Instant::now();
	let err = h.client.connect_and_receive(&h.tx, &h.cancel).await.unwrap_err();

	assert!(matches!(err, ClientError::ProtocolViolation(_)), "{err}");
	assert!(start.elapsed() >= Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn cancellation_closes_gracefully() {
	let Harness {
		connector,
		clock,
		client,
		tx,
		mut rx,
		cancel,
	} = primary_harness();
	let primary = connector.script("primary.test");
	primary.text(welcome("w1", clock.now(), Some(10)));

	let run = spawn_run(client, tx, cancel.clone());
	let first = rx.recv().await.unwrap();
	assert_eq!(describe(&first), "connected:w1");

	cancel.cancel();
	let (_client, outcome) = run.await.unwrap();

	assert_eq!(outcome.unwrap(), RunOutcome::Cancelled);
	assert!(primary.close_requested());
}

#[tokio::test(start_paused = true)]
async fn cancellation_abandons_in_flight_changeover() {
	let Harness {
		connector,
		clock,
		client,
		tx,
		mut rx,
		cancel,
	} = primary_harness();
	let now = clock.now();
	let primary = connector.script("primary.test");
	let _silent_replacement = connector.script("reconnect.test");
	primary.text(welcome("w1", now, Some(600)));
	primary.text(reconnect("r1", now, Some("ws://reconnect.test/ws")));

	let run = spawn_run(client, tx, cancel.clone());
	assert_eq!(describe(&rx.recv().await.unwrap()), "connected:w1");

	tokio::time::sleep(Duration::from_secs(1)).await;
	cancel.cancel();
	let (_client, outcome) = run.await.unwrap();

	assert_eq!(outcome.unwrap(), RunOutcome::Cancelled);
	assert_eq!(connector.connects().len(), 2);
	assert!(rx.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn cancelled_before_connecting() {
	let mut h = primary_harness();
	h.cancel.cancel();

	let outcome = h.client.connect_and_receive(&h.tx, &h.cancel).await.unwrap();

	assert_eq!(outcome, RunOutcome::Cancelled);
	assert!(h.connector.connects().is_empty());
}

#[tokio::test(start_paused = true)]
async fn connect_failure_is_a_disconnect_reason() {
	let mut h = primary_harness();

	let outcome = h.client.connect_and_receive(&h.tx, &h.cancel).await.unwrap();

	assert!(matches!(
		outcome,
		RunOutcome::Disconnected(DisconnectReason::ConnectFailed(ref e)) if e.contains("connection refused")
	));
}

#[tokio::test(start_paused = true)]
async fn undecodable_and_unknown_messages_are_skipped() {
	let mut h = primary_harness();
	let now = h.clock.now();
	let primary = h.connector.script("primary.test");
	primary.text(welcome("w1", now, Some(10)));
	primary.text("this is not json");
	primary.text(r#"{"metadata":{"message_id":"x1","message_type":"made.up.type","message_timestamp":"2024-01-01T00:00:00Z"},"payload":{}}"#);
	primary.text(
		r#"{"metadata":{"message_id":"x2","message_type":"notification","message_timestamp":"2024-01-01T00:00:00Z","subscription_type":"made.up.type","subscription_version":"1"},"payload":{}}"#,
	);
	primary.text(follow("n1", now, "alice"));
	primary.end();

	let outcome = h.client.connect_and_receive(&h.tx, &h.cancel).await.unwrap();

	assert_eq!(outcome, RunOutcome::Disconnected(DisconnectReason::ConnectionClosed));
	assert_eq!(drain(&mut h.rx), vec!["connected:w1", "notification:alice"]);
}

#[tokio::test(start_paused = true)]
async fn revocations_are_dispatched() {
	let mut h = primary_harness();
	let now = h.clock.now();
	let primary = h.connector.script("primary.test");
	primary.text(welcome("w1", now, Some(10)));
	primary.text(revocation("v1", now, "channel.cheer"));
	primary.end();

	h.client.connect_and_receive(&h.tx, &h.cancel).await.unwrap();

	assert_eq!(drain(&mut h.rx), vec!["connected:w1", "revocation:channel.cheer"]);
}

#[tokio::test(start_paused = true)]
async fn dropped_receiver_does_not_stall_the_connection() {
	let Harness {
		connector,
		clock,
		mut client,
		tx,
		rx,
		cancel,
	} = primary_harness();
	drop(rx);
	let now = clock.now();
	let primary = connector.script("primary.test");
	primary.text(welcome("w1", now, Some(10)));
	primary.text(follow("n1", now, "alice"));
	primary.end();

	let outcome = client.connect_and_receive(&tx, &cancel).await.unwrap();

	assert_eq!(outcome, RunOutcome::Disconnected(DisconnectReason::ConnectionClosed));
}

#[tokio::test(start_paused = true)]
async fn run_forever_reconnects_until_cancelled() {
	let Harness {
		connector,
		clock,
		mut client,
		tx,
		mut rx,
		cancel,
	} = primary_harness();
	let now = clock.now();
	let first = connector.script("primary.test");
	first.text(welcome("w1", now, Some(10)));
	first.end();
	let second = connector.script("primary.test");
	second.text(welcome("w2", now, Some(10)));
	second.end();

	let stop = cancel.clone();
	let run = tokio::spawn(async move {
		client.run_forever(&tx, &stop).await;
	});

	assert_eq!(describe(&rx.recv().await.unwrap()), "connected:w1");
	assert_eq!(describe(&rx.recv().await.unwrap()), "connected:w2");

	// Later attempts are refused and throttled; the supervisor keeps going until cancelled.
	tokio::time::sleep(Duration::from_secs(10)).await;
	assert!(connector.connects().len() > 2);

	cancel.cancel();
	run.await.unwrap();
}
