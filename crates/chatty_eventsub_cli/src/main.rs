#![forbid(unsafe_code)]

mod config;
mod summary;

use std::path::PathBuf;

use anyhow::Context as _;
use chatty_eventsub::{EventSubClient, EventSubEvent, EventSubEventRx, event_channel};
use chatty_eventsub_events::default_registry;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn usage_and_exit() -> ! {
	eprintln!(
		"Usage: chatty_eventsub [--config path] [--url ws://host:port/path]\n\
\n\
Options:\n\
\t--config  Config file (default: ~/.chatty/eventsub.toml)\n\
\t--url     EventSub websocket URL (overrides config and env)\n\
\t--help    Show this help\n\
"
	);
	std::process::exit(2)
}

#[derive(Debug, Default)]
struct Args {
	config: Option<PathBuf>,
	url: Option<String>,
}

fn parse_args() -> Args {
	let mut args = Args::default();

	let mut it = std::env::args().skip(1);
	while let Some(arg) = it.next() {
		match arg.as_str() {
			"--help" | "-h" => usage_and_exit(),
			"--config" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				if v.trim().is_empty() {
					eprintln!("--config must be non-empty");
					usage_and_exit();
				}
				args.config = Some(PathBuf::from(v));
			}
			"--url" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				if v.trim().is_empty() {
					eprintln!("--url must be non-empty (expected ws:// or wss://)");
					usage_and_exit();
				}
				args.url = Some(v.trim().to_string());
			}
			other => {
				eprintln!("Unknown argument: {other}");
				usage_and_exit();
			}
		}
	}

	args
}

fn init_rustls_crypto_provider() {
	let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

fn init_tracing() {
	let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,chatty_eventsub=debug".to_string());

	let otlp_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
		.ok()
		.map(|v| v.trim().to_string())
		.filter(|v| !v.is_empty());
	let base = tracing_subscriber::registry()
		.with(tracing_subscriber::EnvFilter::new(filter))
		.with(tracing_subscriber::fmt::layer().with_target(false));

	if let Some(endpoint) = otlp_endpoint {
		use opentelemetry::global;
		use opentelemetry::trace::TracerProvider as _;
		use opentelemetry_otlp::WithExportConfig;

		match opentelemetry_otlp::SpanExporter::builder()
			.with_tonic()
			.with_endpoint(endpoint.clone())
			.build()
		{
			Ok(exporter) => {
				let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
					.with_batch_exporter(exporter)
					.build();
				let tracer = tracer_provider.tracer("chatty_eventsub");
				global::set_tracer_provider(tracer_provider);

				let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
				base.with(otel_layer).init();
				info!(endpoint = %endpoint, "otlp tracing enabled");
			}
			Err(e) => {
				base.init();
				warn!(error = %e, "failed to initialize otlp tracing");
			}
		}
	} else {
		base.init();
	}
}

fn init_metrics(bind: Option<&str>) {
	let Some(bind) = bind else {
		return;
	};

	match bind.parse::<std::net::SocketAddr>() {
		Ok(addr) => {
			if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new()
				.with_http_listener(addr)
				.install()
			{
				warn!(error = %e, "failed to start metrics exporter");
			} else {
				info!(%addr, "metrics exporter listening");
			}
		}
		Err(e) => {
			warn!(error = %e, %bind, "invalid metrics bind address (expected host:port)");
		}
	}
}

async fn log_events(mut events_rx: EventSubEventRx, log_payloads: bool) {
	while let Some(event) = events_rx.recv().await {
		match event {
			EventSubEvent::Connected(welcome) => {
				let session = welcome.session();
				metrics::counter!("chatty_eventsub_cli_events_total", "kind" => "connected").increment(1);
				info!(
					session_id = %session.id,
					keepalive_timeout_seconds = ?session.keepalive_timeout_seconds,
					"eventsub session ready"
				);
			}
			EventSubEvent::Notification(n) => {
				metrics::counter!("chatty_eventsub_cli_events_total", "kind" => "notification").increment(1);
				match crate::summary::summarize(n.as_ref()) {
					Some(line) => info!(subscription_type = n.subscription_type(), "{line}"),
					None => info!(
						subscription_type = n.subscription_type(),
						subscription_id = n.subscription_id(),
						"eventsub notification"
					),
				}
				if log_payloads {
					debug!(payload = ?n, "eventsub notification payload");
				}
			}
			EventSubEvent::Revocation(r) => {
				metrics::counter!("chatty_eventsub_cli_events_total", "kind" => "revocation").increment(1);
				warn!(
					subscription_type = %r.payload.subscription.kind,
					subscription_id = %r.payload.subscription.id,
					status = %r.payload.subscription.status,
					"eventsub subscription revoked"
				);
			}
		}
	}
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_rustls_crypto_provider();
	init_tracing();

	let args = parse_args();

	let config_path = match args.config {
		Some(path) => path,
		None => crate::config::default_config_path()?,
	};
	let mut cli_cfg = crate::config::load_cli_config_from_path(&config_path)?;
	info!(path = %config_path.display(), "loaded eventsub config (toml + env overrides)");

	if let Some(url) = args.url {
		cli_cfg.eventsub.url = url;
		info!("eventsub config: url overridden by --url");
	}

	init_metrics(cli_cfg.metrics_bind.as_deref());

	let registry = default_registry();
	info!(subscription_types = ?registry.subscription_types(), "eventsub registry ready");

	let mut client = EventSubClient::new(cli_cfg.eventsub.clone(), registry).context("invalid eventsub config")?;

	let cancel = CancellationToken::new();
	tokio::spawn({
		let cancel = cancel.clone();
		async move {
			if let Err(e) = tokio::signal::ctrl_c().await {
				warn!(error = %e, "failed to listen for ctrl-c");
				return;
			}
			info!("ctrl-c received; shutting down");
			cancel.cancel();
		}
	});

	let (events_tx, events_rx) = event_channel(cli_cfg.event_buffer);
	let logger = tokio::spawn(log_events(events_rx, cli_cfg.log_payloads));

	info!(url = %client.url(), "chatty_eventsub: starting");
	client.run_forever(&events_tx, &cancel).await;

	drop(events_tx);
	if let Err(e) = logger.await {
		warn!(error = %e, "event logger task failed");
	}

	info!("chatty_eventsub: stopped");
	Ok(())
}
