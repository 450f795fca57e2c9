#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, anyhow};
use chatty_eventsub::{DEFAULT_EVENTSUB_WS_URL, EventSubConfig};
use serde::Deserialize;
use tracing::{debug, info, warn};

const DEFAULT_EVENT_BUFFER: usize = 256;

/// Default config path: `~/.chatty/eventsub.toml`.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
	let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
	Ok(home.join(".chatty").join("eventsub.toml"))
}

/// Load the CLI config from TOML and process env overrides.
pub fn load_cli_config_from_path(path: &Path) -> anyhow::Result<CliConfig> {
	let file_cfg = read_toml_if_exists(path)
		.with_context(|| format!("read config from {}", path.display()))?
		.unwrap_or_default();

	let mut cfg = CliConfig::from_file(file_cfg);

	apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());

	Ok(cfg)
}

#[derive(Debug, Clone)]
pub struct CliConfig {
	pub eventsub: EventSubConfig,
	/// Capacity of the client → logger event channel.
	pub event_buffer: usize,
	/// Log notification payloads at debug level.
	pub log_payloads: bool,
	/// Optional metrics exporter bind address (host:port).
	pub metrics_bind: Option<String>,
}

impl Default for CliConfig {
	fn default() -> Self {
		Self::from_file(FileConfig::default())
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
	#[serde(default)]
	eventsub: FileEventSubSettings,

	#[serde(default)]
	server: FileServerSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileEventSubSettings {
	url: Option<String>,
	keepalive_timeout_seconds: Option<u32>,
	max_message_age_secs: Option<u64>,
	keepalive_grace_secs: Option<u64>,
	close_timeout_secs: Option<u64>,
	changeover_timeout_secs: Option<u64>,

	reconnect_min_delay_ms: Option<u64>,
	reconnect_max_delay_ms: Option<u64>,
	reconnect_window_secs: Option<u64>,

	event_buffer: Option<usize>,
	log_payloads: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileServerSettings {
	metrics_bind: Option<String>,
}

impl CliConfig {
	fn from_file(file: FileConfig) -> Self {
		let ev = file.eventsub;
		let mut eventsub = EventSubConfig::new(
			ev.url
				.filter(|s| !s.trim().is_empty())
				.unwrap_or_else(|| DEFAULT_EVENTSUB_WS_URL.to_string()),
		);
		eventsub.keepalive_timeout_seconds = ev.keepalive_timeout_seconds;
		if let Some(secs) = ev.max_message_age_secs {
			eventsub.max_message_age = Duration::from_secs(secs);
		}
		if let Some(secs) = ev.keepalive_grace_secs {
			eventsub.keepalive_grace = Duration::from_secs(secs);
		}
		if let Some(secs) = ev.close_timeout_secs {
			eventsub.close_timeout = Duration::from_secs(secs);
		}
		if let Some(secs) = ev.changeover_timeout_secs {
			eventsub.changeover_timeout = Duration::from_secs(secs);
		}
		if let Some(ms) = ev.reconnect_min_delay_ms {
			eventsub.reconnect_min_delay = Duration::from_millis(ms);
		}
		if let Some(ms) = ev.reconnect_max_delay_ms {
			eventsub.reconnect_max_delay = Duration::from_millis(ms);
		}
		if let Some(secs) = ev.reconnect_window_secs {
			eventsub.reconnect_window = Duration::from_secs(secs);
		}

		Self {
			eventsub,
			event_buffer: ev.event_buffer.filter(|v| *v > 0).unwrap_or(DEFAULT_EVENT_BUFFER),
			log_payloads: ev.log_payloads.unwrap_or(false),
			metrics_bind: file.server.metrics_bind.filter(|s| !s.trim().is_empty()),
		}
	}
}

fn parse_env_bool(v: &str) -> Option<bool> {
	match v.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Some(true),
		"0" | "false" | "no" | "off" => Some(false),
		_ => None,
	}
}

fn read_toml_if_exists(path: &Path) -> anyhow::Result<Option<FileConfig>> {
	match fs::read_to_string(path) {
		Ok(s) => {
			let cfg: FileConfig = toml::from_str(&s).context("parse TOML")?;
			Ok(Some(cfg))
		}
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(anyhow!(e).context("read config file")),
	}
}

fn apply_env_overrides(cfg: &mut CliConfig, env: impl Fn(&str) -> Option<String>) {
	if let Some(v) = env("CHATTY_EVENTSUB_URL") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.eventsub.url = v;
			info!("eventsub config: url overridden by env");
		}
	}

	if let Some(v) = env("CHATTY_EVENTSUB_KEEPALIVE_SECONDS")
		&& let Ok(secs) = v.trim().parse::<u32>()
	{
		cfg.eventsub.keepalive_timeout_seconds = Some(secs);
		info!(secs, "eventsub config: keepalive_timeout_seconds overridden by env");
	}

	if let Some(v) = env("CHATTY_EVENTSUB_MAX_MESSAGE_AGE_SECS")
		&& let Ok(secs) = v.trim().parse::<u64>()
	{
		cfg.eventsub.max_message_age = Duration::from_secs(secs);
		info!(secs, "eventsub config: max_message_age overridden by env");
	}

	if let Some(v) = env("CHATTY_EVENTSUB_KEEPALIVE_GRACE_SECS")
		&& let Ok(secs) = v.trim().parse::<u64>()
	{
		cfg.eventsub.keepalive_grace = Duration::from_secs(secs);
		info!(secs, "eventsub config: keepalive_grace overridden by env");
	}

	if let Some(v) = env("CHATTY_EVENTSUB_RECONNECT_MIN_DELAY_MS")
		&& let Ok(ms) = v.trim().parse::<u64>()
	{
		cfg.eventsub.reconnect_min_delay = Duration::from_millis(ms);
		debug!("eventsub config: reconnect_min_delay overridden by env");
	}

	if let Some(v) = env("CHATTY_EVENTSUB_RECONNECT_MAX_DELAY_MS")
		&& let Ok(ms) = v.trim().parse::<u64>()
	{
		cfg.eventsub.reconnect_max_delay = Duration::from_millis(ms);
		debug!("eventsub config: reconnect_max_delay overridden by env");
	}

	if let Some(v) = env("CHATTY_EVENTSUB_LOG_PAYLOADS")
		&& let Some(enabled) = parse_env_bool(&v)
	{
		cfg.log_payloads = enabled;
		info!(enabled, "eventsub config: log_payloads overridden by env");
	}

	if let Some(v) = env("CHATTY_EVENTSUB_METRICS_BIND") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.metrics_bind = Some(v);
			info!("eventsub config: metrics_bind overridden by env");
		}
	}

	let (min, max) = (cfg.eventsub.reconnect_min_delay, cfg.eventsub.reconnect_max_delay);
	if min > max {
		warn!(
			min_ms = min.as_millis() as u64,
			max_ms = max.as_millis() as u64,
			"eventsub config: reconnect_min_delay > reconnect_max_delay; swapping"
		);
		cfg.eventsub.reconnect_min_delay = max;
		cfg.eventsub.reconnect_max_delay = min;
	}
}
