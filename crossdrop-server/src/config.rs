//! Load config from file and environment.

use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;

/// Secret used when none is configured. Fine for local testing only.
pub const DEFAULT_TOKEN_SECRET: &str = "dev-secret-change-me";

/// Relay configuration. File: `$CROSSDROP_CONFIG`, ~/.config/crossdrop/config.toml or
/// /etc/crossdrop/config.toml. Env overrides: CROSSDROP_PORT, CROSSDROP_BIND,
/// CROSSDROP_TOKEN_SECRET, CROSSDROP_HEARTBEAT_MS, CROSSDROP_CLIENT_TIMEOUT_MS,
/// CROSSDROP_REQUIRE_PAIR_TOKEN.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// HTTP + WebSocket listen port (default 3000).
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// HMAC key for registration and pair tokens.
    #[serde(default = "default_token_secret")]
    pub token_secret: String,
    /// Interval between stale-device sweeps, ms (default 30000).
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,
    /// A device not seen for longer than this is evicted, ms (default 60000).
    #[serde(default = "default_client_timeout_ms")]
    pub client_timeout_ms: u64,
    /// Attach pair tokens to relayed pair requests and refuse responses without one.
    #[serde(default)]
    pub require_pair_token: bool,
    /// Tracing filter used when RUST_LOG is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_port() -> u16 {
    3000
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_token_secret() -> String {
    DEFAULT_TOKEN_SECRET.to_string()
}
fn default_heartbeat_ms() -> u64 {
    30_000
}
fn default_client_timeout_ms() -> u64 {
    60_000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            token_secret: default_token_secret(),
            heartbeat_ms: default_heartbeat_ms(),
            client_timeout_ms: default_client_timeout_ms(),
            require_pair_token: false,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    pub fn uses_default_secret(&self) -> bool {
        self.token_secret == DEFAULT_TOKEN_SECRET
    }
}

/// Load config: merge default, then config file (if present), then env vars. Problems with
/// the file come back as messages; the caller logs them once tracing is installed, since the
/// log filter itself comes from this config.
pub fn load() -> (Config, Vec<String>) {
    let (file, problems) = load_file(&config_paths());
    let mut c = file.unwrap_or_default();
    apply_env(&mut c, |key| std::env::var(key).ok());
    (c, problems)
}

/// Apply overrides from `var`. Values that fail to parse are ignored.
fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    override_parsed(&var, "CROSSDROP_PORT", &mut c.port);
    if let Some(s) = var("CROSSDROP_BIND") {
        c.bind_address = s;
    }
    if let Some(s) = var("CROSSDROP_TOKEN_SECRET") {
        if !s.is_empty() {
            c.token_secret = s;
        }
    }
    override_parsed(&var, "CROSSDROP_HEARTBEAT_MS", &mut c.heartbeat_ms);
    override_parsed(&var, "CROSSDROP_CLIENT_TIMEOUT_MS", &mut c.client_timeout_ms);
    override_parsed(&var, "CROSSDROP_REQUIRE_PAIR_TOKEN", &mut c.require_pair_token);
}

fn override_parsed<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    if let Some(s) = var(key) {
        if let Ok(v) = s.parse::<T>() {
            *slot = v;
        }
    }
}

fn config_paths() -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Some(p) = std::env::var_os("CROSSDROP_CONFIG") {
        out.push(PathBuf::from(p));
    }
    if let Some(h) = std::env::var_os("HOME").map(PathBuf::from) {
        out.push(h.join(".config/crossdrop/config.toml"));
    }
    out.push(PathBuf::from("/etc/crossdrop/config.toml"));
    out
}

/// First existing file wins; an unreadable or invalid one falls back to defaults.
fn load_file(paths: &[PathBuf]) -> (Option<Config>, Vec<String>) {
    let Some(p) = paths.iter().find(|p| p.exists()) else {
        return (None, Vec::new());
    };
    match std::fs::read_to_string(p) {
        Ok(s) => match toml::from_str::<Config>(&s) {
            Ok(c) => (Some(c), Vec::new()),
            Err(e) => (None, vec![format!("ignoring invalid config {}: {e}", p.display())]),
        },
        Err(e) => (None, vec![format!("cannot read config {}: {e}", p.display())]),
    }
}
