//! Client configuration loaded from an optional JSON file and environment
//! variables.
//!
//! Everything except the secret key has a default, so `ribbon` runs against
//! the public relay list with no configuration at all.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use ribbon_client::WorkflowConfig;
use ribbon_net::{RelayEndpoint, RelayTimeouts};
use ribbon_shared::constants::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_FETCH_WINDOW_SECS, DEFAULT_MAX_BACKUPS,
    DEFAULT_READ_TIMEOUT_SECS, DEFAULT_RELAYS, DEFAULT_RESPONSE_WINDOW_SECS,
    DEFAULT_VERIFY_WINDOW_SECS,
};
use ribbon_shared::Keys;
use ribbon_store::BackupStore;

/// Client configuration.
#[derive(Clone)]
pub struct ClientConfig {
    /// Relays to fetch from and publish to, in priority order.
    /// Env: `RIBBON_RELAYS` (comma separated)
    pub relay_urls: Vec<String>,

    /// Snapshot directory.
    /// Env: `RIBBON_BACKUP_DIR`
    /// Default: `<platform data dir>/badge_backups`
    pub backup_dir: Option<PathBuf>,

    /// Secret key of the acting identity, `nsec1…` or hex.
    /// Env: `RIBBON_SECRET_KEY`
    pub secret_key: Option<String>,

    /// Env: `RIBBON_CONNECT_TIMEOUT_SECS`
    pub connect_timeout_secs: u64,
    /// Env: `RIBBON_READ_TIMEOUT_SECS`
    pub read_timeout_secs: u64,
    /// Env: `RIBBON_RESPONSE_WINDOW_SECS`
    pub response_window_secs: u64,
    /// Env: `RIBBON_VERIFY_WINDOW_SECS`
    pub verify_window_secs: u64,
    /// Env: `RIBBON_FETCH_WINDOW_SECS`
    pub fetch_window_secs: u64,

    /// Snapshots kept after a verified publish.
    /// Env: `RIBBON_MAX_BACKUPS`
    pub max_backups: usize,
}

/// Shape of the `RIBBON_CONFIG` JSON file. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    relay_urls: Option<Vec<String>>,
    backup_dir: Option<PathBuf>,
    connect_timeout_secs: Option<u64>,
    read_timeout_secs: Option<u64>,
    response_window_secs: Option<u64>,
    verify_window_secs: Option<u64>,
    fetch_window_secs: Option<u64>,
    max_backups: Option<usize>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_urls: DEFAULT_RELAYS.iter().map(|s| s.to_string()).collect(),
            backup_dir: None,
            secret_key: None,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            response_window_secs: DEFAULT_RESPONSE_WINDOW_SECS,
            verify_window_secs: DEFAULT_VERIFY_WINDOW_SECS,
            fetch_window_secs: DEFAULT_FETCH_WINDOW_SECS,
            max_backups: DEFAULT_MAX_BACKUPS,
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("relay_urls", &self.relay_urls)
            .field("backup_dir", &self.backup_dir)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("read_timeout_secs", &self.read_timeout_secs)
            .field("response_window_secs", &self.response_window_secs)
            .field("verify_window_secs", &self.verify_window_secs)
            .field("fetch_window_secs", &self.fetch_window_secs)
            .field("max_backups", &self.max_backups)
            .finish()
    }
}

impl ClientConfig {
    /// Load configuration from the process environment, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = lookup("RIBBON_CONFIG") {
            match read_file_config(Path::new(&path)) {
                Ok(file) => config.apply_file(file),
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "Invalid RIBBON_CONFIG, ignoring");
                }
            }
        }

        if let Some(relays) = lookup("RIBBON_RELAYS") {
            let urls: Vec<String> = relays
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
            if urls.is_empty() {
                tracing::warn!("Empty RIBBON_RELAYS, using default");
            } else {
                config.relay_urls = urls;
            }
        }

        if let Some(dir) = lookup("RIBBON_BACKUP_DIR") {
            if !dir.is_empty() {
                config.backup_dir = Some(PathBuf::from(dir));
            }
        }

        if let Some(key) = lookup("RIBBON_SECRET_KEY") {
            let key = key.trim();
            if !key.is_empty() {
                config.secret_key = Some(key.to_string());
            }
        }

        parse_into(&lookup, "RIBBON_CONNECT_TIMEOUT_SECS", &mut config.connect_timeout_secs);
        parse_into(&lookup, "RIBBON_READ_TIMEOUT_SECS", &mut config.read_timeout_secs);
        parse_into(&lookup, "RIBBON_RESPONSE_WINDOW_SECS", &mut config.response_window_secs);
        parse_into(&lookup, "RIBBON_VERIFY_WINDOW_SECS", &mut config.verify_window_secs);
        parse_into(&lookup, "RIBBON_FETCH_WINDOW_SECS", &mut config.fetch_window_secs);
        parse_into(&lookup, "RIBBON_MAX_BACKUPS", &mut config.max_backups);

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(urls) = file.relay_urls.filter(|u| !u.is_empty()) {
            self.relay_urls = urls;
        }
        if file.backup_dir.is_some() {
            self.backup_dir = file.backup_dir;
        }
        self.connect_timeout_secs = file.connect_timeout_secs.unwrap_or(self.connect_timeout_secs);
        self.read_timeout_secs = file.read_timeout_secs.unwrap_or(self.read_timeout_secs);
        self.response_window_secs = file.response_window_secs.unwrap_or(self.response_window_secs);
        self.verify_window_secs = file.verify_window_secs.unwrap_or(self.verify_window_secs);
        self.fetch_window_secs = file.fetch_window_secs.unwrap_or(self.fetch_window_secs);
        self.max_backups = file.max_backups.unwrap_or(self.max_backups);
    }

    pub fn timeouts(&self) -> RelayTimeouts {
        RelayTimeouts {
            connect: Duration::from_secs(self.connect_timeout_secs),
            read: Duration::from_secs(self.read_timeout_secs),
            response_window: Duration::from_secs(self.response_window_secs),
            verify_window: Duration::from_secs(self.verify_window_secs),
        }
    }

    pub fn endpoints(&self) -> Vec<RelayEndpoint> {
        let timeouts = self.timeouts();
        self.relay_urls
            .iter()
            .map(|url| RelayEndpoint::new(url.as_str()).with_timeouts(timeouts))
            .collect()
    }

    pub fn fetch_window(&self) -> Duration {
        Duration::from_secs(self.fetch_window_secs)
    }

    pub fn workflow_config(&self) -> WorkflowConfig {
        WorkflowConfig {
            fetch_window: self.fetch_window(),
            max_backups: self.max_backups,
        }
    }

    pub fn backup_store(&self) -> anyhow::Result<BackupStore> {
        match &self.backup_dir {
            Some(dir) => Ok(BackupStore::new(dir)),
            None => Ok(BackupStore::open_default()?),
        }
    }

    pub fn keys(&self) -> anyhow::Result<Keys> {
        let secret = self
            .secret_key
            .as_deref()
            .context("RIBBON_SECRET_KEY is not set")?;
        Keys::from_secret_str(secret).context("RIBBON_SECRET_KEY is not a valid secret key")
    }
}

fn read_file_config(path: &Path) -> anyhow::Result<FileConfig> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Overwrite `target` with the parsed value of `key`, warning on garbage.
fn parse_into<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => *target = value,
        Err(_) => tracing::warn!(key, value = %raw, "Invalid value, using default"),
    }
}
