use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

pub const DEFAULT_SEARCH_URL: &str = "https://itunes.apple.com/search";
pub const MAX_RESULT_LIMIT: usize = 200;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Number of display slots filled from each result set.
    pub slot_count: usize,
    /// Time between two rotation swaps.
    #[serde(with = "humantime_serde")]
    pub rotation_interval: Duration,
    /// Query refreshed when the shell starts.
    pub initial_query: String,
    /// Start rotating as soon as the first pool is installed.
    pub autoplay: bool,
    /// Optional deterministic seed for swap selection.
    pub rng_seed: Option<u64>,
    /// Capacity of the channel carrying events to the rendering side.
    pub event_buffer: usize,
    /// Remote search service settings.
    pub provider: ProviderOptions,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            slot_count: 20,
            rotation_interval: Duration::from_secs(2),
            initial_query: "rock".to_string(),
            autoplay: false,
            rng_seed: None,
            event_buffer: 64,
            provider: ProviderOptions::default(),
        }
    }
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    pub fn validated(self) -> Result<Self> {
        ensure!(self.slot_count > 0, "slot-count must be greater than zero");
        ensure!(
            !self.rotation_interval.is_zero(),
            "rotation-interval must be positive"
        );
        ensure!(
            self.event_buffer > 0,
            "event-buffer must be greater than zero"
        );
        self.provider
            .validate(self.slot_count)
            .context("invalid provider configuration")?;
        Ok(self)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ProviderOptions {
    pub search_url: String,
    /// JSON field on each result that holds the artwork reference.
    pub artwork_field: String,
    pub result_limit: usize,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            search_url: DEFAULT_SEARCH_URL.to_string(),
            artwork_field: "artworkUrl100".to_string(),
            result_limit: 50,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ProviderOptions {
    fn validate(&self, slot_count: usize) -> Result<()> {
        ensure!(
            self.search_url.starts_with("http://") || self.search_url.starts_with("https://"),
            "provider.search-url must be an http(s) URL"
        );
        ensure!(
            !self.artwork_field.trim().is_empty(),
            "provider.artwork-field must not be empty"
        );
        ensure!(
            self.result_limit > slot_count,
            "provider.result-limit must exceed slot-count ({slot_count}) to leave a reserve"
        );
        ensure!(
            self.result_limit <= MAX_RESULT_LIMIT,
            "provider.result-limit must be <= {MAX_RESULT_LIMIT}"
        );
        ensure!(
            !self.request_timeout.is_zero(),
            "provider.request-timeout must be positive"
        );
        Ok(())
    }
}
