use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::{fs, path::Path, path::PathBuf};

const DEFAULT_BASE_URL: &str = "https://platform.antares.id:8443";
const DEFAULT_RESOURCE: &str = "/~/antares-cse/antares-id/ParkiranSistem/slotParkir/la";

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct MonitorConfig {
    pub base_url: String,
    pub resource_path: String,
    pub access_key: String,
    pub poll_interval_ms: u64,
    pub request_timeout_ms: u64,
    pub baseline_path: PathBuf,
    pub bind_addr: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            resource_path: DEFAULT_RESOURCE.to_string(),
            access_key: String::new(),
            poll_interval_ms: 3000,
            request_timeout_ms: 5000,
            baseline_path: PathBuf::from("parking_baseline.json"),
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

impl MonitorConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("invalid config JSON in {}", path.display()))
    }

    /// File (if `PARKING_CONFIG` is set), then environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut cfg = match std::env::var("PARKING_CONFIG") {
            Ok(path) => Self::load(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        cfg.apply_overrides(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("ANTARES_URL") {
            self.base_url = v;
        }
        if let Some(v) = lookup("ANTARES_RESOURCE") {
            self.resource_path = v;
        }
        if let Some(v) = lookup("ANTARES_KEY") {
            self.access_key = v;
        }
        if let Some(v) = lookup("POLL_INTERVAL_MS") {
            self.poll_interval_ms = v
                .parse()
                .with_context(|| format!("POLL_INTERVAL_MS is not a number: {v}"))?;
        }
        if let Some(v) = lookup("REQUEST_TIMEOUT_MS") {
            self.request_timeout_ms = v
                .parse()
                .with_context(|| format!("REQUEST_TIMEOUT_MS is not a number: {v}"))?;
        }
        if let Some(v) = lookup("BASELINE_PATH") {
            self.baseline_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("BIND_ADDR") {
            self.bind_addr = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.access_key.trim().is_empty() {
            bail!("no Antares access key configured (set ANTARES_KEY)");
        }
        if self.poll_interval_ms == 0 {
            bail!("poll interval must be greater than zero");
        }
        if self.request_timeout_ms == 0 {
            bail!("request timeout must be greater than zero");
        }
        Ok(())
    }

    pub fn endpoint_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.resource_path.trim_start_matches('/')
        )
    }
}
