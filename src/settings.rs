use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{Datelike, Local};
use config::{Config, Environment, File};
use serde::Deserialize;
use url::Url;

const DEFAULT_CONFIG_FILE: &str = "box_office.toml";
const ENV_PREFIX: &str = "BOX_OFFICE";
const MAX_DELAY_SECS: f64 = 3600.0;
const MAX_RETRIES: u32 = 10;

pub const BROWSER_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub storage_root: PathBuf,
    pub ledger_path: PathBuf,
    pub base_url: String,
    pub user_agent: String,
    pub accept_language: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub initial_backoff_secs: f64,
    pub request_delay_secs: f64,
    pub snapshot_delay_secs: f64,
    pub earliest_year: i32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            storage_root: PathBuf::from("data/lake"),
            ledger_path: PathBuf::from("data/ledger.sqlite"),
            base_url: "https://www.boxofficemojo.com".into(),
            user_agent: BROWSER_UA.into(),
            accept_language: "en-US,en;q=0.9".into(),
            timeout_secs: 30,
            max_retries: 3,
            initial_backoff_secs: 2.0,
            request_delay_secs: 1.0,
            snapshot_delay_secs: 0.5,
            earliest_year: 1977,
        }
    }
}

impl Settings {
    /// Defaults, then the optional config file, then `BOX_OFFICE_*` env vars.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => File::from(p.to_path_buf()).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let settings: Settings = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.base_url)
            .with_context(|| format!("base_url is not a valid URL: {}", self.base_url))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            bail!("base_url must be an absolute http(s) URL: {}", self.base_url);
        }
        if self.timeout_secs == 0 {
            bail!("timeout_secs must be greater than zero");
        }
        for (name, secs) in [
            ("initial_backoff_secs", self.initial_backoff_secs),
            ("request_delay_secs", self.request_delay_secs),
            ("snapshot_delay_secs", self.snapshot_delay_secs),
        ] {
            if !secs.is_finite() || !(0.0..=MAX_DELAY_SECS).contains(&secs) {
                bail!("{} must be between 0 and {} seconds, got {}", name, MAX_DELAY_SECS, secs);
            }
        }
        if self.max_retries > MAX_RETRIES {
            bail!("max_retries must be at most {}, got {}", MAX_RETRIES, self.max_retries);
        }
        let current_year = Local::now().year();
        if self.earliest_year > current_year {
            bail!(
                "earliest_year {} is after the current year {}",
                self.earliest_year,
                current_year
            );
        }
        Ok(())
    }

    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_secs_f64(self.initial_backoff_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_secs_f64(self.request_delay_secs)
    }

    pub fn snapshot_delay(&self) -> Duration {
        Duration::from_secs_f64(self.snapshot_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let s = Settings::default();
        s.validate().unwrap();
        assert_eq!(s.timeout(), Duration::from_secs(30));
        assert_eq!(s.initial_backoff(), Duration::from_secs(2));
        assert_eq!(s.base_url(), "https://www.boxofficemojo.com");
    }

    #[test]
    fn rejects_relative_base_url() {
        let s = Settings {
            base_url: "boxofficemojo.com".into(),
            ..Settings::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn rejects_negative_delay() {
        let s = Settings {
            request_delay_secs: -1.0,
            ..Settings::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn rejects_delay_too_large_for_a_duration() {
        let s = Settings {
            request_delay_secs: 1e20,
            ..Settings::default()
        };
        let err = s.validate().unwrap_err();
        assert!(err.to_string().contains("request_delay_secs"));
    }

    #[test]
    fn rejects_excessive_retries() {
        let s = Settings {
            max_retries: 64,
            ..Settings::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn loads_file_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etl.toml");
        std::fs::write(&path, "max_retries = 5\nrequest_delay_secs = 0.25\n").unwrap();

        let s = Settings::load(Some(&path)).unwrap();
        assert_eq!(s.max_retries, 5);
        assert_eq!(s.request_delay(), Duration::from_millis(250));
        assert_eq!(s.earliest_year, 1977);
    }
}
