use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use url::Url;

use crate::listing::Selection;

pub const DEFAULT_SOURCE_URL: &str = "http://downloads.kicad-pcb.org/windows/nightly/";

pub const SOURCE_URL_VAR: &str = "NIGHTLY_SOURCE_URL";
pub const POLL_INTERVAL_VAR: &str = "NIGHTLY_POLL_INTERVAL_SECS";
pub const REQUEST_TIMEOUT_VAR: &str = "NIGHTLY_REQUEST_TIMEOUT_SECS";

/// Where to look before deciding a build is missing locally.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PresenceCheck {
    /// Looks for the bare link name under `base`, which is the working
    /// directory unless configured otherwise. The download itself goes to
    /// the download directory, so the two only agree when they coincide.
    BareLink { base: PathBuf },
    /// Looks for the file at the download destination.
    Destination,
}

impl Default for PresenceCheck {
    fn default() -> Self {
        Self::BareLink {
            base: PathBuf::from("."),
        }
    }
}

impl PresenceCheck {
    pub fn path(&self, link: &str, destination: &str) -> PathBuf {
        match self {
            Self::BareLink { base } => base.join(link),
            Self::Destination => Path::new(destination).to_path_buf(),
        }
    }
}

/// Configuration settings for the nightly build poller
#[derive(Clone, Debug)]
pub struct Config {
    // Listing Settings
    /// Directory listing polled for new builds
    pub source_url: Url,
    /// How the latest build is picked from the listing
    pub selection: Selection,

    // Download Settings
    /// Prefix the link name is appended to, it must carry its own trailing separator
    pub download_dir: String,
    /// Where to look for an already downloaded build
    pub presence_check: PresenceCheck,

    // Poll Loop Settings
    /// Pause between two checks
    pub poll_interval: Duration,
    /// Delete the previously downloaded build once a newer one is in place
    pub remove_stale: bool,
    /// Stop polling on the first failed check instead of waiting for the next one
    pub exit_on_error: bool,

    // Connection Settings
    /// Timeout applied to every request, none by default
    pub request_timeout: Option<Duration>,
}

impl Config {
    pub fn with_source_url(mut self, source_url: Url) -> Self {
        self.source_url = source_url;
        self
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_presence_check(mut self, presence_check: PresenceCheck) -> Self {
        self.presence_check = presence_check;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_remove_stale(mut self, remove_stale: bool) -> Self {
        self.remove_stale = remove_stale;
        self
    }

    pub fn with_exit_on_error(mut self, exit_on_error: bool) -> Self {
        self.exit_on_error = exit_on_error;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

impl Config {
    pub fn new(download_dir: impl Into<String>) -> Result<Self> {
        Ok(Self {
            source_url: parse_url(DEFAULT_SOURCE_URL)?,
            selection: Selection::default(),
            download_dir: download_dir.into(),
            presence_check: PresenceCheck::default(),
            poll_interval: Duration::from_secs(60 * 60),
            remove_stale: true,
            exit_on_error: false,
            request_timeout: None,
        })
    }

    /// Builds the configuration, applying overrides from the environment.
    pub fn from_env(download_dir: impl Into<String>) -> Result<Self> {
        Self::from_vars(download_dir, |key| std::env::var(key).ok())
    }

    pub fn from_vars<F>(download_dir: impl Into<String>, var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new(download_dir)?;
        if let Some(url) = var(SOURCE_URL_VAR) {
            config.source_url =
                parse_url(&url).with_context(|| format!("invalid {}", SOURCE_URL_VAR))?;
        }
        if let Some(secs) = var(POLL_INTERVAL_VAR) {
            config.poll_interval = parse_secs(POLL_INTERVAL_VAR, &secs)?;
        }
        if let Some(secs) = var(REQUEST_TIMEOUT_VAR) {
            config.request_timeout = Some(parse_secs(REQUEST_TIMEOUT_VAR, &secs)?);
        }
        Ok(config)
    }

    /// The client shared by every request of the poller.
    pub fn http_client(&self) -> reqwest::Result<Client> {
        let mut builder = Client::builder().user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        builder.build()
    }
}

fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).with_context(|| format!("invalid url: {}", url))
}

fn parse_secs(key: &str, value: &str) -> Result<Duration> {
    let secs = value
        .trim()
        .parse()
        .with_context(|| format!("invalid {}: {}", key, value))?;
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_vars(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::from_vars("/tmp/out/", |key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = Config::new("/tmp/out/").unwrap();

        assert_eq!(config.source_url.as_str(), DEFAULT_SOURCE_URL);
        assert_eq!(config.download_dir, "/tmp/out/");
        assert_eq!(config.poll_interval, Duration::from_secs(3600));
        assert_eq!(config.selection, Selection::LastInDocument);
        assert_eq!(
            config.presence_check,
            PresenceCheck::BareLink {
                base: PathBuf::from(".")
            }
        );
        assert!(config.remove_stale);
        assert!(!config.exit_on_error);
        assert_eq!(config.request_timeout, None);
    }

    #[test]
    fn no_overrides() {
        let config = from_vars(&[]).unwrap();

        assert_eq!(config.source_url.as_str(), DEFAULT_SOURCE_URL);
        assert_eq!(config.poll_interval, Duration::from_secs(3600));
    }

    #[test]
    fn overrides() {
        let config = from_vars(&[
            (SOURCE_URL_VAR, "http://localhost:8080/nightly/"),
            (POLL_INTERVAL_VAR, "60"),
            (REQUEST_TIMEOUT_VAR, " 30 "),
        ])
        .unwrap();

        assert_eq!(config.source_url.as_str(), "http://localhost:8080/nightly/");
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn invalid_overrides() {
        assert!(from_vars(&[(SOURCE_URL_VAR, "not a url")]).is_err());
        assert!(from_vars(&[(POLL_INTERVAL_VAR, "hourly")]).is_err());
    }

    #[test]
    fn builders() {
        let config = Config::new("out/")
            .unwrap()
            .with_selection(Selection::GreatestName)
            .with_presence_check(PresenceCheck::Destination)
            .with_remove_stale(false)
            .with_exit_on_error(true)
            .with_request_timeout(Duration::from_secs(5));

        assert_eq!(config.selection, Selection::GreatestName);
        assert_eq!(config.presence_check, PresenceCheck::Destination);
        assert!(!config.remove_stale);
        assert!(config.exit_on_error);
        assert_eq!(config.request_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn presence_paths() {
        let bare = PresenceCheck::default();
        let destination = PresenceCheck::Destination;

        assert_eq!(
            bare.path("kicad.zip", "/tmp/out/kicad.zip"),
            PathBuf::from("./kicad.zip")
        );
        assert_eq!(
            destination.path("kicad.zip", "/tmp/out/kicad.zip"),
            PathBuf::from("/tmp/out/kicad.zip")
        );
    }
}
