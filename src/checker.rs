use std::io::{self, ErrorKind};
use std::path::PathBuf;

use log::{info, warn};
use reqwest::Client;
use thiserror::Error;
use tokio::fs;

use crate::config::Config;
use crate::download::{self, DownloadError};
use crate::listing::{self, FetchError};

#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("no links found on {0}")]
    NoLinksFound(String),
    #[error("latest anchor on {0} has no href")]
    MissingHref(String),
    #[error("download failed: {0}")]
    Download(#[from] DownloadError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    /// Download directory joined with the link name
    pub path: PathBuf,
    /// Whether this check fetched the build, as opposed to finding it present
    pub downloaded: bool,
}

/// Looks up the latest build on the listing page and downloads it if missing.
pub struct Checker {
    client: Client,
    config: Config,
}

impl Checker {
    pub fn new(client: Client, config: Config) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn check(&self) -> Result<CheckOutcome, CheckError> {
        let source_url = self.config.source_url.as_str();
        info!("checking {} for nightly builds", source_url);
        let listing = listing::fetch(&self.client, source_url).await?;
        if listing.anchors.is_empty() {
            return Err(CheckError::NoLinksFound(source_url.to_string()));
        }
        let link = listing
            .latest(self.config.selection)
            .and_then(|anchor| anchor.href())
            .ok_or_else(|| CheckError::MissingHref(source_url.to_string()))?;
        println!("{}", link);

        // Link names are appended verbatim, no separator is inserted
        let destination = format!("{}{}", self.config.download_dir, link);
        let presence = self.config.presence_check.path(link, &destination);
        let present = match fs::metadata(&presence).await {
            Ok(_) => true,
            Err(err) if err.kind() == ErrorKind::NotFound => false,
            Err(err) => {
                warn!("unable to inspect {}: {}", presence.display(), err);
                true
            }
        };
        if present {
            info!("{} already present, skipping download", presence.display());
            return Ok(CheckOutcome {
                path: destination.into(),
                downloaded: false,
            });
        }

        let url = format!("{}{}", source_url, link);
        download::download_file(&self.client, &destination, &url, io::stderr()).await?;
        Ok(CheckOutcome {
            path: destination.into(),
            downloaded: true,
        })
    }
}
