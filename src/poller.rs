use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{error, info, warn};
use tokio::{fs, time};

use crate::checker::{CheckError, CheckOutcome, Checker};

/// Runs the checker forever, pausing between checks.
pub struct Poller {
    checker: Checker,
    interval: Duration,
    remove_stale: bool,
    exit_on_error: bool,
}

impl Poller {
    pub fn new(checker: Checker) -> Self {
        let config = checker.config();
        Self {
            interval: config.poll_interval,
            remove_stale: config.remove_stale,
            exit_on_error: config.exit_on_error,
            checker,
        }
    }

    /// Only returns when a check fails and the poller is set to exit on errors.
    pub async fn run(self) -> Result<Infallible, CheckError> {
        let mut last_download = None;
        loop {
            last_download = self.cycle(last_download).await?;
            info!("next check in {:?}", self.interval);
            time::sleep(self.interval).await;
        }
    }

    /// Performs one check given the build kept by the previous one, and
    /// returns the build to keep for the next.
    ///
    /// The previous build is only replaced by one that is actually in the
    /// download directory. A check skipped because the build was found
    /// elsewhere leaves the previous build in place.
    pub async fn cycle(&self, previous: Option<PathBuf>) -> Result<Option<PathBuf>, CheckError> {
        let outcome = match self.checker.check().await {
            Ok(outcome) => outcome,
            Err(err) if self.exit_on_error => return Err(err),
            Err(err) => {
                error!("nightly build check failed: {}", err);
                return Ok(previous);
            }
        };
        if !is_in_place(&outcome).await {
            info!("{} is not in the download directory", outcome.path.display());
            return Ok(previous);
        }
        if let Some(previous) = previous {
            if self.remove_stale && previous != outcome.path {
                remove_stale(&previous).await;
            }
        }
        Ok(Some(outcome.path))
    }
}

async fn is_in_place(outcome: &CheckOutcome) -> bool {
    if outcome.downloaded {
        return true;
    }
    match fs::try_exists(&outcome.path).await {
        Ok(exists) => exists,
        Err(err) => {
            warn!("unable to inspect {}: {}", outcome.path.display(), err);
            false
        }
    }
}

async fn remove_stale(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => info!("removed stale build {}", path.display()),
        Err(err) => warn!("unable to remove stale build {}: {}", path.display(), err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use reqwest::Client;
    use tempfile::TempDir;
    use wiremock::{Mock, MockServer, ResponseTemplate, matchers::method};

    use crate::checker::tests::{LINK, listing_page, mount_build, mount_listing, test_config};
    use crate::config::Config;

    fn poller(config: Config) -> Poller {
        Poller::new(Checker::new(Client::new(), config))
    }

    #[tokio::test]
    async fn first_cycle_keeps_new_build() {
        let server = MockServer::start().await;
        mount_listing(&server, listing_page(&[LINK])).await;
        mount_build(&server, LINK, b"nightly", 1).await;
        let (download_dir, cwd) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let poller = poller(test_config(&server, &download_dir, &cwd));

        let kept = poller.cycle(None).await.unwrap();

        assert_eq!(kept, Some(download_dir.path().join(LINK)));
    }

    #[tokio::test]
    async fn remove_previous_build() {
        let server = MockServer::start().await;
        mount_listing(&server, listing_page(&[LINK])).await;
        mount_build(&server, LINK, b"nightly", 1).await;
        let (download_dir, cwd) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let previous = download_dir.path().join("kicad-2023-nightly.zip");
        std::fs::write(&previous, b"old").unwrap();
        let poller = poller(test_config(&server, &download_dir, &cwd));

        let kept = poller.cycle(Some(previous.clone())).await.unwrap();

        assert_eq!(kept, Some(download_dir.path().join(LINK)));
        assert!(!previous.exists());
    }

    #[tokio::test]
    async fn keep_previous_build_when_unchanged() {
        let server = MockServer::start().await;
        mount_listing(&server, listing_page(&[LINK])).await;
        mount_build(&server, LINK, b"nightly", 0).await;
        let (download_dir, cwd) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        std::fs::write(cwd.path().join(LINK), b"present").unwrap();
        let current = download_dir.path().join(LINK);
        std::fs::write(&current, b"nightly").unwrap();
        let poller = poller(test_config(&server, &download_dir, &cwd));

        let kept = poller.cycle(Some(current.clone())).await.unwrap();

        assert_eq!(kept, Some(current.clone()));
        assert!(current.exists());
    }

    #[tokio::test]
    async fn keep_previous_build_when_new_one_is_elsewhere() {
        let server = MockServer::start().await;
        mount_listing(&server, listing_page(&[LINK])).await;
        mount_build(&server, LINK, b"nightly", 0).await;
        let (download_dir, cwd) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        std::fs::write(cwd.path().join(LINK), b"present").unwrap();
        let previous = download_dir.path().join("kicad-2023-nightly.zip");
        std::fs::write(&previous, b"old").unwrap();
        let poller = poller(test_config(&server, &download_dir, &cwd));

        let kept = poller.cycle(Some(previous.clone())).await.unwrap();

        assert_eq!(kept, Some(previous.clone()));
        assert!(previous.exists());
        assert!(!download_dir.path().join(LINK).exists());
    }

    #[tokio::test]
    async fn first_cycle_ignores_build_elsewhere() {
        let server = MockServer::start().await;
        mount_listing(&server, listing_page(&[LINK])).await;
        mount_build(&server, LINK, b"nightly", 0).await;
        let (download_dir, cwd) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        std::fs::write(cwd.path().join(LINK), b"present").unwrap();
        let poller = poller(test_config(&server, &download_dir, &cwd));

        let kept = poller.cycle(None).await.unwrap();

        assert_eq!(kept, None);
    }

    #[tokio::test]
    async fn keep_previous_build_when_disabled() {
        let server = MockServer::start().await;
        mount_listing(&server, listing_page(&[LINK])).await;
        mount_build(&server, LINK, b"nightly", 1).await;
        let (download_dir, cwd) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let previous = download_dir.path().join("kicad-2023-nightly.zip");
        std::fs::write(&previous, b"old").unwrap();
        let config = test_config(&server, &download_dir, &cwd).with_remove_stale(false);
        let poller = poller(config);

        poller.cycle(Some(previous.clone())).await.unwrap();

        assert!(previous.exists());
    }

    #[tokio::test]
    async fn failed_cycle_keeps_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let (download_dir, cwd) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let previous = download_dir.path().join(LINK);
        std::fs::write(&previous, b"nightly").unwrap();
        let poller = poller(test_config(&server, &download_dir, &cwd));

        let kept = poller.cycle(Some(previous.clone())).await.unwrap();

        assert_eq!(kept, Some(previous.clone()));
        assert!(previous.exists());
    }

    #[tokio::test]
    async fn exit_on_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let (download_dir, cwd) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let config = test_config(&server, &download_dir, &cwd).with_exit_on_error(true);

        let result = poller(config).run().await;

        assert!(matches!(result, Err(CheckError::Fetch(_))));
    }
}
