mod pass_through;

use std::io::{self, Write};

use futures::TryStreamExt;
use log::info;
use reqwest::{Client, StatusCode};
use size::Size;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;

pub use self::pass_through::{PassThrough, Progress};

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("unable to create {path}: {source}")]
    Create {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("server returned status {status} for {url}")]
    Status { url: String, status: StatusCode },
    #[error("error while reading {url}: {source}")]
    Copy {
        url: String,
        #[source]
        source: io::Error,
    },
}

/// Downloads `url` into `path`, writing progress digits to `sink`.
///
/// The file is created (or truncated) before the request is made and is left
/// in place if the transfer fails.
pub async fn download_file<W>(
    client: &Client,
    path: &str,
    url: &str,
    sink: W,
) -> Result<u64, DownloadError>
where
    W: Write + Unpin,
{
    let mut out = File::create(path)
        .await
        .map_err(|source| DownloadError::Create {
            path: path.to_string(),
            source,
        })?;

    println!("Downloading: {}", url);
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|source| DownloadError::Request {
            url: url.to_string(),
            source,
        })?;
    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::Status {
            url: url.to_string(),
            status,
        });
    }

    let length = response.content_length();
    let body = response.bytes_stream().map_err(io::Error::other);
    let mut reader = PassThrough::new(StreamReader::new(Box::pin(body)), length, sink);
    let copy_error = |source| DownloadError::Copy {
        url: url.to_string(),
        source,
    };
    let copied = tokio::io::copy(&mut reader, &mut out)
        .await
        .map_err(copy_error)?;
    out.flush().await.map_err(copy_error)?;

    info!("saved {} to {}", Size::from_bytes(copied), path);
    Ok(copied)
}
