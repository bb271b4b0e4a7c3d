use log::warn;
use reqwest::Client;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::listing;

const CHANNEL_BUFFER: usize = 16;

/// Streams every absolute link found on `url`.
///
/// The page is fetched in the background. The stream ends once every link
/// has been delivered, or right away if the page could not be fetched. It
/// cannot be restarted; call `crawl` again to fetch the page anew.
pub fn crawl(client: Client, url: String) -> ReceiverStream<String> {
    let (tx, rx) = mpsc::channel(CHANNEL_BUFFER);
    tokio::spawn(async move {
        let listing = match listing::fetch(&client, &url).await {
            Ok(listing) => listing,
            Err(err) => {
                warn!("failed to crawl {}: {}", url, err);
                return;
            }
        };
        for link in listing.links().filter(|link| link.starts_with("http")) {
            if tx.send(link.to_string()).await.is_err() {
                break;
            }
        }
    });
    ReceiverStream::new(rx)
}
