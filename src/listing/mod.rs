mod tokenizer;

use futures::TryStreamExt;
use log::debug;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio::task::JoinError;
use tokio_util::io::StreamReader;

use crate::codec::{self, Decoder};

pub use self::tokenizer::{Attribute, Tag, Token, Tokenizer, Tokens, tokens};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to fetch {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("server returned status {status} for {url}")]
    Status { url: String, status: StatusCode },
    #[error("failed to decode {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: JoinError,
    },
}

/// An `<a>` start tag found in a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub attributes: Vec<Attribute>,
}

impl Anchor {
    /// The value of the last `href` attribute, if any. Anchors read from a
    /// document never repeat an attribute, so this only matters for anchors
    /// built by hand.
    pub fn href(&self) -> Option<&str> {
        self.attributes
            .iter()
            .rev()
            .find(|attribute| attribute.key == "href")
            .map(|attribute| attribute.value.as_str())
    }
}

impl Token {
    pub fn into_anchor(self) -> Option<Anchor> {
        match self {
            Token::StartTag(tag) if tag.name == "a" => Some(Anchor {
                attributes: tag.attributes,
            }),
            _ => None,
        }
    }
}

/// Lazily yields the anchors of `input` in document order.
pub fn anchors(input: &[u8]) -> impl Iterator<Item = Anchor> + '_ {
    tokens(input).filter_map(Token::into_anchor)
}

/// How the latest build is picked out of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selection {
    /// The last anchor in the document, whatever it points to.
    #[default]
    LastInDocument,
    /// The anchor with the lexically greatest `href`.
    GreatestName,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Listing {
    /// Anchors in document order
    pub anchors: Vec<Anchor>,
}

impl Listing {
    pub fn parse(input: &[u8]) -> Self {
        Self {
            anchors: anchors(input).collect(),
        }
    }

    pub fn links(&self) -> impl Iterator<Item = &str> {
        self.anchors.iter().filter_map(Anchor::href)
    }

    pub fn latest(&self, selection: Selection) -> Option<&Anchor> {
        match selection {
            Selection::LastInDocument => self.anchors.last(),
            Selection::GreatestName => self
                .anchors
                .iter()
                .filter(|anchor| anchor.href().is_some())
                .max_by(|a, b| a.href().cmp(&b.href())),
        }
    }
}

#[derive(Default)]
struct ListingDecoder {
    tokenizer: Tokenizer,
    anchors: Vec<Anchor>,
}

impl ListingDecoder {
    fn drain(&mut self) {
        while let Some(token) = self.tokenizer.next_token() {
            if let Some(anchor) = token.into_anchor() {
                self.anchors.push(anchor);
            }
        }
    }
}

impl Decoder for ListingDecoder {
    type Output = Listing;

    fn feed(&mut self, chunk: &[u8]) {
        self.tokenizer.feed(chunk);
        self.drain();
    }

    fn finish(mut self) -> Listing {
        self.anchors
            .extend(self.tokenizer.finish().filter_map(Token::into_anchor));
        Listing {
            anchors: self.anchors,
        }
    }
}

/// Fetches `url` and collects its anchors while the body streams in.
pub async fn fetch(client: &Client, url: &str) -> Result<Listing, FetchError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status,
        });
    }
    let body = response.bytes_stream().map_err(std::io::Error::other);
    let mut reader = StreamReader::new(Box::pin(body));
    let listing = codec::decode::<ListingDecoder, _>(&mut reader)
        .await
        .map_err(|source| FetchError::Decode {
            url: url.to_string(),
            source,
        })?;
    debug!("found {} anchors on {}", listing.anchors.len(), url);
    Ok(listing)
}
