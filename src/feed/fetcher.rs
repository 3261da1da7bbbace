use crate::config::SyncConfig;
use crate::feed::parser::{parse_document, RemoteDocument};
use crate::storage::Feed;
use futures::StreamExt;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur while fetching a feed document.
///
/// None of these are retried by the fetcher; the next scheduled sync is the
/// retry.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[source] reqwest::Error),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// HTTP response with a non-2xx status other than 304
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Body could not be parsed as RSS, Atom or JSON Feed
    #[error("Parse error: {0}")]
    Parse(String),
    /// Response body exceeded `max_feed_size_bytes`
    #[error("Response too large")]
    ResponseTooLarge,
    /// Received fewer bytes than Content-Length announced
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// The HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Client(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Network(e)
        }
    }
}

/// What a conditional fetch produced.
#[derive(Debug)]
pub enum FetchOutcome {
    /// 304, or an empty body
    NotModified,
    Fetched {
        document: RemoteDocument,
        status: u16,
        /// Response `ETag` header, when the server sent one
        etag: Option<String>,
    },
}

/// HTTP side of a sync: one shared client, conditional GETs, bounded bodies.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    max_feed_size: usize,
}

impl Fetcher {
    pub fn new(config: &SyncConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self {
            client,
            max_feed_size: config.max_feed_size_bytes,
        })
    }

    /// Fetch `feed.subscription`, sending the stored ETag as `If-None-Match`.
    pub async fn fetch(&self, feed: &Feed) -> Result<FetchOutcome, FetchError> {
        let mut request = self.client.get(&feed.subscription);
        if !feed.etag.is_empty() {
            request = request.header(IF_NONE_MATCH, feed.etag.as_str());
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_MODIFIED {
            tracing::debug!(feed_id = feed.id, "Feed not modified (304)");
            return Ok(FetchOutcome::NotModified);
        }
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .filter(|v| !v.is_empty());

        let bytes = read_limited_bytes(response, self.max_feed_size).await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            tracing::debug!(feed_id = feed.id, "Empty response body, treating as not modified");
            return Ok(FetchOutcome::NotModified);
        }

        let document = parse_document(&bytes).map_err(|e| FetchError::Parse(e.to_string()))?;

        Ok(FetchOutcome::Fetched {
            document,
            status: status.as_u16(),
            etag,
        })
    }

    /// Unconditionally fetch a feed to fill in its metadata before it is
    /// stored.
    ///
    /// `title` is only set when empty, so a caller-supplied title wins.
    pub async fn fetch_for_preview(&self, feed: &mut Feed) -> Result<(), FetchError> {
        let response = self.client.get(&feed.subscription).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let bytes = read_limited_bytes(response, self.max_feed_size).await?;
        let document = parse_document(&bytes).map_err(|e| FetchError::Parse(e.to_string()))?;

        if feed.title.trim().is_empty() {
            feed.title = document.title;
        }
        feed.description = document.description;
        feed.source = document.link;
        Ok(())
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path on Content-Length
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
