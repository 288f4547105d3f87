//! Remote image fetching with a wall-clock deadline and byte ceiling.

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::redirect::Policy;
use reqwest::{Client, ClientBuilder};

use crate::config::{IngestConfig, LimitsConfig};
use crate::error::{PipelineError, PipelineResult};

use super::validate::UrlValidator;

/// Maximum redirects followed before a fetch is abandoned.
const MAX_REDIRECTS: usize = 5;

/// Raw body and declared type of a fetched image.
#[derive(Debug)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Build the HTTP client used for storage and catalog calls.
pub fn build_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent())
        .redirect(Policy::limited(MAX_REDIRECTS))
        .build()
}

/// Build the HTTP client used for image fetches.
pub fn build_fetch_client(config: &IngestConfig) -> Result<Client, reqwest::Error> {
    fetch_client_builder(UrlValidator::new(config)).build()
}

/// Client builder for image fetches. Every redirect hop must pass
/// `validator`, so a redirect cannot leave the allow-list or reach a private
/// host.
pub fn fetch_client_builder(validator: UrlValidator) -> ClientBuilder {
    Client::builder()
        .user_agent(user_agent())
        .redirect(validated_redirects(validator))
}

fn validated_redirects(validator: UrlValidator) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() > MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }
        if validator.is_valid(attempt.url().as_str()) {
            attempt.follow()
        } else {
            let target = attempt.url().to_string();
            attempt.error(format!("redirect to disallowed URL {target}"))
        }
    })
}

fn user_agent() -> String {
    format!("flowstash/{}", crate::VERSION)
}

/// Fetches one image per call, bounded by time and size.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    timeout_ms: u64,
    max_bytes: u64,
}

impl Fetcher {
    pub fn new(client: Client, limits: &LimitsConfig) -> Self {
        Self {
            client,
            timeout_ms: limits.fetch_timeout_ms,
            max_bytes: limits.max_file_bytes(),
        }
    }

    /// Fetch `url` and return its body.
    ///
    /// The deadline covers the whole exchange, headers through the last body
    /// byte. The byte ceiling is checked against `Content-Length` when the
    /// server sends one and enforced again while streaming, so a lying or
    /// absent header cannot push more than `max_bytes` into memory.
    pub async fn fetch(&self, url: &str) -> PipelineResult<FetchedImage> {
        let deadline = Duration::from_millis(self.timeout_ms);
        match tokio::time::timeout(deadline, self.fetch_inner(url)).await {
            Ok(result) => result,
            Err(_) => Err(self.timeout_error(url)),
        }
    }

    async fn fetch_inner(&self, url: &str) -> PipelineResult<FetchedImage> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.request_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        if !content_type.starts_with("image/") {
            return Err(PipelineError::ContentType {
                url: url.to_string(),
                content_type,
            });
        }

        let declared = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if let Some(size) = declared {
            if size > self.max_bytes {
                return Err(PipelineError::FileTooLarge {
                    url: url.to_string(),
                    size,
                    max: self.max_bytes,
                });
            }
        }

        let capacity = declared.unwrap_or(0).min(self.max_bytes) as usize;
        let mut bytes = Vec::with_capacity(capacity);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.request_error(url, e))?;
            let size = (bytes.len() + chunk.len()) as u64;
            if size > self.max_bytes {
                return Err(PipelineError::FileTooLarge {
                    url: url.to_string(),
                    size,
                    max: self.max_bytes,
                });
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(FetchedImage {
            bytes,
            content_type,
        })
    }

    fn request_error(&self, url: &str, e: reqwest::Error) -> PipelineError {
        if e.is_timeout() {
            self.timeout_error(url)
        } else {
            PipelineError::Fetch {
                url: url.to_string(),
                message: e.to_string(),
            }
        }
    }

    fn timeout_error(&self, url: &str) -> PipelineError {
        PipelineError::Timeout {
            url: url.to_string(),
            stage: "fetch".to_string(),
            timeout_ms: self.timeout_ms,
        }
    }
}
