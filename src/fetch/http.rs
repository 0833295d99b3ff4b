//! HTTP fetch implementation
//!
//! This module issues the request for a unit, follows redirects itself so the
//! resolved location is known, and streams the body into a spool.

use futures_util::StreamExt;
use reqwest::{
    Client, Response, Url,
    header::{self, HeaderMap, HeaderValue},
};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, trace};

use super::spool::{Spool, SpoolBuffer};
use super::{FetchError, Result};

const USER_AGENT: &str = concat!("urlpack/", env!("CARGO_PKG_VERSION"));

/// A fully spooled response body together with where it was finally served from
#[derive(Debug)]
pub struct Fetched {
    pub buffer: SpoolBuffer,
    pub resolved_url: Url,
}

/// Shared HTTP client used by every fetch unit of a run
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    max_redirects: usize,
    spool_dir: Option<PathBuf>,
}

impl Fetcher {
    pub fn new(timeout: Option<Duration>) -> std::result::Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));

        // Redirects are followed by hand in `get_with_redirects`
        let mut builder = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(USER_AGENT)
            .default_headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self::from_client(builder.build()?))
    }

    /// Wrap an existing client; it should not follow redirects on its own
    pub fn from_client(client: Client) -> Self {
        Self {
            client,
            max_redirects: 10,
            spool_dir: None,
        }
    }

    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn with_spool_dir(mut self, spool_dir: impl Into<PathBuf>) -> Self {
        self.spool_dir = Some(spool_dir.into());
        self
    }

    pub fn spool_dir(&self) -> Option<&Path> {
        self.spool_dir.as_deref()
    }

    /// Send a GET and follow redirects up to the configured limit
    ///
    /// Returns the final successful response and the URL it came from.
    pub async fn get_with_redirects(&self, url: &str) -> Result<(Response, Url)> {
        let mut current_url = Url::parse(url)?;
        let mut redirect_count = 0;

        loop {
            let response = self
                .client
                .get(current_url.clone())
                .send()
                .await
                .map_err(FetchError::Request)?;

            let status = response.status();
            trace!(status = %status, url = %current_url, "Got response");

            if !status.is_redirection() {
                if !status.is_success() {
                    return Err(FetchError::Status { status });
                }
                return Ok((response, current_url));
            }

            if redirect_count >= self.max_redirects {
                return Err(FetchError::TooManyRedirects {
                    limit: self.max_redirects,
                });
            }

            let location = response
                .headers()
                .get(header::LOCATION)
                .ok_or_else(|| {
                    FetchError::InvalidRedirect(format!("{status} without Location header"))
                })?
                .to_str()
                .map_err(|e| FetchError::InvalidRedirect(e.to_string()))?;

            // Location may be relative to the current URL
            let next_url = current_url
                .join(location)
                .map_err(|e| FetchError::InvalidRedirect(e.to_string()))?;

            debug!(from = %current_url, to = %next_url, "Following redirect");
            current_url = next_url;
            redirect_count += 1;
        }
    }

    /// Fetch `url` into a spool, choosing disk when the declared length exceeds `threshold`
    ///
    /// A partially written spool is discarded before any error is returned.
    pub async fn fetch(&self, url: &str, threshold: u64) -> Result<Fetched> {
        let (response, resolved_url) = self.get_with_redirects(url).await?;

        let declared_length = declared_length(&response);
        let mut spool = Spool::for_length(declared_length, threshold, self.spool_dir())?;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    debug!(error = %e, bytes = spool.len(), "Error reading response body");
                    spool.discard();
                    return Err(FetchError::Stream(e));
                }
            };

            if let Err(e) = spool.write_chunk(&chunk).await {
                debug!(error = %e, bytes = spool.len(), "Error writing to spool");
                spool.discard();
                return Err(FetchError::Spool(e));
            }
        }

        let buffer = spool.finish().await?;
        Ok(Fetched {
            buffer,
            resolved_url,
        })
    }
}

/// Content-Length of the response, when the server declared one
fn declared_length(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|cl| cl.to_str().ok())
        .and_then(|cl| cl.parse::<u64>().ok())
}
