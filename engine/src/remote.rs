//! Remote store seam.
//!
//! The remote is only reachable by request/response: the engine polls it with
//! [`RemoteClient::fetch`] and publishes with [`RemoteClient::store`].
//! [`HttpRemote`] talks to the `notesync-server` note API.

use crate::error::{RemoteError, RemoteResult};
use crate::Record;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

/// Network fetch/store of notes by key.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Fetch the remote copy of `key`.
    ///
    /// Fails with [`RemoteError::NotFound`] when the remote has no such note.
    async fn fetch(&self, key: &str) -> RemoteResult<Record>;

    /// Publish `record` under its key.
    async fn store(&self, record: &Record) -> RemoteResult<()>;
}

/// Body of a 409 answer from the note server.
#[derive(Debug, Deserialize)]
struct RejectedBody {
    current: Record,
}

/// [`RemoteClient`] over the note server's HTTP API.
///
/// - `GET {base}/notes/{key}` fetches a note
/// - `PUT {base}/notes/{key}` stores a note
#[derive(Debug, Clone)]
pub struct HttpRemote {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRemote {
    /// Create a client for the server at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Create a client whose requests give up after `timeout`.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> RemoteResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn note_url(&self, key: &str) -> String {
        format!("{}/notes/{}", self.base_url, urlencoding::encode(key))
    }
}

fn transport_error(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Network(err.to_string())
    }
}

#[async_trait]
impl RemoteClient for HttpRemote {
    async fn fetch(&self, key: &str) -> RemoteResult<Record> {
        let response = self
            .client
            .get(self.note_url(key))
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(RemoteError::NotFound(key.to_string())),
            status if status.is_success() => {
                response.json::<Record>().await.map_err(transport_error)
            }
            status => Err(RemoteError::Network(format!(
                "unexpected status {} fetching '{}'",
                status, key
            ))),
        }
    }

    async fn store(&self, record: &Record) -> RemoteResult<()> {
        let response = self
            .client
            .put(self.note_url(record.key()))
            .json(record)
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT => {
                let body = response
                    .json::<RejectedBody>()
                    .await
                    .map_err(transport_error)?;
                Err(RemoteError::Rejected {
                    current: Box::new(body.current),
                })
            }
            status => Err(RemoteError::Network(format!(
                "unexpected status {} storing '{}'",
                status,
                record.key()
            ))),
        }
    }
}
