// Live-reload hook client
//
// The VPN endpoint can expose an HTTP hook that makes it re-read its
// credential and rule files without a restart. A reload is a bare POST;
// any 2xx answer means the endpoint accepted it.

use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Minimal client for the endpoint's reload hook.
#[derive(Debug, Clone)]
pub struct ReloadClient {
    http: reqwest::Client,
}

impl ReloadClient {
    /// Create a reload client from a `TransportConfig`.
    pub fn new(transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
        })
    }

    /// Create a reload client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// POST to the reload endpoint. Non-2xx answers are errors.
    pub async fn trigger(&self, endpoint: &Url) -> Result<(), Error> {
        debug!("POST {}", endpoint);

        let resp = self
            .http
            .post(endpoint.clone())
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Error::ReloadRejected {
                status: status.as_u16(),
            })
        }
    }
}
