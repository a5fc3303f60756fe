// Shared transport configuration for building reqwest::Client instances.
//
// The Telegram client and the reload hook client share timeout, proxy and
// user-agent settings through this module, avoiding duplicated builder logic.

use std::time::Duration;

const USER_AGENT: &str = concat!("tunnelbot/", env!("CARGO_PKG_VERSION"));

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Default per-request timeout. Long polls override it per call.
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Optional outbound proxy (`http://`, `https://` or `socks5://`).
    pub proxy: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            proxy: None,
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, crate::error::Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .user_agent(USER_AGENT);

        if let Some(ref proxy_url) = self.proxy {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| crate::error::Error::ClientBuild(format!("invalid proxy URL: {e}")))?;
            builder = builder.proxy(proxy);
        }

        builder
            .build()
            .map_err(|e| crate::error::Error::ClientBuild(e.to_string()))
    }

    /// Same config with a different default timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_client_builds() {
        assert!(TransportConfig::default().build_client().is_ok());
    }

    #[test]
    fn bad_proxy_is_rejected() {
        let config = TransportConfig {
            proxy: Some("not a url".into()),
            ..TransportConfig::default()
        };
        assert!(matches!(
            config.build_client(),
            Err(crate::error::Error::ClientBuild(_))
        ));
    }
}
