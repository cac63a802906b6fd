use anyhow::Result;
use reqwest::Client;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::ratelimit::Cancelled;

/// HTTP client configuration shared by every source adapter.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout in seconds
    pub timeout: u64,
    /// Skip TLS certificate verification
    pub insecure: bool,
    /// Use a randomized User-Agent header
    pub random_agent: bool,
    /// Optional proxy URL (e.g. "http://proxy:8080")
    pub proxy: Option<String>,
    /// Optional proxy authentication in "username:password" format
    pub proxy_auth: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: 30,
            insecure: false,
            random_agent: false,
            proxy: None,
            proxy_auth: None,
        }
    }
}

impl HttpClientConfig {
    /// Build a `reqwest::Client` from this configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the proxy URL is invalid or the client fails to build.
    pub fn build_client(&self) -> Result<Client> {
        let mut builder = Client::builder().timeout(Duration::from_secs(self.timeout));

        if self.insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }

        if self.random_agent {
            builder = builder.user_agent(crate::network::random_user_agent());
        } else {
            builder = builder.user_agent(concat!("subarc/", env!("CARGO_PKG_VERSION")));
        }

        if let Some(proxy_url) = &self.proxy {
            let mut proxy = reqwest::Proxy::all(proxy_url)?;

            if let Some((username, password)) = self.proxy_auth.as_deref().and_then(|a| a.split_once(':')) {
                proxy = proxy.basic_auth(username, password);
            }

            builder = builder.proxy(proxy);
        }

        Ok(builder.build()?)
    }
}

/// GET `url` with retry and linear back-off, giving up as soon as `cancel` fires.
///
/// `max_retries` is the number of additional attempts after the first failure.
///
/// # Errors
///
/// Returns [`Cancelled`] when the token fires, otherwise the last error once all
/// attempts are exhausted.
pub async fn get_with_retry(
    client: &Client,
    url: &str,
    max_retries: u32,
    cancel: &CancellationToken,
) -> Result<String> {
    let mut last_error: Option<anyhow::Error> = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            // 500ms, 1000ms, 1500ms, ...
            let backoff = Duration::from_millis(500 * attempt as u64);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Cancelled.into()),
                _ = tokio::time::sleep(backoff) => {}
            }
        }

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Cancelled.into()),
            response = client.get(url).send() => response,
        };

        match response {
            Ok(response) if response.status().is_success() => {
                let body = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Cancelled.into()),
                    body = response.text() => body,
                };
                match body {
                    Ok(text) => return Ok(text),
                    Err(e) => last_error = Some(e.into()),
                }
            }
            Ok(response) => {
                last_error = Some(anyhow::anyhow!("HTTP error: {}", response.status()));
            }
            Err(e) => last_error = Some(e.into()),
        }

        tracing::debug!(url, attempt, "request attempt failed");
    }

    match last_error {
        Some(e) => Err(anyhow::anyhow!(
            "Failed after {} attempts: {}",
            max_retries + 1,
            e
        )),
        None => Err(anyhow::anyhow!("Failed after {} attempts", max_retries + 1)),
    }
}
