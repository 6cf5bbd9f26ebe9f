use crate::config::{Limits, RetryPolicy};
use crate::error::{Result, ScanError};
use async_trait::async_trait;
use reqwest::{Client, Proxy};
use std::time::Duration;
use tracing::{debug, warn};

/// Retrieves the raw document text behind a URL.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Plain HTTP fetcher. Non-success statuses are errors.
pub struct HttpFetcher {
    client: Client,
    user_agents: Vec<String>,
}

impl HttpFetcher {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        Self::builder().timeout_secs(timeout_secs).build()
    }

    pub fn builder() -> HttpFetcherBuilder {
        HttpFetcherBuilder::default()
    }

    fn pick_user_agent(&self) -> Option<&str> {
        if self.user_agents.is_empty() {
            return None;
        }
        Some(&self.user_agents[fastrand::usize(..self.user_agents.len())])
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        debug!("Fetching {}", url);

        let mut request = self.client.get(url);
        if let Some(agent) = self.pick_user_agent() {
            request = request.header(reqwest::header::USER_AGENT, agent);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScanError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response.text().await?)
    }
}

pub struct HttpFetcherBuilder {
    timeout_secs: u64,
    user_agents: Vec<String>,
    proxy: Option<String>,
}

impl Default for HttpFetcherBuilder {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agents: Limits::default().user_agents,
            proxy: None,
        }
    }
}

impl HttpFetcherBuilder {
    pub fn timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn user_agents(mut self, user_agents: Vec<String>) -> Self {
        self.user_agents = user_agents;
        self
    }

    pub fn proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn build(self) -> Result<HttpFetcher> {
        let mut builder = Client::builder()
            .user_agent(concat!("prodscout/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(self.timeout_secs))
            .connect_timeout(Duration::from_secs((self.timeout_secs / 2).max(1)))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(5));

        if let Some(proxy) = self.proxy.as_deref() {
            let proxy = Proxy::all(proxy)
                .map_err(|e| ScanError::InvalidUrl(format!("proxy '{}': {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }

        Ok(HttpFetcher {
            client: builder.build()?,
            user_agents: self.user_agents,
        })
    }
}

/// Wraps another fetcher with bounded attempts and exponential backoff.
///
/// Only errors that [`ScanError::is_retryable`] accepts are retried; the last
/// error is returned once attempts run out.
pub struct RetryingFetcher<F> {
    inner: F,
    policy: RetryPolicy,
}

impl<F: Fetch> RetryingFetcher<F> {
    pub fn new(inner: F, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<F: Fetch> Fetch for RetryingFetcher<F> {
    async fn fetch(&self, url: &str) -> Result<String> {
        let attempts = self.policy.attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.inner.fetch(url).await {
                Ok(body) => return Ok(body),
                Err(e) if attempt < attempts && e.is_retryable() => {
                    let wait = self.policy.backoff(attempt);
                    warn!(
                        "Fetch of {} failed (attempt {}/{}): {}; retrying in {:?}",
                        url, attempt, attempts, e, wait
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl<F: Fetch + ?Sized> Fetch for std::sync::Arc<F> {
    async fn fetch(&self, url: &str) -> Result<String> {
        (**self).fetch(url).await
    }
}

#[async_trait]
impl<F: Fetch + ?Sized> Fetch for Box<F> {
    async fn fetch(&self, url: &str) -> Result<String> {
        (**self).fetch(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header_exists, method, path},
    };

    #[tokio::test]
    async fn test_http_fetcher_returns_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/p.html"))
            .and(header_exists("user-agent"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<h1>Hi</h1>"))
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new(5).unwrap();
        let body = fetcher
            .fetch(&format!("{}/p.html", mock_server.uri()))
            .await
            .unwrap();
        assert_eq!(body, "<h1>Hi</h1>");
    }

    #[tokio::test]
    async fn test_http_fetcher_rejects_error_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone.html"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new(5).unwrap();
        let err = fetcher
            .fetch(&format!("{}/gone.html", mock_server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::Status { status: 404, .. }));
    }

    #[test]
    fn test_invalid_proxy_is_reported() {
        let result = HttpFetcher::builder()
            .proxy(Some("http://[bad".into()))
            .build();
        assert!(matches!(result, Err(ScanError::InvalidUrl(_))));
    }

    /// Fails with a 503 until `failures` calls have been made.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Fetch for Flaky {
        async fn fetch(&self, url: &str) -> Result<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                Err(ScanError::Status { url: url.to_string(), status: 503 })
            } else {
                Ok("ok".to_string())
            }
        }
    }

    fn instant_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failures() {
        let fetcher = RetryingFetcher::new(
            Flaky { failures: 2, calls: AtomicU32::new(0) },
            instant_policy(3),
        );
        assert_eq!(fetcher.fetch("http://shop.test/").await.unwrap(), "ok");
        assert_eq!(fetcher.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_bounded_attempts() {
        let fetcher = RetryingFetcher::new(
            Flaky { failures: 10, calls: AtomicU32::new(0) },
            instant_policy(3),
        );
        assert!(fetcher.fetch("http://shop.test/").await.is_err());
        assert_eq!(fetcher.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_skips_permanent_errors() {
        struct NotFound(AtomicU32);

        #[async_trait]
        impl Fetch for NotFound {
            async fn fetch(&self, url: &str) -> Result<String> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Err(ScanError::Status { url: url.to_string(), status: 404 })
            }
        }

        let fetcher = RetryingFetcher::new(NotFound(AtomicU32::new(0)), instant_policy(5));
        assert!(fetcher.fetch("http://shop.test/").await.is_err());
        assert_eq!(fetcher.inner.0.load(Ordering::SeqCst), 1);
    }
}
