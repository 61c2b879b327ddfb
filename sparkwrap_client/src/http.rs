//! HTTP layer that retries transient failures with exponential backoff.

use ::std::collections::HashSet;
use ::std::time::Duration;

use ::reqwest::{Method, RequestBuilder, Response, StatusCode};
use ::sparkwrap_common::{
    anyhow::anyhow,
    error::{Result, SparkwrapError},
    tokio::time::sleep,
    tracing::{debug, warn},
};

/// When and how often a request is retried.
///
/// Requests that never reach the gateway are always retried. Responses with
/// a status in `retry_statuses` are retried only when the request method is
/// in `retry_methods`, so a request the gateway may have acted on is never
/// replayed.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff_factor: Duration,
    retry_statuses: HashSet<StatusCode>,
    retry_methods: HashSet<Method>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            backoff_factor: Duration::from_millis(500),
            retry_statuses: HashSet::from([
                StatusCode::BAD_GATEWAY,
                StatusCode::SERVICE_UNAVAILABLE,
                StatusCode::GATEWAY_TIMEOUT,
            ]),
            retry_methods: HashSet::from([
                Method::GET,
                Method::HEAD,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
                Method::TRACE,
            ]),
        }
    }
}

impl RetryPolicy {
    /// Treat one more status as transient, on top of the defaults.
    pub fn retry_also_on(mut self, status: StatusCode) -> Self {
        self.retry_statuses.insert(status);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Override the backoff unit. Mainly lets tests run at millisecond scale.
    pub fn with_backoff_factor(mut self, backoff_factor: Duration) -> Self {
        self.backoff_factor = backoff_factor;
        self
    }

    /// Delay before retry number `retry` (1-based):
    /// {backoff factor} * (2 ^ ({retry number} - 1)).
    fn backoff_before(&self, retry: u32) -> Duration {
        self.backoff_factor * 2u32.pow(retry - 1)
    }

    fn should_retry_status(&self, method: &Method, status: StatusCode) -> bool {
        self.retry_statuses.contains(&status) && self.retry_methods.contains(method)
    }
}

/// HTTP client that replays requests which failed transiently.
#[derive(Debug, Clone, Default)]
pub struct RetryingClient {
    policy: RetryPolicy,
    client: reqwest::Client,
}

impl RetryingClient {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            client: reqwest::Client::new(),
        }
    }

    /// Client that reports redirects back to the caller instead of following
    /// them, for gateways that hand out the data endpoint in `Location`.
    pub fn without_redirects(policy: RetryPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(SparkwrapError::transport)?;
        Ok(Self { policy, client })
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.client.get(url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.client.post(url)
    }

    pub fn put(&self, url: &str) -> RequestBuilder {
        self.client.put(url)
    }

    pub fn delete(&self, url: &str) -> RequestBuilder {
        self.client.delete(url)
    }

    /// Send `builder`, retrying per the policy. A delivered response is
    /// returned as is even when its status reports an HTTP-level failure;
    /// mapping statuses to errors is the caller's business.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let request = builder.build().map_err(SparkwrapError::transport)?;
        let method = request.method().clone();
        let url = request.url().clone();

        let mut attempt = 1;
        loop {
            let request = request.try_clone().ok_or_else(|| {
                SparkwrapError::transport(anyhow!("Request body of {} {} cannot be replayed.", method, url))
            })?;
            match self.client.execute(request).await {
                Ok(response) => {
                    let status = response.status();
                    if !self.policy.should_retry_status(&method, status) {
                        return Ok(response);
                    }
                    if attempt >= self.policy.max_attempts {
                        return Err(SparkwrapError::transport(anyhow!(
                            "{} {} still answered {} after {} attempts.",
                            method,
                            url,
                            status,
                            attempt
                        )));
                    }
                    warn!("{} {} answered {}, retrying", method, url, status);
                }
                Err(error) => {
                    let transient = error.is_connect()
                        || (error.is_timeout() && self.policy.retry_methods.contains(&method));
                    if !transient || attempt >= self.policy.max_attempts {
                        return Err(SparkwrapError::transport(error));
                    }
                    warn!("{} {} failed to deliver: {}, retrying", method, url, error);
                }
            }
            let backoff = self.policy.backoff_before(attempt);
            debug!("Backing off {:?} before attempt {}", backoff, attempt + 1);
            sleep(backoff).await;
            attempt += 1;
        }
    }
}
