//! Client for the batch job gateway.

use ::std::time::{Duration, Instant};

use ::reqwest::{RequestBuilder, StatusCode};
use ::sparkwrap_common::{
    anyhow::anyhow,
    error::{ErrorTarget, Result, SparkwrapError},
    job::{JobId, JobStatus, RunJobRequest},
    tokio::time::sleep,
    tracing::{debug, info},
};

use crate::{
    http::{RetryPolicy, RetryingClient},
    Credentials,
};

/// How often a waited-on job is polled for its state.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Client for submitting batch jobs and following them to completion.
#[derive(Debug, Clone)]
pub struct LivyClient {
    base_url: String,
    credentials: Option<Credentials>,
    http: RetryingClient,
    poll_interval: Duration,
}

impl LivyClient {
    pub fn new(base_url: impl Into<String>, credentials: Option<Credentials>) -> Self {
        Self {
            base_url: base_url.into(),
            credentials,
            http: RetryingClient::new(RetryPolicy::default()),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.http = RetryingClient::new(policy);
        self
    }

    /// Override the state poll interval. Mainly lets tests run at
    /// millisecond scale.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Submit a job and return without waiting for it to make progress.
    pub async fn submit(&self, request: &RunJobRequest) -> Result<JobStatus> {
        let url = self.build_url("/batches");
        let builder = self.enable_auth_for_request(self.http.post(&url)).json(request);
        let response = self.http.send(builder).await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SparkwrapError::fail_to_submit_job(anyhow!(
                "Failed to run job. Gateway answered {}: {}",
                status,
                body
            )));
        }
        let status: JobStatus = response.json().await.map_err(SparkwrapError::fail_to_submit_job)?;
        info!("Job {} submitted in state {}", status.id, status.state);
        Ok(status)
    }

    /// Submit a job and poll its state until it reaches a terminal one.
    ///
    /// `timeout` bounds the wall-clock time spent waiting, measured from the
    /// moment polling begins. On expiry the job keeps running; the error
    /// reports the last observed state as its target.
    pub async fn submit_and_wait(&self, request: &RunJobRequest, timeout: Duration) -> Result<JobStatus> {
        let mut status = self.submit(request).await?;
        let start = Instant::now();
        while !status.state.is_terminal() {
            if start.elapsed() > timeout {
                return Err(SparkwrapError::timeout(anyhow!(
                    "Job {} did not reach a terminal state within {:?}. Current state is {}.",
                    status.id,
                    timeout,
                    status.state
                ))
                .with_target(ErrorTarget::new("state", status.state.to_string())));
            }
            sleep(self.poll_interval).await;
            status = self.get_job_status(&status.id).await?;
            debug!("Job {} is in state {}", status.id, status.state);
        }
        Ok(status)
    }

    pub async fn get_job_status(&self, id: &JobId) -> Result<JobStatus> {
        let url = self.build_url(&format!("/batches/{}", id));
        let builder = self.enable_auth_for_request(self.http.get(&url));
        let response = self.http.send(builder).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(SparkwrapError::not_found(anyhow!("Job with id {} not found.", id))
                .with_target(ErrorTarget::new("job", id.to_string()))),
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                Err(SparkwrapError::fail_to_get_job_status(anyhow!(
                    "Failed to get job state. Gateway answered {}: {}",
                    status,
                    body
                )))
            }
            _ => response.json().await.map_err(SparkwrapError::fail_to_get_job_status),
        }
    }

    /// Fetch the job's log lines as the gateway formats them. `max_lines`
    /// trims the result from the back; zero fetches the gateway default.
    pub async fn get_job_logs(&self, id: &JobId, max_lines: u32) -> Result<String> {
        let mut url = self.build_url(&format!("/batches/{}/logs", id));
        if max_lines > 0 {
            url.push_str(&format!("?size={}", max_lines));
        }
        let builder = self.enable_auth_for_request(self.http.get(&url));
        let response = self.http.send(builder).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(SparkwrapError::not_found(anyhow!("Job with id {} not found.", id))
                .with_target(ErrorTarget::new("job", id.to_string()))),
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                Err(SparkwrapError::fail_to_get_job_logs(anyhow!(
                    "Failed to get job logs. Gateway answered {}: {}",
                    status,
                    body
                )))
            }
            _ => response.text().await.map_err(SparkwrapError::fail_to_get_job_logs),
        }
    }

    fn build_url(&self, path: &str) -> String {
        self.base_url.clone() + path
    }

    fn enable_auth_for_request(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some(Credentials::Basic { username, password }) => builder.basic_auth(username, password.as_ref()),
            Some(Credentials::Bearer { token }) => builder.bearer_auth(token),
            None => builder,
        }
    }
}
