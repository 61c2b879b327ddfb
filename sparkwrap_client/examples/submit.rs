use ::reqwest::StatusCode;
use ::sparkwrap_client::{
    http::RetryPolicy,
    livy::LivyClient,
    Credentials,
};
use ::sparkwrap_common::{
    config::{load_config, Args, GatewayConfig},
    error::Result,
    job::RunJobRequest,
    tokio, tracing_subscriber,
};
use ::std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let Args { config_path } = Args::parse_args();
    let GatewayConfig { livy_url, .. } = load_config(&config_path)?;

    let credentials = Credentials::Basic {
        username: "gateway".to_owned(),
        password: None,
    };
    // The job gateway sheds load with 429 when the queue is full.
    let policy = RetryPolicy::default().retry_also_on(StatusCode::TOO_MANY_REQUESTS);
    let client = LivyClient::new(livy_url, Some(credentials)).with_retry_policy(policy);

    let request = RunJobRequest {
        file: "hdfs:///user/gateway/jobs/pi.py".to_owned(),
        name: Some("pi".to_owned()),
        args: vec!["100".to_owned()],
        ..Default::default()
    };
    let status = client.submit_and_wait(&request, Duration::from_secs(1800)).await?;
    println!("Job {} finished in state {}", status.id, status.state);

    let logs = client.get_job_logs(&status.id, 100).await?;
    println!("{}", logs);
    Ok(())
}
