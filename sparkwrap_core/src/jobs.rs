//! Job submission with location rewriting and environment injection.

use ::std::time::Duration;

use ::sparkwrap_client::livy::LivyClient;
use ::sparkwrap_common::{
    anyhow::anyhow,
    config::GatewayConfig,
    error::{Result, SparkwrapError},
    job::{JobId, JobStatus, RunJobRequest},
    serde_json,
    tracing::debug,
};

use crate::context::RequestContext;

/// How long a foreground submission waits for the job to finish.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(1800);

/// Prepares run requests and drives them through the job gateway.
pub struct JobOrchestrator {
    config: GatewayConfig,
    file_path_prefix: String,
    poll_interval: Option<Duration>,
}

impl JobOrchestrator {
    pub fn new(config: GatewayConfig) -> Self {
        let file_path_prefix = match &config.base_hdfs_location {
            Some(base) => format!(
                "{}/{}",
                config.hdfs_file_base_url.trim_end_matches('/'),
                base.trim_start_matches('/')
            ),
            None => config.hdfs_file_base_url.clone(),
        };
        Self {
            config,
            file_path_prefix,
            poll_interval: None,
        }
    }

    /// Override the state poll interval of foreground submissions. Mainly
    /// lets tests run at millisecond scale.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = Some(poll_interval);
        self
    }

    /// Rewrite locations, inject the configured environment and submit.
    ///
    /// A background submission returns as soon as the gateway accepts the
    /// job; otherwise the call follows the job until it reaches a terminal
    /// state, for at most `timeout` (the default is half an hour).
    pub async fn run_job(
        &self,
        ctx: &RequestContext,
        request: &RunJobRequest,
        background: bool,
        timeout: Option<Duration>,
    ) -> Result<JobStatus> {
        if request.file.is_empty() {
            return Err(SparkwrapError::bad_request(anyhow!(
                "'file' is missing in the run request payload."
            )));
        }
        let mut prepared = self.rewrite_locations(request)?;
        self.inject_environment(ctx, &mut prepared);
        debug!("Prepared run request for file {}", prepared.file);

        let client = self.livy_client(ctx);
        if background {
            client.submit(&prepared).await
        } else {
            client
                .submit_and_wait(&prepared, timeout.unwrap_or(DEFAULT_WAIT_TIMEOUT))
                .await
        }
    }

    pub async fn get_job_status(&self, ctx: &RequestContext, id: &JobId) -> Result<JobStatus> {
        self.livy_client(ctx).get_job_status(id).await
    }

    pub async fn get_job_logs(&self, ctx: &RequestContext, id: &JobId, max_lines: u32) -> Result<String> {
        self.livy_client(ctx).get_job_logs(id, max_lines).await
    }

    /// Replace every `$hdfs` location token in the request with the
    /// configured file prefix. The token can sit in any string field, so
    /// the request is rewritten in its serialized form.
    fn rewrite_locations(&self, request: &RunJobRequest) -> Result<RunJobRequest> {
        let serialized = serde_json::to_string(request).map_err(SparkwrapError::bad_request)?;
        let rewritten = serialized
            .replace("${hdfs}", &self.file_path_prefix)
            .replace("$hdfs", &self.file_path_prefix);
        serde_json::from_str(&rewritten).map_err(SparkwrapError::bad_request)
    }

    fn inject_environment(&self, ctx: &RequestContext, request: &mut RunJobRequest) {
        if let Some(archive) = &self.config.env_archive_location {
            request.archives.push(archive.clone());
            if let Some(site_packages) = &self.config.env_site_packages_path {
                request
                    .conf
                    .insert("spark.yarn.appMasterEnv.PYTHONPATH".to_owned(), site_packages.clone());
                request
                    .conf
                    .insert("spark.executorEnv.PYTHONPATH".to_owned(), site_packages.clone());
            }
        }
        if let (Some(principal), Some(keytab)) = (&ctx.principal, &self.config.spark_yarn_keytab_path) {
            request.conf.insert("spark.yarn.principal".to_owned(), principal.clone());
            request.conf.insert("spark.yarn.keytab".to_owned(), keytab.clone());
        }
    }

    fn livy_client(&self, ctx: &RequestContext) -> LivyClient {
        let client = LivyClient::new(self.config.livy_url.clone(), ctx.credentials.clone());
        match self.poll_interval {
            Some(poll_interval) => client.with_poll_interval(poll_interval),
            None => client,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::sparkwrap_common::{error::SparkwrapErrorType, tokio};
    use ::std::collections::BTreeMap;

    fn test_config() -> GatewayConfig {
        GatewayConfig {
            livy_url: "http://jobs.gateway:8998".to_owned(),
            web_hdfs_url: "http://files.gateway:9870".to_owned(),
            hdfs_file_base_url: "hdfs://nameservice1".to_owned(),
            base_hdfs_location: Some("data/projects".to_owned()),
            env_archive_location: None,
            env_site_packages_path: None,
            spark_yarn_keytab_path: None,
        }
    }

    #[test]
    fn the_file_prefix_combines_gateway_url_and_base_location() {
        let orchestrator = JobOrchestrator::new(test_config());
        assert_eq!(orchestrator.file_path_prefix, "hdfs://nameservice1/data/projects");

        let orchestrator = JobOrchestrator::new(GatewayConfig {
            base_hdfs_location: None,
            ..test_config()
        });
        assert_eq!(orchestrator.file_path_prefix, "hdfs://nameservice1");
    }

    #[test]
    fn location_tokens_are_rewritten_in_every_field() {
        let orchestrator = JobOrchestrator::new(test_config());
        let request = RunJobRequest {
            file: "$hdfs/jobs/train.py".to_owned(),
            py_files: vec!["${hdfs}/libs/util.py".to_owned()],
            args: vec!["--input".to_owned(), "$hdfs/data/input.csv".to_owned()],
            conf: BTreeMap::from([("spark.files".to_owned(), "$hdfs/data/ref.csv".to_owned())]),
            ..Default::default()
        };

        let rewritten = orchestrator.rewrite_locations(&request).unwrap();

        assert_eq!(rewritten.file, "hdfs://nameservice1/data/projects/jobs/train.py");
        assert_eq!(rewritten.py_files, vec!["hdfs://nameservice1/data/projects/libs/util.py"]);
        assert_eq!(rewritten.args[1], "hdfs://nameservice1/data/projects/data/input.csv");
        assert_eq!(
            rewritten.conf["spark.files"],
            "hdfs://nameservice1/data/projects/data/ref.csv"
        );
    }

    #[test]
    fn requests_without_tokens_are_left_alone() {
        let orchestrator = JobOrchestrator::new(test_config());
        let request = RunJobRequest {
            file: "hdfs:///user/gateway/jobs/train.py".to_owned(),
            ..Default::default()
        };
        assert_eq!(orchestrator.rewrite_locations(&request).unwrap(), request);
    }

    #[test]
    fn the_environment_archive_is_injected_when_configured() {
        let orchestrator = JobOrchestrator::new(GatewayConfig {
            env_archive_location: Some("hdfs://nameservice1/envs/py39.tar.gz#environment".to_owned()),
            ..test_config()
        });
        let mut request = RunJobRequest::default();

        orchestrator.inject_environment(&RequestContext::new(), &mut request);

        assert_eq!(request.archives, vec!["hdfs://nameservice1/envs/py39.tar.gz#environment"]);
        assert!(request.conf.is_empty());
    }

    #[test]
    fn the_interpreter_path_rides_along_with_the_archive() {
        let orchestrator = JobOrchestrator::new(GatewayConfig {
            env_archive_location: Some("hdfs://nameservice1/envs/py39.tar.gz#environment".to_owned()),
            env_site_packages_path: Some("environment/lib/python3.9/site-packages".to_owned()),
            ..test_config()
        });
        let mut request = RunJobRequest::default();

        orchestrator.inject_environment(&RequestContext::new(), &mut request);

        assert_eq!(
            request.conf["spark.yarn.appMasterEnv.PYTHONPATH"],
            "environment/lib/python3.9/site-packages"
        );
        assert_eq!(
            request.conf["spark.executorEnv.PYTHONPATH"],
            "environment/lib/python3.9/site-packages"
        );
    }

    #[test]
    fn the_interpreter_path_is_ignored_without_an_archive() {
        let orchestrator = JobOrchestrator::new(GatewayConfig {
            env_site_packages_path: Some("environment/lib/python3.9/site-packages".to_owned()),
            ..test_config()
        });
        let mut request = RunJobRequest::default();

        orchestrator.inject_environment(&RequestContext::new(), &mut request);

        assert!(request.archives.is_empty());
        assert!(request.conf.is_empty());
    }

    #[test]
    fn kerberos_settings_need_both_principal_and_keytab() {
        let with_keytab = JobOrchestrator::new(GatewayConfig {
            spark_yarn_keytab_path: Some("/etc/security/keytabs/gateway.keytab".to_owned()),
            ..test_config()
        });
        let ctx = RequestContext::new().with_principal("analyst@EXAMPLE.COM");
        let mut request = RunJobRequest::default();
        with_keytab.inject_environment(&ctx, &mut request);
        assert_eq!(request.conf["spark.yarn.principal"], "analyst@EXAMPLE.COM");
        assert_eq!(request.conf["spark.yarn.keytab"], "/etc/security/keytabs/gateway.keytab");

        let mut request = RunJobRequest::default();
        with_keytab.inject_environment(&RequestContext::new(), &mut request);
        assert!(request.conf.is_empty());

        let without_keytab = JobOrchestrator::new(test_config());
        let mut request = RunJobRequest::default();
        without_keytab.inject_environment(&ctx, &mut request);
        assert!(request.conf.is_empty());
    }

    #[tokio::test]
    async fn run_job_requires_a_file() {
        let orchestrator = JobOrchestrator::new(test_config());
        let error = orchestrator
            .run_job(&RequestContext::new(), &RunJobRequest::default(), true, None)
            .await
            .unwrap_err();

        assert_eq!(error.get_error_type(), SparkwrapErrorType::BadRequest);
        assert!(error
            .to_string()
            .starts_with("Bad request: 'file' is missing in the run request payload."));
    }
}
