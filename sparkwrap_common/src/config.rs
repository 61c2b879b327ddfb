//! Configuration for the sparkwrap gateway clients.

use ::std::{fs::File, io::BufReader};

use ::clap::Parser;
use ::serde::{de::DeserializeOwned, Deserialize};
use ::serde_json::from_reader;

use crate::error::{Result, SparkwrapError};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
/// Command line arguments for binaries built on the sparkwrap crates.
pub struct Args {
    /// path to the config file
    #[arg(long)]
    pub config_path: String,
}

impl Args {
    /// helper function for exporting the `clap::Parser::parse` function
    pub fn parse_args() -> Self {
        Args::parse()
    }
}

/// Load a configuration of type `T` from a JSON file.
pub fn load_config<T: DeserializeOwned>(path: &str) -> Result<T> {
    let file = File::open(path).map_err(SparkwrapError::fail_to_load_config)?;
    let reader = BufReader::new(file);
    from_reader(reader).map_err(SparkwrapError::fail_to_load_config)
}

/// Endpoints and path bases of the remote compute and file gateways.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Base URL of the batch job gateway, e.g. `http://livy:8998`.
    pub livy_url: String,
    /// Base URL of the file gateway, e.g. `http://namenode:50070`.
    pub web_hdfs_url: String,
    /// URL prefix substituted into job payloads for the `$hdfs` token,
    /// e.g. `hdfs://namenode:9000`.
    pub hdfs_file_base_url: String,
    /// Location under which all file operations are rooted.
    pub base_hdfs_location: Option<String>,
    /// Archive shipped with every job so that executors get the
    /// python environment they need.
    pub env_archive_location: Option<String>,
    /// `PYTHONPATH` pointing into the unpacked environment archive.
    pub env_site_packages_path: Option<String>,
    /// Keytab path forwarded to the job when a principal is known.
    pub spark_yarn_keytab_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::anyhow::Result;
    use ::serde_json::{from_value, json};

    #[test]
    fn missing_field_livy_url() {
        let config = json!(
            {
                "web_hdfs_url": "http://namenode:50070",
                "hdfs_file_base_url": "hdfs://namenode:9000"
            }
        );
        let result = from_value::<GatewayConfig>(config);
        assert_eq!(result.unwrap_err().to_string(), "missing field `livy_url`");
    }

    #[test]
    fn missing_field_web_hdfs_url() {
        let config = json!(
            {
                "livy_url": "http://livy:8998",
                "hdfs_file_base_url": "hdfs://namenode:9000"
            }
        );
        let result = from_value::<GatewayConfig>(config);
        assert_eq!(
            result.unwrap_err().to_string(),
            "missing field `web_hdfs_url`"
        );
    }

    #[test]
    fn deny_unknown_fields() {
        let config = json!(
            {
                "livy_url": "http://livy:8998",
                "web_hdfs_url": "http://namenode:50070",
                "hdfs_file_base_url": "hdfs://namenode:9000",
                "unknown_field": "unknown"
            }
        );
        let result = from_value::<GatewayConfig>(config);
        assert_eq!(
            result.unwrap_err().to_string(),
            "unknown field `unknown_field`, expected one of `livy_url`, `web_hdfs_url`, `hdfs_file_base_url`, `base_hdfs_location`, `env_archive_location`, `env_site_packages_path`, `spark_yarn_keytab_path`"
        );
    }

    #[test]
    fn optional_fields_default_to_none() -> Result<()> {
        let config = json!(
            {
                "livy_url": "http://livy:8998",
                "web_hdfs_url": "http://namenode:50070",
                "hdfs_file_base_url": "hdfs://namenode:9000"
            }
        );
        let result = from_value::<GatewayConfig>(config)?;
        assert_eq!(
            result,
            GatewayConfig {
                livy_url: "http://livy:8998".to_owned(),
                web_hdfs_url: "http://namenode:50070".to_owned(),
                hdfs_file_base_url: "hdfs://namenode:9000".to_owned(),
                base_hdfs_location: None,
                env_archive_location: None,
                env_site_packages_path: None,
                spark_yarn_keytab_path: None,
            }
        );
        Ok(())
    }

    #[test]
    fn deserialize_gateway_config() -> Result<()> {
        let config = json!(
            {
                "livy_url": "http://livy:8998",
                "web_hdfs_url": "http://namenode:50070",
                "hdfs_file_base_url": "hdfs://namenode:9000",
                "base_hdfs_location": "user/gateway",
                "env_archive_location": "hdfs://namenode:9000/envs/py_env.tar.gz",
                "env_site_packages_path": "py_env/lib/python3.9/site-packages",
                "spark_yarn_keytab_path": "/etc/security/keytabs/gateway.keytab"
            }
        );
        let result = from_value::<GatewayConfig>(config)?;
        assert_eq!(
            result,
            GatewayConfig {
                livy_url: "http://livy:8998".to_owned(),
                web_hdfs_url: "http://namenode:50070".to_owned(),
                hdfs_file_base_url: "hdfs://namenode:9000".to_owned(),
                base_hdfs_location: Some("user/gateway".to_owned()),
                env_archive_location: Some("hdfs://namenode:9000/envs/py_env.tar.gz".to_owned()),
                env_site_packages_path: Some("py_env/lib/python3.9/site-packages".to_owned()),
                spark_yarn_keytab_path: Some("/etc/security/keytabs/gateway.keytab".to_owned()),
            }
        );
        Ok(())
    }
}
