use ::serde::{Deserialize, Serialize};
use ::std::collections::BTreeMap;

mod job_id;
mod job_state;

pub use job_id::JobId;
pub use job_state::JobState;

/// Spark properties passed along with a job.
pub type SparkConf = BTreeMap<String, String>;

/// Request body to submit a batch job.
///
/// Field names follow the gateway's wire format. Optional fields that are
/// unset and collections that are empty are left out of the payload
/// entirely when serializing.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RunJobRequest {
    /// Application to run, e.g. a jar or a python file.
    #[serde(default)]
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jars: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub py_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_memory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_cores: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor_memory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor_cores: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_executors: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub archives: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub conf: SparkConf,
}

/// Job identity and progress as reported by the gateway.
/// `app_id` stays unset until the cluster has scheduled the application.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub id: JobId,
    pub state: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::anyhow::Result;
    use ::serde_json::{from_value, json, to_value};

    #[test]
    fn unset_fields_are_left_out_of_the_payload() -> Result<()> {
        let request = RunJobRequest {
            file: "$hdfs/jobs/main.py".to_owned(),
            ..Default::default()
        };
        assert_eq!(to_value(&request)?, json!({"file": "$hdfs/jobs/main.py"}));
        Ok(())
    }

    #[test]
    fn request_serializes_with_wire_field_names() -> Result<()> {
        let request = RunJobRequest {
            file: "$hdfs/jobs/main.py".to_owned(),
            proxy_user: Some("analyst".to_owned()),
            py_files: vec!["$hdfs/jobs/lib.py".to_owned()],
            driver_memory: Some("2g".to_owned()),
            num_executors: Some(4),
            conf: SparkConf::from([("spark.executor.memory".to_owned(), "2g".to_owned())]),
            ..Default::default()
        };
        assert_eq!(
            to_value(&request)?,
            json!({
                "file": "$hdfs/jobs/main.py",
                "proxyUser": "analyst",
                "pyFiles": ["$hdfs/jobs/lib.py"],
                "driverMemory": "2g",
                "numExecutors": 4,
                "conf": {"spark.executor.memory": "2g"},
            })
        );
        Ok(())
    }

    #[test]
    fn status_deserializes_from_gateway_payload() -> Result<()> {
        // The gateway reports more fields than tracked here; they are ignored.
        let status: JobStatus = from_value(json!({
            "id": 7,
            "state": "running",
            "appId": "application_1700000000000_0001",
            "appInfo": {"driverLogUrl": null},
            "log": ["stdout:"],
        }))?;
        assert_eq!(
            status,
            JobStatus {
                id: JobId::try_from("7")?,
                state: JobState::Running,
                app_id: Some("application_1700000000000_0001".to_owned()),
            }
        );
        Ok(())
    }

    #[test]
    fn status_tolerates_missing_app_id() -> Result<()> {
        let status: JobStatus = from_value(json!({"id": 7, "state": "starting"}))?;
        assert_eq!(status.app_id, None);
        assert_eq!(status.state, JobState::Starting);
        Ok(())
    }
}
