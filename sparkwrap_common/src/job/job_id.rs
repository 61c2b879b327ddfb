use ::core::fmt::Display;
use ::std::{borrow::Cow, fmt};

use ::anyhow::anyhow;
use ::serde::{
    de::{self, Visitor},
    Deserialize, Deserializer, Serialize,
};

use crate::error::{Result, SparkwrapError};

/// Identifier assigned to a batch job by the gateway.
/// The gateway reports it as a JSON number, but it is treated as opaque
/// here, so both numbers and strings deserialize into the same canonical
/// string form.
#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct JobId {
    id: Cow<'static, str>,
}

impl JobId {
    pub fn new(id: Cow<'static, str>) -> Result<Self> {
        if id.is_empty() {
            Err(SparkwrapError::bad_request(anyhow!(
                "Job id cannot be empty."
            )))
        } else {
            Ok(Self { id })
        }
    }
}

impl<'de> Deserialize<'de> for JobId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(JobIdVisitor)
    }
}

struct JobIdVisitor;

impl Visitor<'_> for JobIdVisitor {
    type Value = JobId;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a non-empty string or an integer representing a JobId")
    }

    fn visit_str<E>(self, value: &str) -> std::result::Result<Self::Value, E>
    where
        E: de::Error,
    {
        JobId::try_from(value.to_owned()).map_err(de::Error::custom)
    }

    fn visit_u64<E>(self, value: u64) -> std::result::Result<Self::Value, E>
    where
        E: de::Error,
    {
        JobId::try_from(value.to_string()).map_err(de::Error::custom)
    }

    fn visit_i64<E>(self, value: i64) -> std::result::Result<Self::Value, E>
    where
        E: de::Error,
    {
        JobId::try_from(value.to_string()).map_err(de::Error::custom)
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl TryFrom<String> for JobId {
    type Error = SparkwrapError;
    fn try_from(id: String) -> Result<Self> {
        Self::new(Cow::Owned(id))
    }
}

impl TryFrom<&'static str> for JobId {
    type Error = SparkwrapError;
    fn try_from(id: &'static str) -> Result<Self> {
        Self::new(Cow::Borrowed(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::serde_json::json;

    #[test]
    fn job_id_cannot_be_empty() {
        let result = JobId::try_from("");
        assert!(result.is_err_and(|e| e
            .to_string()
            .starts_with("Bad request: Job id cannot be empty.")));
    }

    #[test]
    fn cannot_deserialize_empty_str_to_job_id() {
        let result: std::result::Result<JobId, _> = serde_json::from_value(json!(""));
        assert!(result.is_err_and(|e| e
            .to_string()
            .starts_with("Bad request: Job id cannot be empty.")));
    }

    #[test]
    fn deserialize_job_id_from_string() -> anyhow::Result<()> {
        let result: JobId = serde_json::from_value(json!("abc"))?;
        assert_eq!(result, JobId::try_from("abc")?);
        Ok(())
    }

    #[test]
    fn deserialize_job_id_from_integer() -> anyhow::Result<()> {
        let result: JobId = serde_json::from_value(json!(7))?;
        assert_eq!(result, JobId::try_from("7")?);
        Ok(())
    }

    #[test]
    fn serialize_job_id_as_plain_string() -> anyhow::Result<()> {
        let id = JobId::try_from("7")?;
        assert_eq!(serde_json::to_value(&id)?, json!("7"));
        Ok(())
    }
}
