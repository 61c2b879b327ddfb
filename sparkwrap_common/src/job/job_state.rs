use ::core::fmt::Display;

use ::serde::{Deserialize, Serialize};

/// States reported by the gateway for a batch job.
///
/// `Starting` and `Running` are live states; `Success`, `Error`, `Dead`
/// and `Killed` are terminal. Any other state name the gateway reports is
/// preserved in `Other` and treated as live, so that callers waiting for
/// a terminal state keep polling instead of misreading it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum JobState {
    Starting,
    Running,
    Success,
    Error,
    Dead,
    Killed,
    Other(String),
}

impl JobState {
    /// Whether the job has finished and the state cannot change anymore.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Success | JobState::Error | JobState::Dead | JobState::Killed
        )
    }

    fn as_str(&self) -> &str {
        match self {
            JobState::Starting => "starting",
            JobState::Running => "running",
            JobState::Success => "success",
            JobState::Error => "error",
            JobState::Dead => "dead",
            JobState::Killed => "killed",
            JobState::Other(state) => state,
        }
    }
}

impl From<String> for JobState {
    fn from(state: String) -> Self {
        match state.as_str() {
            "starting" => JobState::Starting,
            "running" => JobState::Running,
            "success" => JobState::Success,
            "error" => JobState::Error,
            "dead" => JobState::Dead,
            "killed" => JobState::Killed,
            _ => JobState::Other(state),
        }
    }
}

impl From<JobState> for String {
    fn from(state: JobState) -> Self {
        match state {
            JobState::Other(state) => state,
            named => named.as_str().to_owned(),
        }
    }
}

impl Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::serde_json::json;

    #[test]
    fn terminal_states() {
        assert!(JobState::Success.is_terminal());
        assert!(JobState::Error.is_terminal());
        assert!(JobState::Dead.is_terminal());
        assert!(JobState::Killed.is_terminal());
        assert!(!JobState::Starting.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(!JobState::Other("shutting_down".to_owned()).is_terminal());
    }

    #[test]
    fn deserialize_known_state() -> anyhow::Result<()> {
        let state: JobState = serde_json::from_value(json!("running"))?;
        assert_eq!(state, JobState::Running);
        Ok(())
    }

    #[test]
    fn unknown_state_round_trips_unchanged() -> anyhow::Result<()> {
        let state: JobState = serde_json::from_value(json!("shutting_down"))?;
        assert_eq!(state, JobState::Other("shutting_down".to_owned()));
        assert_eq!(serde_json::to_value(&state)?, json!("shutting_down"));
        Ok(())
    }

    #[test]
    fn serialize_state_as_gateway_name() -> anyhow::Result<()> {
        assert_eq!(serde_json::to_value(JobState::Success)?, json!("success"));
        assert_eq!(serde_json::to_value(JobState::Starting)?, json!("starting"));
        Ok(())
    }
}
