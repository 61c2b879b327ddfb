//! Error type shared by all sparkwrap crates.

use ::core::fmt::Display;

use ::serde::Serialize;

pub type Result<T> = std::result::Result<T, SparkwrapError>;

/// Types of errors raised by the sparkwrap crates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SparkwrapErrorType {
    BadRequest,
    NotFound,
    AmbiguousPath,
    Timeout,
    Transport,
    FailToSubmitJob,
    FailToGetJobStatus,
    FailToGetJobLogs,
    FailToTransfer,
    FailToLoadConfig,
}

/// What the error is about, e.g. the job or the file that an operation failed on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorTarget {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
}

impl ErrorTarget {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug)]
pub struct SparkwrapError {
    error_type: SparkwrapErrorType,
    source: anyhow::Error,
    target: Option<ErrorTarget>,
}

macro_rules! define_error_constructor {
    ($func_name:ident, $error_type:ident) => {
        pub fn $func_name(error: impl Into<anyhow::Error>) -> Self {
            Self::new(SparkwrapErrorType::$error_type, error)
        }
    };
}

impl SparkwrapError {
    fn new(error_type: SparkwrapErrorType, error: impl Into<anyhow::Error>) -> Self {
        Self {
            error_type,
            source: error.into(),
            target: None,
        }
    }

    define_error_constructor!(bad_request, BadRequest);
    define_error_constructor!(not_found, NotFound);
    define_error_constructor!(ambiguous_path, AmbiguousPath);
    define_error_constructor!(timeout, Timeout);
    define_error_constructor!(transport, Transport);
    define_error_constructor!(fail_to_submit_job, FailToSubmitJob);
    define_error_constructor!(fail_to_get_job_status, FailToGetJobStatus);
    define_error_constructor!(fail_to_get_job_logs, FailToGetJobLogs);
    define_error_constructor!(fail_to_transfer, FailToTransfer);
    define_error_constructor!(fail_to_load_config, FailToLoadConfig);

    /// Attach the target that the error is about.
    pub fn with_target(mut self, target: ErrorTarget) -> Self {
        self.target = Some(target);
        self
    }

    pub fn get_error_type(&self) -> SparkwrapErrorType {
        self.error_type
    }

    pub fn get_target(&self) -> Option<&ErrorTarget> {
        self.target.as_ref()
    }
}

impl Display for SparkwrapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.error_type {
            SparkwrapErrorType::BadRequest => "Bad request",
            SparkwrapErrorType::NotFound => "Not found",
            SparkwrapErrorType::AmbiguousPath => "Ambiguous path",
            SparkwrapErrorType::Timeout => "Timeout",
            SparkwrapErrorType::Transport => "Transport error",
            SparkwrapErrorType::FailToSubmitJob => "Fail to submit job",
            SparkwrapErrorType::FailToGetJobStatus => "Fail to get job status",
            SparkwrapErrorType::FailToGetJobLogs => "Fail to get job logs",
            SparkwrapErrorType::FailToTransfer => "Fail to transfer",
            SparkwrapErrorType::FailToLoadConfig => "Fail to load config",
        };
        // `{:#}` prints the whole cause chain of the source.
        write!(f, "{}: {:#}", prefix, self.source)
    }
}

impl std::error::Error for SparkwrapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(AsRef::<dyn std::error::Error>::as_ref(&self.source))
    }
}

impl<T> From<SparkwrapError> for Result<T> {
    fn from(val: SparkwrapError) -> Self {
        Result::Err(val)
    }
}
