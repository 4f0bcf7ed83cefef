use std::fmt;
use std::io;
use std::path::PathBuf;

use gtfs_via_sql_model::GtfsParseError;

/// Raised before any output is produced.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid/unsupported file: {0}")]
    UnsupportedFile(String),
    #[error("file {0} has been passed more than once")]
    DuplicateFile(String),
    #[error("invalid {option} {value:?}, must be one of: {}", .allowed.join(", "))]
    InvalidOption {
        option: &'static str,
        value: String,
        allowed: &'static [&'static str],
    },
    #[error("{0}")]
    Incompatible(String),
    #[error("invalid schema name {0:?}")]
    InvalidSchema(String),
    #[error("failed to parse options: {0}")]
    Json(#[from] serde_json::Error),
}

/// A field value that cannot be represented faithfully in the generated schema.
/// Produced by row formatters, which do not know where the row came from.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub message: String,
    pub field: Option<&'static str>,
    pub value: Option<String>,
    pub explanation: Vec<String>,
}

impl RowError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
            value: None,
            explanation: Vec::new(),
        }
    }

    pub fn invalid_value(field: &'static str, value: &str) -> Self {
        Self {
            message: format!("invalid {field}"),
            field: Some(field),
            value: Some(value.to_string()),
            explanation: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: &'static str) -> Self {
        self.field = Some(field);
        self
    }

    pub fn with_explanation(mut self, line: impl Into<String>) -> Self {
        self.explanation.push(line.into());
        self
    }
}

impl From<GtfsParseError> for RowError {
    fn from(err: GtfsParseError) -> Self {
        match err {
            GtfsParseError::UnknownCode { field, value } => Self::invalid_value(field, &value),
            other => Self::new(other.to_string()),
        }
    }
}

/// A [`RowError`] annotated with the file and line it originated from.
#[derive(Debug, Clone, PartialEq)]
pub struct DataError {
    pub file: String,
    pub line: Option<u64>,
    pub message: String,
    pub field: Option<&'static str>,
    pub value: Option<String>,
    pub explanation: Vec<String>,
}

impl DataError {
    pub fn from_row_error(file: &str, line: Option<u64>, err: RowError) -> Self {
        Self {
            file: file.to_string(),
            line,
            message: err.message,
            field: err.field,
            value: err.value,
            explanation: err.explanation,
        }
    }
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.file, self.message)?;
        match (&self.field, &self.value) {
            (Some(field), Some(value)) => write!(f, " ({field} = {value:?})")?,
            (None, Some(value)) => write!(f, " ({value:?})")?,
            _ => {}
        }
        if let Some(line) = self.line {
            write!(f, " at line {line}")?;
        }
        for line in &self.explanation {
            write!(f, "\n  {line}")?;
        }
        Ok(())
    }
}

impl std::error::Error for DataError {}

/// Failure while pulling rows out of a source.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("statement failed: {message}")]
    Statement { message: String },
    #[error("{0} is not supported by this sink")]
    Unsupported(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{dependent} depends on {dependency}")]
    MissingDependency {
        dependent: String,
        dependency: String,
    },
    #[error("dependency cycle: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),
    #[error("no formatter registered for task {0}")]
    UnknownTask(String),
    #[error("{file}: failed to open {}: {source}", .path.display())]
    Open {
        file: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{file}: {source}")]
    Read {
        file: String,
        #[source]
        source: ReadError,
    },
    #[error(transparent)]
    Data(#[from] DataError),
    #[error("failed to write output: {0}")]
    Sink(#[from] SinkError),
}

impl ConvertError {
    /// Stable identifier for callers matching on the failure kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(ConfigError::UnsupportedFile(_)) => "UNSUPPORTED_GTFS_FILE",
            Self::Config(ConfigError::DuplicateFile(_)) => "DUPLICATE_GTFS_FILE",
            Self::Config(_) => "INVALID_OPTION",
            Self::MissingDependency { .. } => "MISSING_GTFS_DEPENDENCY",
            Self::DependencyCycle(_) | Self::UnknownTask(_) => "INVALID_TASK_GRAPH",
            Self::Open { .. } | Self::Read { .. } => "GTFS_READ_FAILED",
            Self::Data(_) => "INVALID_GTFS_DATA",
            Self::Sink(_) => "OUTPUT_FAILED",
        }
    }

    /// The GTFS file the error originated from, if any.
    pub fn gtfs_file(&self) -> Option<&str> {
        match self {
            Self::Config(ConfigError::UnsupportedFile(file) | ConfigError::DuplicateFile(file)) => {
                Some(file.as_str())
            }
            Self::MissingDependency { dependent, .. } => Some(dependent.as_str()),
            Self::Open { file, .. } | Self::Read { file, .. } => Some(file.as_str()),
            Self::Data(err) => Some(err.file.as_str()),
            _ => None,
        }
    }
}
