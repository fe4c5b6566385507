use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// The core error taxonomy. Planner errors (`CycleDetected`, `SchemaIncompatible`,
/// `SchemaVersionMismatch`, `Configuration`) abort before any execution starts.
/// Everything else that happens during a run is captured into a `Message`'s
/// execution context rather than propagated (see `executor::DagExecutor`).
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("connector config error ({connector}): {message}")]
    ConnectorConfig { connector: String, message: String },

    #[error("connector extraction error ({connector}): {message}")]
    ConnectorExtraction { connector: String, message: String },

    #[error("analyser processing error ({processor}): {message}")]
    AnalyserProcessing { processor: String, message: String },

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("cycle detected among artifacts: {0:?}")]
    CycleDetected(Vec<String>),

    #[error("schema incompatible: predecessor `{predecessor}` and successor `{successor}` share no schema name")]
    SchemaIncompatible {
        predecessor: String,
        successor: String,
    },

    #[error("schema version mismatch for `{schema_name}`: offered {offered:?}, requested {requested:?}")]
    SchemaVersionMismatch {
        schema_name: String,
        offered: Vec<String>,
        requested: Vec<String>,
    },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn serialization<E: std::fmt::Display>(e: E) -> Self {
        Self::Serialization(e.to_string())
    }

    pub fn configuration<E: std::fmt::Display>(e: E) -> Self {
        Self::Configuration(e.to_string())
    }
}
