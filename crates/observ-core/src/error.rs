use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObservError {
    #[error("configuration file not found: {0}")]
    ConfigNotFound(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("required tool not found: {tool} (install: {install_url})")]
    ToolMissing { tool: String, install_url: String },

    #[error("{tool} {found} is older than required {required} (update: {install_url})")]
    ToolOutdated {
        tool: String,
        found: String,
        required: String,
        install_url: String,
    },

    #[error("not authenticated with gcloud: run 'gcloud auth login'")]
    NotAuthenticated,

    #[error("project '{0}' not found or not accessible")]
    ProjectNotAccessible(String),

    #[error("missing required stack output: {0}")]
    MissingStackOutput(String),

    #[error("phase '{phase}' out of order: {reason}")]
    PhaseOrder { phase: String, reason: String },

    #[error("external command failed: {command}: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ObservError>;
