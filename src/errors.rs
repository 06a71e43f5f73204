pub use log::{debug, error, info, trace, warn};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error(transparent)]
    Xml(#[from] serde_xml_rs::Error),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Notify(#[from] notify::Error),
    #[error(transparent)]
    JoinError(#[from] tokio::task::JoinError),
    #[error("invalid repository configuration: {0}")]
    Config(String),
    #[error("request to upstream repository failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error("entitlement credential not available: environment variable {0} is not set")]
    CredentialMissing(String),
    #[error("entitlement secret not found for url: {0}")]
    SecretNotFound(String),
    #[error("invalid tag name: {0:?}")]
    InvalidTagName(String),
    #[error("revision not found: {0}")]
    RevisionNotFound(String),
    #[error("repository has no materialized revisions yet")]
    NoLocalContent,
    #[error("external tool {tool} exited with {status}")]
    ExternalTool {
        tool: String,
        status: std::process::ExitStatus,
    },
}

// TODO: consider fixing this
impl warp::reject::Reject for Error {}

pub type Result<T> = std::result::Result<T, Error>;
