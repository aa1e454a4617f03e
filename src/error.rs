use std::sync::PoisonError;

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0} is not a valid duration value")]
    DurationError(String),

    #[error("Url={0}, Status={1}, Response={2}")]
    HttpError(String, StatusCode, String),

    #[error("Timeout")]
    Timeout,

    #[error("Search failed: {0}")]
    SearchFailed(String),

    #[error("Search superseded by a newer query")]
    SearchSuperseded,

    #[error("Search worker is gone")]
    SearchWorkerGone,

    #[error("{0}")]
    InvalidConfig(String),

    #[error("{0}")]
    SyncError(String),

    #[error(transparent)]
    VarError(#[from] std::env::VarError),

    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    YamlError(#[from] serde_yaml::Error),
}

impl<Guard> From<PoisonError<Guard>> for Error {
    fn from(e: PoisonError<Guard>) -> Self {
        Error::SyncError(e.to_string())
    }
}
