use std::{io, path::PathBuf, time::Duration};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot read credentials from {}: {source}", path.display())]
    CredentialsUnavailable { path: PathBuf, source: io::Error },
    #[error("empty connection string")]
    EmptyCredentials,
    #[error("invalid connection string: {0}")]
    InvalidConnectionString(&'static str),
    #[error("cannot read directory {}: {reason}", path.display())]
    DirectoryUnreadable { path: PathBuf, reason: String },
    #[error("cannot build a blob name from {}", .0.display())]
    InvalidPath(PathBuf),
    #[error("cannot open {}: {source}", path.display())]
    FileUnreadable { path: PathBuf, source: io::Error },
    #[error("upload of {key} failed: {reason}")]
    UploadFailed { key: String, reason: String },
    #[error("blob {key} already exists")]
    AlreadyExists { key: String },
    #[error("upload of {key} timed out after {}", humantime::format_duration(*after))]
    Timeout { key: String, after: Duration },
    #[error("upload cancelled")]
    Cancelled,
    #[error("cannot create HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}
