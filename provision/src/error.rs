use std::path::PathBuf;
use thiserror::Error;

/// Failures that abort a build. None of them are retried.
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("build argument {key} is not valid unicode")]
    NonUnicodeArgument { key: String },

    #[error("package source list {path:?} does not exist")]
    MissingSourceList { path: PathBuf },

    #[error("failed to fetch bootstrap script from {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("bootstrap script from {url} has sha256 {actual}, expected {expected}")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("script {path:?} failed with {status}")]
    ScriptFailed { path: PathBuf, status: String },

    #[error("no hook is registered at {path:?}, the base image was not built by provision")]
    NoHook { path: PathBuf },

    #[error("overlay directory {path:?} does not exist")]
    MissingOverlay { path: PathBuf },
}
