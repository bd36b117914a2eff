//! Error types for kubecreds.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = CredentialError> = std::result::Result<T, E>;

/// Error type covering document loading, context activation, and token refresh.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The kubeconfig path does not exist, or no path could be derived.
    #[error("kubeconfig not found: {}", path.display())]
    ConfigFileNotFound { path: PathBuf },

    /// The kubeconfig could not be parsed.
    #[error("failed to parse kubeconfig {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A named context, cluster, user, or required field is missing.
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    /// Embedded base64 credential data is malformed.
    #[error("failed to decode {field}: {source}")]
    CredentialDecode {
        field: &'static str,
        #[source]
        source: base64::DecodeError,
    },

    /// The auth provider command failed or returned unusable output.
    #[error("auth provider command `{command}` failed: {message}\n{output}")]
    AuthCommand {
        command: String,
        output: String,
        message: String,
    },

    /// A path-query expression could not be parsed.
    #[error("invalid path expression `{expression}`: {message}")]
    InvalidPath { expression: String, message: String },

    /// The server field is not a valid URL.
    #[error("invalid server url `{server}`: {source}")]
    InvalidServer {
        server: String,
        #[source]
        source: url::ParseError,
    },

    /// Filesystem error while writing credentials or reading in-cluster files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CredentialError {
    pub(crate) fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }
}
