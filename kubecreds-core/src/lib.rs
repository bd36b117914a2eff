//! # kubecreds core
//!
//! Resolves API server and credentials from a kubeconfig.
//!
//! This crate provides:
//! - A parsed, read-only [`Kubeconfig`] document model
//! - Context resolution binding a context to its cluster and user
//! - Materialization of embedded certificate/key data into owned temp files
//! - Bearer tokens that are static or fetched lazily from an auth provider command
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use kubecreds_core::CredentialContext;
//!
//! let creds = CredentialContext::load(None, Some("prod"))?;
//! let server = creds.server_url()?;
//! let ca = creds.certificate_authority_path();
//! let token = creds.token()?;
//!
//! // At process exit, remove any credential files still on disk.
//! kubecreds_core::shutdown();
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod exec;
pub mod loader;
pub mod materialize;
pub mod model;
pub mod provider;
pub mod query;
pub mod resolve;
pub mod secret;
pub mod token;

// Re-export commonly used types at crate root
pub use config::ContextOptions;

pub use context::{
    ActiveContext,
    CredentialContext,
    IN_CLUSTER_CONTEXT,
};

pub use error::{
    CredentialError,
    Result,
};

pub use exec::{
    AuthCommand,
    CommandOutput,
    CommandRunner,
    SystemRunner,
};

pub use loader::kubeconfig_path;

pub use materialize::{
    CredentialFile,
    MaterializedFile,
    TEMP_FILE_PREFIX,
    shutdown,
};

pub use model::Kubeconfig;

pub use provider::{
    AuthProvider,
    CachedToken,
};

pub use query::{
    JsonPathQuery,
    PathQuery,
};

pub use secret::Secret;

pub use token::{
    RefreshDecision,
    TokenSource,
    TokenState,
};
