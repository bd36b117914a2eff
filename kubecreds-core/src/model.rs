//! Kubeconfig document model.
//!
//! The document is parsed once and never mutated. Entry bodies (`cluster`,
//! `user`, `context`) are kept as generic [`Value`] trees so that auth
//! provider configuration and any fields this crate does not interpret are
//! preserved for path queries.

use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{CredentialError, Result};

/// Parsed kubeconfig document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Kubeconfig {
    /// Context activated when no explicit name is given.
    #[serde(default)]
    pub current_context: Option<String>,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub clusters: Vec<NamedCluster>,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub users: Vec<NamedUser>,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub contexts: Vec<NamedContext>,
}

/// A `{name, cluster}` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    #[serde(default)]
    pub cluster: Value,
}

/// A `{name, user}` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedUser {
    pub name: String,
    #[serde(default)]
    pub user: Value,
}

/// A `{name, context}` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedContext {
    pub name: String,
    #[serde(default)]
    pub context: Value,
}

// kubectl writes `users: null` for empty sections.
fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Kubeconfig {
    /// Parse a document from YAML text.
    pub fn from_yaml(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(contents)
    }

    /// Read and parse a document from disk.
    pub fn read_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CredentialError::ConfigFileNotFound {
                path: path.to_path_buf(),
            });
        }

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents).map_err(|source| CredentialError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Context names in document order.
    pub fn context_names(&self) -> Vec<&str> {
        self.contexts.iter().map(|c| c.name.as_str()).collect()
    }

    /// First context entry with the given name.
    pub fn find_context(&self, name: &str) -> Option<&NamedContext> {
        self.contexts.iter().find(|c| c.name == name)
    }

    /// First cluster entry with the given name.
    pub fn find_cluster(&self, name: &str) -> Option<&NamedCluster> {
        self.clusters.iter().find(|c| c.name == name)
    }

    /// First user entry with the given name.
    pub fn find_user(&self, name: &str) -> Option<&NamedUser> {
        self.users.iter().find(|u| u.name == name)
    }
}

/// Non-empty string field of an entry body.
pub(crate) fn str_field<'a>(body: &'a Value, key: &str) -> Option<&'a str> {
    body.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}
