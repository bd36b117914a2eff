//! Context resolution.
//!
//! Binds a context name to the cluster and user entries it references.
//! Lookups are by exact name and the first matching entry wins.

use serde_json::Value;

use crate::error::{CredentialError, Result};
use crate::model::{Kubeconfig, str_field};

/// Borrowed view of a context and the entries it references.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedContext<'a> {
    pub name: &'a str,
    pub context: &'a Value,
    pub cluster_name: &'a str,
    pub cluster: &'a Value,
    pub user_name: &'a str,
    pub user: &'a Value,
}

impl ResolvedContext<'_> {
    /// The cluster's API server URL, if the entry sets one.
    pub fn server(&self) -> Option<&str> {
        str_field(self.cluster, "server")
    }
}

/// Resolve `name` against the document.
///
/// Fails with [`CredentialError::NotFound`] if the context or either entry it
/// references is missing.
pub fn resolve_context<'a>(document: &'a Kubeconfig, name: &str) -> Result<ResolvedContext<'a>> {
    let entry = document
        .find_context(name)
        .ok_or_else(|| CredentialError::not_found("context", name))?;

    let cluster_name = str_field(&entry.context, "cluster").ok_or_else(|| {
        CredentialError::not_found("cluster", format!("<unset in context {name}>"))
    })?;
    let user_name = str_field(&entry.context, "user").ok_or_else(|| {
        CredentialError::not_found("user", format!("<unset in context {name}>"))
    })?;

    let cluster = document
        .find_cluster(cluster_name)
        .ok_or_else(|| CredentialError::not_found("cluster", cluster_name))?;
    let user = document
        .find_user(user_name)
        .ok_or_else(|| CredentialError::not_found("user", user_name))?;

    Ok(ResolvedContext {
        name: &entry.name,
        context: &entry.context,
        cluster_name,
        cluster: &cluster.cluster,
        user_name,
        user: &user.user,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> Kubeconfig {
        Kubeconfig::from_yaml(
            r#"
clusters:
- name: prod
  cluster:
    server: https://prod.example.com
- name: prod
  cluster:
    server: https://shadowed.example.com
- name: no-server
  cluster: {}
users:
- name: admin
  user:
    token: t
contexts:
- name: prod
  context: { cluster: prod, user: admin }
- name: dangling-cluster
  context: { cluster: missing, user: admin }
- name: dangling-user
  context: { cluster: prod, user: missing }
- name: serverless
  context: { cluster: no-server, user: admin }
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_resolve_binds_cluster_and_user() {
        let doc = document();
        let resolved = resolve_context(&doc, "prod").unwrap();
        assert_eq!(resolved.name, "prod");
        assert_eq!(resolved.server(), Some("https://prod.example.com"));
        assert_eq!(resolved.user["token"], "t");
    }

    #[test]
    fn test_missing_context() {
        let doc = document();
        let err = resolve_context(&doc, "staging").unwrap_err();
        assert!(matches!(err, CredentialError::NotFound { kind: "context", .. }));
    }

    #[test]
    fn test_missing_cluster_and_user() {
        let doc = document();
        let err = resolve_context(&doc, "dangling-cluster").unwrap_err();
        assert!(matches!(
            err,
            CredentialError::NotFound { kind: "cluster", ref name } if name == "missing"
        ));

        let err = resolve_context(&doc, "dangling-user").unwrap_err();
        assert!(matches!(err, CredentialError::NotFound { kind: "user", .. }));
    }

    #[test]
    fn test_cluster_without_server_still_resolves() {
        let doc = document();
        let resolved = resolve_context(&doc, "serverless").unwrap();
        assert_eq!(resolved.cluster_name, "no-server");
        assert_eq!(resolved.server(), None);
    }
}
