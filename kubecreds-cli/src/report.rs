//! Printable summary of a resolved context.

use std::fmt;
use std::path::PathBuf;

use kubecreds_core::{CredentialContext, Kubeconfig, Result};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialReport {
    pub context: Option<String>,
    pub server: Option<String>,
    pub namespace: Option<String>,
    pub insecure_skip_tls_verify: bool,
    pub certificate_authority: Option<PathBuf>,
    pub client_certificate: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
    pub auth_provider: bool,
    pub token: Option<String>,
}

impl CredentialReport {
    /// Snapshot `creds`, fetching the token (which may run the auth provider).
    pub fn collect(creds: &CredentialContext) -> Result<Self> {
        let token = creds.token()?.map(|t| t.expose().to_string());
        Ok(Self {
            context: creds.active_context_name().map(String::from),
            server: creds.server().map(String::from),
            namespace: creds.namespace().map(String::from),
            insecure_skip_tls_verify: creds.insecure_skip_tls_verify(),
            certificate_authority: creds.certificate_authority_path().map(PathBuf::from),
            client_certificate: creds.client_certificate_path().map(PathBuf::from),
            client_key: creds.client_key_path().map(PathBuf::from),
            auth_provider: creds.is_auth_provider(),
            token,
        })
    }
}

impl fmt::Display for CredentialReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn line(
            f: &mut fmt::Formatter<'_>,
            label: &str,
            value: Option<impl fmt::Display>,
        ) -> fmt::Result {
            match value {
                Some(value) => writeln!(f, "{label:<24}{value}"),
                None => writeln!(f, "{label:<24}-"),
            }
        }

        line(f, "Context:", self.context.as_deref())?;
        line(f, "Server:", self.server.as_deref())?;
        line(f, "Namespace:", self.namespace.as_deref())?;
        line(f, "Skip TLS verify:", Some(self.insecure_skip_tls_verify))?;
        let ca = self.certificate_authority.as_ref().map(|p| p.display());
        line(f, "Certificate authority:", ca)?;
        let cert = self.client_certificate.as_ref().map(|p| p.display());
        line(f, "Client certificate:", cert)?;
        line(f, "Client key:", self.client_key.as_ref().map(|p| p.display()))?;
        line(f, "Auth provider:", Some(self.auth_provider))?;
        line(f, "Token:", self.token.as_deref())
    }
}

/// Context names of a document, with its `current-context` marked.
///
/// Built from the parsed document alone; nothing is activated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextList {
    pub current: Option<String>,
    pub names: Vec<String>,
}

impl ContextList {
    pub fn from_document(document: &Kubeconfig) -> Self {
        Self {
            current: document.current_context.clone(),
            names: document.context_names().into_iter().map(String::from).collect(),
        }
    }
}

impl fmt::Display for ContextList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for name in &self.names {
            let marker = if self.current.as_ref() == Some(name) { "*" } else { " " };
            writeln!(f, "{marker} {name}")?;
        }
        Ok(())
    }
}
