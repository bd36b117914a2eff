//! The credential context: one document, at most one active context.
//!
//! # Example
//!
//! ```rust,no_run
//! use kubecreds_core::CredentialContext;
//!
//! # fn main() -> kubecreds_core::Result<()> {
//! let mut creds = CredentialContext::load(None, None)?;
//! creds.activate_context("staging")?;
//!
//! let server = creds.server().unwrap_or("<no server>");
//! if let Some(token) = creds.token()? {
//!     println!("{server} with a {}-byte token", token.expose().len());
//! }
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tracing::{debug, info};
use url::Url;

use crate::config::ContextOptions;
use crate::error::{CredentialError, Result};
use crate::exec::{CommandRunner, SystemRunner};
use crate::loader::{self, IN_CLUSTER_SERVER, SERVICE_ACCOUNT_DIR};
use crate::materialize::{
    self, CERTIFICATE_AUTHORITY, CLIENT_CERTIFICATE, CLIENT_KEY, CredentialFile,
};
use crate::model::{Kubeconfig, str_field};
use crate::query::{JsonPathQuery, PathQuery};
use crate::resolve::resolve_context;
use crate::secret::Secret;
use crate::token::{TokenSource, TokenState};

/// Name reported for the in-cluster pseudo context.
pub const IN_CLUSTER_CONTEXT: &str = "in-cluster";

/// Live state of one resolved context.
///
/// Owns any materialized credential files; dropping it deletes them.
#[derive(Debug)]
pub struct ActiveContext {
    name: String,
    server: Option<String>,
    cluster: Value,
    user: Value,
    namespace: Option<String>,
    insecure_skip_tls_verify: bool,
    certificate_authority: Option<CredentialFile>,
    client_certificate: Option<CredentialFile>,
    client_key: Option<CredentialFile>,
    token: TokenSource,
}

impl ActiveContext {
    /// Resolve `name` and materialize its credentials.
    ///
    /// On error every file written so far is dropped, and with it deleted.
    fn build(document: &Kubeconfig, name: &str, options: &ContextOptions) -> Result<Self> {
        let resolved = resolve_context(document, name)?;
        let dir = options.temp_dir.as_deref();

        let certificate_authority =
            materialize::materialize(resolved.cluster, &CERTIFICATE_AUTHORITY, dir)?;
        let client_certificate =
            materialize::materialize(resolved.user, &CLIENT_CERTIFICATE, dir)?;
        let client_key = materialize::materialize(resolved.user, &CLIENT_KEY, dir)?;

        Ok(Self {
            name: resolved.name.to_string(),
            server: resolved.server().map(String::from),
            cluster: resolved.cluster.clone(),
            user: resolved.user.clone(),
            namespace: str_field(resolved.context, "namespace").map(String::from),
            insecure_skip_tls_verify: resolved
                .cluster
                .get("insecure-skip-tls-verify")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            certificate_authority,
            client_certificate,
            client_key,
            token: TokenSource::from_user(resolved.user),
        })
    }

    fn in_cluster(service_account_dir: &Path, server: &str) -> Result<Self> {
        let token_path = service_account_dir.join(loader::SERVICE_ACCOUNT_TOKEN);
        let token = std::fs::read_to_string(&token_path)?;
        let token = token.trim();

        let ca_path = service_account_dir.join(loader::SERVICE_ACCOUNT_CA);
        let certificate_authority = ca_path
            .exists()
            .then(|| CredentialFile::Supplied(ca_path.clone()));

        let namespace_path = service_account_dir.join(loader::SERVICE_ACCOUNT_NAMESPACE);
        let namespace = std::fs::read_to_string(namespace_path)
            .ok()
            .map(|ns| ns.trim().to_string())
            .filter(|ns| !ns.is_empty());

        let user = json!({ "token": token });
        Ok(Self {
            name: IN_CLUSTER_CONTEXT.to_string(),
            server: Some(server.to_string()),
            cluster: json!({
                "server": server,
                "certificate-authority": ca_path.to_string_lossy(),
            }),
            token: TokenSource::from_user(&user),
            user,
            namespace,
            insecure_skip_tls_verify: false,
            certificate_authority,
            client_certificate: None,
            client_key: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// API server URL; `None` when the cluster entry has no `server`.
    pub fn server(&self) -> Option<&str> {
        self.server.as_deref()
    }

    /// Raw cluster entry body.
    pub fn cluster(&self) -> &Value {
        &self.cluster
    }

    /// Raw user entry body.
    pub fn user(&self) -> &Value {
        &self.user
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn insecure_skip_tls_verify(&self) -> bool {
        self.insecure_skip_tls_verify
    }

    pub fn certificate_authority(&self) -> Option<&CredentialFile> {
        self.certificate_authority.as_ref()
    }

    pub fn client_certificate(&self) -> Option<&CredentialFile> {
        self.client_certificate.as_ref()
    }

    pub fn client_key(&self) -> Option<&CredentialFile> {
        self.client_key.as_ref()
    }

    pub fn token_source(&self) -> &TokenSource {
        &self.token
    }
}

/// Resolves server and credentials for one context of a kubeconfig.
///
/// Activating a context never runs external commands; auth provider tokens
/// are fetched on the first [`token()`](Self::token) call and again once
/// they expire.
///
/// # Thread Safety
///
/// `token()` takes `&self` and serializes refreshes internally, so a context
/// can be shared behind an `Arc`. Switching contexts needs `&mut self`.
pub struct CredentialContext {
    document: Kubeconfig,
    active: Option<ActiveContext>,
    options: ContextOptions,
    runner: Arc<dyn CommandRunner>,
    query: Arc<dyn PathQuery>,
}

impl std::fmt::Debug for CredentialContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialContext")
            .field("contexts", &self.document.contexts.len())
            .field("active", &self.active_context_name())
            .field("options", &self.options)
            .finish()
    }
}

impl CredentialContext {
    /// Load a kubeconfig and activate a context.
    ///
    /// `path` falls back to `$KUBECONFIG`, then `~/.kube/config`. `context`
    /// falls back to the document's `current-context`.
    pub fn load(path: Option<&Path>, context: Option<&str>) -> Result<Self> {
        Self::load_with(path, context, ContextOptions::default())
    }

    /// [`load`](Self::load) with explicit options.
    pub fn load_with(
        path: Option<&Path>,
        context: Option<&str>,
        options: ContextOptions,
    ) -> Result<Self> {
        let path = loader::kubeconfig_path(path)?;
        let document = Kubeconfig::read_from(&path)?;
        info!(path = %path.display(), contexts = document.contexts.len(), "loaded kubeconfig");
        Self::from_document(document, context, options)
    }

    /// Wrap an already parsed document and activate a context.
    ///
    /// With neither `context` nor `current-context`, nothing is activated.
    pub fn from_document(
        document: Kubeconfig,
        context: Option<&str>,
        options: ContextOptions,
    ) -> Result<Self> {
        let runner = Arc::new(SystemRunner::with_timeout(options.exec_timeout()));
        let mut creds = Self::inactive(document, options, runner);

        let selected = context
            .map(String::from)
            .or_else(|| creds.document.current_context.clone().filter(|c| !c.is_empty()));
        match selected {
            Some(name) => creds.activate_context(&name)?,
            None => debug!("no context selected, nothing activated"),
        }
        Ok(creds)
    }

    /// Credentials of the pod's service account.
    pub fn in_cluster() -> Result<Self> {
        Self::in_cluster_at(Path::new(SERVICE_ACCOUNT_DIR), IN_CLUSTER_SERVER)
    }

    /// In-cluster credentials read from a custom service account directory.
    pub fn in_cluster_at(service_account_dir: &Path, server: &str) -> Result<Self> {
        let active = ActiveContext::in_cluster(service_account_dir, server)?;
        info!(server, "using in-cluster service account");

        let options = ContextOptions::default();
        let runner = Arc::new(SystemRunner::with_timeout(options.exec_timeout()));
        let mut creds = Self::inactive(Kubeconfig::default(), options, runner);
        creds.active = Some(active);
        Ok(creds)
    }

    fn inactive(
        document: Kubeconfig,
        options: ContextOptions,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            document,
            active: None,
            options,
            runner,
            query: Arc::new(JsonPathQuery),
        }
    }

    /// Replace the command runner used for auth provider refreshes.
    pub fn with_runner(mut self, runner: impl CommandRunner + 'static) -> Self {
        self.runner = Arc::new(runner);
        self
    }

    /// Replace the path-query evaluator.
    pub fn with_path_query(mut self, query: impl PathQuery + 'static) -> Self {
        self.query = Arc::new(query);
        self
    }

    /// Switch to the named context.
    ///
    /// The new context is fully built before it replaces the old one. On
    /// failure the previous context stays active and no new files remain on
    /// disk. On success the previous context's materialized files are
    /// deleted.
    pub fn activate_context(&mut self, name: &str) -> Result<()> {
        let next = ActiveContext::build(&self.document, name, &self.options)?;
        info!(
            context = name,
            server = next.server.as_deref().unwrap_or("<unset>"),
            auth_provider = next.token.is_auth_provider(),
            "activated context"
        );

        if let Some(previous) = self.active.replace(next) {
            debug!(context = %previous.name, "released previous context");
        }
        Ok(())
    }

    pub fn document(&self) -> &Kubeconfig {
        &self.document
    }

    pub fn active(&self) -> Option<&ActiveContext> {
        self.active.as_ref()
    }

    pub fn options(&self) -> &ContextOptions {
        &self.options
    }

    pub fn active_context_name(&self) -> Option<&str> {
        self.active.as_ref().map(ActiveContext::name)
    }

    /// The document's `current-context`.
    pub fn current_context(&self) -> Option<&str> {
        self.document.current_context.as_deref()
    }

    pub fn context_names(&self) -> Vec<&str> {
        self.document.context_names()
    }

    pub fn server(&self) -> Option<&str> {
        self.active.as_ref().and_then(ActiveContext::server)
    }

    /// The server as a parsed URL.
    ///
    /// Fails with [`CredentialError::NotFound`] when no context is active or
    /// the active cluster has no `server`.
    pub fn server_url(&self) -> Result<Url> {
        let active = self
            .active
            .as_ref()
            .ok_or_else(|| CredentialError::not_found("context", "<none active>"))?;
        let server = active
            .server()
            .ok_or_else(|| CredentialError::not_found("server", active.name()))?;
        Url::parse(server).map_err(|source| CredentialError::InvalidServer {
            server: server.to_string(),
            source,
        })
    }

    pub fn namespace(&self) -> Option<&str> {
        self.active.as_ref().and_then(ActiveContext::namespace)
    }

    pub fn insecure_skip_tls_verify(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(ActiveContext::insecure_skip_tls_verify)
    }

    pub fn certificate_authority_path(&self) -> Option<&Path> {
        self.active
            .as_ref()
            .and_then(ActiveContext::certificate_authority)
            .map(CredentialFile::path)
    }

    pub fn client_certificate_path(&self) -> Option<&Path> {
        self.active
            .as_ref()
            .and_then(ActiveContext::client_certificate)
            .map(CredentialFile::path)
    }

    pub fn client_key_path(&self) -> Option<&Path> {
        self.active
            .as_ref()
            .and_then(ActiveContext::client_key)
            .map(CredentialFile::path)
    }

    pub fn is_auth_provider(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.token.is_auth_provider())
    }

    /// State of the active context's token, without refreshing it.
    pub fn token_state(&self) -> TokenState {
        self.active
            .as_ref()
            .map_or(TokenState::NoToken, |active| active.token.state(Utc::now()))
    }

    /// The bearer token for the active context.
    ///
    /// For auth provider users this runs the provider command when no token
    /// is cached or the cached one has expired. Command failures are
    /// returned as [`CredentialError::AuthCommand`].
    pub fn token(&self) -> Result<Option<Secret>> {
        self.token_at(Utc::now())
    }

    /// [`token`](Self::token) evaluated as if the current time were `now`.
    pub fn token_at(&self, now: DateTime<Utc>) -> Result<Option<Secret>> {
        match &self.active {
            Some(active) => active.token.token(now, self.runner.as_ref(), self.query.as_ref()),
            None => Ok(None),
        }
    }

    /// Expiry of the cached auth provider token.
    pub fn token_expiry(&self) -> Option<DateTime<Utc>> {
        self.active.as_ref().and_then(|active| active.token.expiry())
    }
}
