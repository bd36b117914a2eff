//! Kubeconfig discovery and in-cluster locations.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{CredentialError, Result};

/// Environment variable naming the kubeconfig path list.
pub const KUBECONFIG_ENV: &str = "KUBECONFIG";

/// Service account directory mounted into every pod.
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// API server address reachable from inside a cluster.
pub const IN_CLUSTER_SERVER: &str = "https://kubernetes.default.svc";

pub(crate) const SERVICE_ACCOUNT_TOKEN: &str = "token";
pub(crate) const SERVICE_ACCOUNT_CA: &str = "ca.crt";
pub(crate) const SERVICE_ACCOUNT_NAMESPACE: &str = "namespace";

/// Locate the kubeconfig to load.
///
/// Uses `explicit` when given, else the first entry of `$KUBECONFIG`, else
/// `~/.kube/config`. The chosen path must exist.
pub fn kubeconfig_path(explicit: Option<&Path>) -> Result<PathBuf> {
    resolve_kubeconfig_path(explicit, std::env::var_os(KUBECONFIG_ENV), home_dir())
}

/// [`kubeconfig_path`] with the environment passed in.
pub fn resolve_kubeconfig_path(
    explicit: Option<&Path>,
    env: Option<OsString>,
    home: Option<PathBuf>,
) -> Result<PathBuf> {
    let from_env = |value: OsString| {
        std::env::split_paths(&value).find(|p| !p.as_os_str().is_empty())
    };
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| env.and_then(from_env))
        .or_else(|| home.map(|home| home.join(".kube").join("config")))
        .ok_or_else(|| CredentialError::ConfigFileNotFound {
            path: PathBuf::from("~/.kube/config"),
        })?;

    if !path.exists() {
        return Err(CredentialError::ConfigFileNotFound { path });
    }

    debug!(path = %path.display(), "using kubeconfig");
    Ok(path)
}

fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "").unwrap();
        path
    }

    #[test]
    fn test_explicit_path_wins() {
        let dir = TempDir::new().unwrap();
        let explicit = touch(&dir, "explicit");
        let from_env = touch(&dir, "env");

        let path = resolve_kubeconfig_path(
            Some(&explicit),
            Some(from_env.into_os_string()),
            Some(dir.path().to_path_buf()),
        )
        .unwrap();
        assert_eq!(path, explicit);
    }

    #[test]
    fn test_env_first_entry() {
        let dir = TempDir::new().unwrap();
        let first = touch(&dir, "first");
        let second = touch(&dir, "second");
        let joined = std::env::join_paths([&first, &second]).unwrap();

        let path = resolve_kubeconfig_path(None, Some(joined), None).unwrap();
        assert_eq!(path, first);
    }

    #[test]
    fn test_home_default() {
        let dir = TempDir::new().unwrap();
        let config = touch(&dir, ".kube/config");

        let path = resolve_kubeconfig_path(None, None, Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(path, config);
    }

    #[test]
    fn test_missing_path() {
        let dir = TempDir::new().unwrap();
        let err = resolve_kubeconfig_path(None, None, Some(dir.path().to_path_buf())).unwrap_err();
        assert!(matches!(
            err,
            CredentialError::ConfigFileNotFound { ref path } if path.ends_with(".kube/config")
        ));

        let err = resolve_kubeconfig_path(None, None, None).unwrap_err();
        assert!(matches!(err, CredentialError::ConfigFileNotFound { .. }));
    }
}
