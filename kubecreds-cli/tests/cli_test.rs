//! Integration tests for CLI configuration and credential reports.

use std::path::Path;
use std::process::{Command, Output};

use kubecreds_cli::config::{CliConfig, load_config_from};
use kubecreds_cli::report::{ContextList, CredentialReport};
use kubecreds_core::{ContextOptions, CredentialContext, Kubeconfig, kubeconfig_path};
use tempfile::TempDir;

#[test]
fn test_missing_config_uses_defaults() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("kubecreds.toml");

    let config = load_config_from(&path).unwrap();
    assert_eq!(config.log_level, "warn");
    assert_eq!(config.context, ContextOptions::default());
    assert_eq!(config.config_path, path);
}

#[test]
fn test_config_file_overrides() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("kubecreds.toml");
    std::fs::write(
        &path,
        "log_level = \"debug\"\nexec_timeout_secs = 30\ntemp_dir = \"/var/tmp/kubecreds\"\n",
    )
    .unwrap();

    let config = load_config_from(&path).unwrap();
    assert_eq!(
        config,
        CliConfig {
            config_path: path.clone(),
            log_level: "debug".to_string(),
            context: ContextOptions {
                exec_timeout_secs: Some(30),
                temp_dir: Some("/var/tmp/kubecreds".into()),
            },
        }
    );
    assert_eq!(
        config.context.exec_timeout(),
        Some(std::time::Duration::from_secs(30))
    );
}

#[test]
fn test_invalid_config_is_an_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("kubecreds.toml");
    std::fs::write(&path, "exec_timeout_secs = \"soon\"").unwrap();

    let err = load_config_from(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to parse config"));
}

#[test]
fn test_credential_report() {
    let doc = Kubeconfig::from_yaml(
        r#"
current-context: dev
clusters:
- name: dev
  cluster:
    server: https://dev.example.com
    certificate-authority: /etc/ca.crt
users:
- name: dev
  user:
    token: dev-token
contexts:
- name: dev
  context: { cluster: dev, user: dev, namespace: web }
"#,
    )
    .unwrap();
    let creds = CredentialContext::from_document(doc, None, ContextOptions::default()).unwrap();

    let report = CredentialReport::collect(&creds).unwrap();
    assert_eq!(report.context.as_deref(), Some("dev"));
    assert_eq!(report.server.as_deref(), Some("https://dev.example.com"));
    assert_eq!(report.namespace.as_deref(), Some("web"));
    assert_eq!(report.certificate_authority, Some("/etc/ca.crt".into()));
    assert_eq!(report.client_key, None);
    assert!(!report.auth_provider);
    assert_eq!(report.token.as_deref(), Some("dev-token"));

    let text = report.to_string();
    assert!(text.contains("https://dev.example.com"));
    assert!(text.contains("Client key:"));

    let json: serde_json::Value = serde_json::to_value(&report).unwrap();
    assert_eq!(json["namespace"], "web");
    assert_eq!(json["client_key"], serde_json::Value::Null);
}

const BROKEN_CURRENT: &str = r#"
current-context: broken
clusters:
- name: good
  cluster:
    server: https://good.example.com
    certificate-authority-data: Y2EgYnl0ZXM=
users:
- name: good
  user:
    token: good-token
contexts:
- name: good
  context: { cluster: good, user: good }
- name: broken
  context: { cluster: missing, user: good }
"#;

#[test]
fn test_context_list_ignores_broken_current_context() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("kubeconfig.yaml");
    std::fs::write(&path, BROKEN_CURRENT).unwrap();

    // Activating current-context fails, but listing only reads the document.
    assert!(CredentialContext::load(Some(path.as_path()), None).is_err());

    let document = Kubeconfig::read_from(&kubeconfig_path(Some(path.as_path())).unwrap()).unwrap();
    let list = ContextList::from_document(&document);
    assert_eq!(list.current.as_deref(), Some("broken"));
    assert_eq!(list.names, vec!["good", "broken"]);
    assert_eq!(list.to_string(), "  good\n* broken\n");
}

#[test]
fn test_context_list_marks_current_not_active() {
    let mut document = Kubeconfig::from_yaml(BROKEN_CURRENT).unwrap();
    document.current_context = Some("good".to_string());
    let list = ContextList::from_document(&document);
    assert_eq!(list.to_string(), "* good\n  broken\n");

    document.current_context = None;
    let list = ContextList::from_document(&document);
    assert_eq!(list.to_string(), "  good\n  broken\n");
}

/// Run the built binary with an isolated home and config dir.
fn kubecreds(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_kubecreds"))
        .args(args)
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env_remove("KUBECONFIG")
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

#[test]
fn test_contexts_command_lists_broken_current_context() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("kubeconfig.yaml");
    std::fs::write(&path, BROKEN_CURRENT).unwrap();
    let path = path.to_str().unwrap();

    let output = kubecreds(temp.path(), &["--kubeconfig", path, "contexts"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "  good\n* broken\n");

    let output = kubecreds(temp.path(), &["--kubeconfig", path, "--context", "good", "contexts"]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "  good\n* broken\n");
}

#[test]
fn test_failure_is_reported_once() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("missing.yaml");

    let output = kubecreds(temp.path(), &["--kubeconfig", missing.to_str().unwrap(), "server"]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(stderr.matches("kubeconfig not found").count(), 1, "stderr: {stderr}");
}
