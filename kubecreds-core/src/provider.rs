//! Auth provider token refresh.
//!
//! A user with an `auth-provider` block gets its bearer token from an
//! external command. The command's stdout must be JSON; `token-key` and
//! `expiry-key` are template paths into that output.
//!
//! ```yaml
//! auth-provider:
//!   name: gcp
//!   config:
//!     cmd-path: /usr/bin/gcloud
//!     cmd-args: config config-helper --format=json
//!     token-key: '{.credential.access_token}'
//!     expiry-key: '{.credential.token_expiry}'
//! ```

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{CredentialError, Result};
use crate::exec::{AuthCommand, CommandRunner};
use crate::query::{PathQuery, normalize_template_path};
use crate::secret::Secret;

const CMD_PATH: &str = "$['auth-provider'].config['cmd-path']";
const CMD_ARGS: &str = "$['auth-provider'].config['cmd-args']";
const TOKEN_KEY: &str = "$['auth-provider'].config['token-key']";
const EXPIRY_KEY: &str = "$['auth-provider'].config['expiry-key']";

/// Token and expiry produced by one refresh.
///
/// The pair is always replaced as a unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachedToken {
    pub token: Option<Secret>,
    pub expiry: Option<DateTime<Utc>>,
}

/// Auth provider configuration bound to a user entry.
#[derive(Debug, Clone)]
pub struct AuthProvider {
    name: Option<String>,
    user: Value,
}

impl AuthProvider {
    /// Returns `None` unless the user carries an `auth-provider` block.
    pub fn from_user(user: &Value) -> Option<Self> {
        let block = user.get("auth-provider").filter(|b| !b.is_null())?;
        Some(Self {
            name: block.get("name").and_then(Value::as_str).map(String::from),
            user: user.clone(),
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The command described by `cmd-path` and `cmd-args`.
    pub fn command(&self, query: &dyn PathQuery) -> Result<AuthCommand> {
        let cmd_path = self.config_str(query, CMD_PATH)?.ok_or_else(|| {
            CredentialError::AuthCommand {
                command: String::new(),
                output: String::new(),
                message: "auth provider has no cmd-path".to_string(),
            }
        })?;
        let cmd_args = self.config_str(query, CMD_ARGS)?;
        Ok(AuthCommand::from_config(&cmd_path, cmd_args.as_deref()))
    }

    /// Run the command and extract a fresh token and expiry.
    ///
    /// Every failure after the command is built, including a `token-key` or
    /// `expiry-key` that cannot be evaluated, is reported as
    /// [`CredentialError::AuthCommand`].
    pub fn refresh(
        &self,
        runner: &dyn CommandRunner,
        query: &dyn PathQuery,
    ) -> Result<CachedToken> {
        let command = self.command(query)?;
        info!(
            provider = self.name().unwrap_or("unnamed"),
            "refreshing auth provider token"
        );

        let output = runner
            .run(&command)
            .map_err(|e| CredentialError::AuthCommand {
                command: command.to_string(),
                output: String::new(),
                message: format!("failed to run: {e}"),
            })?;

        if !output.success() {
            let status = output
                .status
                .map_or_else(|| "a signal".to_string(), |code| format!("status {code}"));
            return Err(CredentialError::AuthCommand {
                command: command.to_string(),
                output: output.combined(),
                message: format!("exited with {status}"),
            });
        }

        let parsed = match serde_json::from_str::<Value>(&output.stdout) {
            Ok(value @ (Value::Object(_) | Value::Array(_))) => value,
            _ => {
                return Err(CredentialError::AuthCommand {
                    command: command.to_string(),
                    output: output.combined(),
                    message: "did not return valid data".to_string(),
                });
            }
        };

        let extract = |key: &str| {
            self.output_value(query, key, &parsed)
                .map_err(|e| CredentialError::AuthCommand {
                    command: command.to_string(),
                    output: output.combined(),
                    message: format!("could not read output: {e}"),
                })
        };

        let expiry = extract(EXPIRY_KEY)?.and_then(|value| {
                let expiry = parse_expiry(&value);
                if expiry.is_none() {
                    warn!(value = %value, "ignoring unparseable token expiry");
                }
                expiry
            });
        let token = extract(TOKEN_KEY)?.and_then(|value| value.as_str().map(Secret::new));

        debug!(has_token = token.is_some(), ?expiry, "auth provider refresh complete");
        Ok(CachedToken { token, expiry })
    }

    fn config_str(&self, query: &dyn PathQuery, expression: &str) -> Result<Option<String>> {
        Ok(query
            .query(&self.user, expression)?
            .and_then(|v| v.as_str().map(String::from))
            .filter(|s| !s.is_empty()))
    }

    // Looks up a template key in the config, then evaluates it against the command output.
    fn output_value(
        &self,
        query: &dyn PathQuery,
        key: &str,
        output: &Value,
    ) -> Result<Option<Value>> {
        match self.config_str(query, key)? {
            Some(template) => query.query(output, &normalize_template_path(&template)),
            None => Ok(None),
        }
    }
}

/// Interpret an expiry value from command output.
///
/// Integers are epoch seconds. Strings are RFC 3339 timestamps, naive
/// `YYYY-MM-DD HH:MM:SS` times (taken as UTC), or digit-only epoch seconds.
pub fn parse_expiry(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        Value::String(s) => parse_expiry_str(s.trim()),
        _ => None,
    }
}

fn parse_expiry_str(s: &str) -> Option<DateTime<Utc>> {
    if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
        return s.parse().ok().and_then(|secs| DateTime::from_timestamp(secs, 0));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}
