//! Bearer token state.
//!
//! A user's token is either absent, a literal `token` field, or produced by
//! an auth provider. Provider tokens are fetched lazily on the first
//! [`TokenSource::token`] call and re-fetched when [`decide`] says so:
//!
//! | held token | expiry          | decision  |
//! |------------|-----------------|-----------|
//! | none       | any             | refresh   |
//! | some       | none            | use cached|
//! | some       | `now >= expiry` | refresh   |
//! | some       | `now < expiry`  | use cached|
//!
//! A provider token fetched without an expiry stays valid until the context
//! is replaced.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::exec::CommandRunner;
use crate::model::str_field;
use crate::provider::{AuthProvider, CachedToken};
use crate::query::PathQuery;
use crate::secret::Secret;

/// Observable state of a context's token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// The user has neither `token` nor `auth-provider`.
    NoToken,
    /// A literal token that never expires.
    StaticToken,
    /// Auth provider with a usable cached token.
    DynamicFresh,
    /// Auth provider with no token yet, or one past its expiry.
    DynamicExpired,
}

/// What [`TokenSource::token`] should do with the cached provider token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshDecision {
    UseCached,
    Refresh,
}

/// Decide whether a provider token must be refreshed at `now`.
pub fn decide(
    now: DateTime<Utc>,
    token: Option<&Secret>,
    expiry: Option<DateTime<Utc>>,
) -> RefreshDecision {
    match (token, expiry) {
        (None, _) => RefreshDecision::Refresh,
        (Some(_), Some(expiry)) if now >= expiry => RefreshDecision::Refresh,
        (Some(_), _) => RefreshDecision::UseCached,
    }
}

/// Where a context's bearer token comes from.
#[derive(Debug)]
pub enum TokenSource {
    None,
    Static(Secret),
    AuthProvider {
        provider: AuthProvider,
        cached: Mutex<CachedToken>,
    },
}

impl TokenSource {
    /// Classify a user entry. An `auth-provider` block takes precedence over
    /// a literal `token`.
    pub fn from_user(user: &Value) -> Self {
        if let Some(provider) = AuthProvider::from_user(user) {
            return Self::AuthProvider {
                provider,
                cached: Mutex::new(CachedToken::default()),
            };
        }

        match str_field(user, "token") {
            Some(token) => Self::Static(Secret::new(token)),
            None => Self::None,
        }
    }

    pub fn is_auth_provider(&self) -> bool {
        matches!(self, Self::AuthProvider { .. })
    }

    pub fn state(&self, now: DateTime<Utc>) -> TokenState {
        match self {
            Self::None => TokenState::NoToken,
            Self::Static(_) => TokenState::StaticToken,
            Self::AuthProvider { cached, .. } => {
                let cached = cached.lock();
                match decide(now, cached.token.as_ref(), cached.expiry) {
                    RefreshDecision::UseCached => TokenState::DynamicFresh,
                    RefreshDecision::Refresh => TokenState::DynamicExpired,
                }
            }
        }
    }

    /// Expiry of the cached provider token, if any.
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::AuthProvider { cached, .. } => cached.lock().expiry,
            _ => None,
        }
    }

    /// Current token, refreshing through the auth provider when needed.
    ///
    /// The cache lock is held across decide, refresh, and store, so callers
    /// sharing one source never run the command concurrently. A failed
    /// refresh leaves the previous token and expiry in place.
    pub fn token(
        &self,
        now: DateTime<Utc>,
        runner: &dyn CommandRunner,
        query: &dyn PathQuery,
    ) -> Result<Option<Secret>> {
        match self {
            Self::None => Ok(None),
            Self::Static(token) => Ok(Some(token.clone())),
            Self::AuthProvider { provider, cached } => {
                let mut cached = cached.lock();
                if decide(now, cached.token.as_ref(), cached.expiry) == RefreshDecision::Refresh {
                    *cached = provider.refresh(runner, query)?;
                } else {
                    debug!("using cached auth provider token");
                }
                Ok(cached.token.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{AuthCommand, CommandOutput};
    use crate::query::JsonPathQuery;
    use chrono::Duration;
    use serde_json::json;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRunner {
        calls: AtomicUsize,
        stdout: String,
    }

    impl CountingRunner {
        fn new(stdout: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                stdout: stdout.to_string(),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl CommandRunner for CountingRunner {
        fn run(&self, _command: &AuthCommand) -> io::Result<CommandOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(CommandOutput::ok(self.stdout.clone()))
        }
    }

    struct FailingRunner;

    impl CommandRunner for FailingRunner {
        fn run(&self, _command: &AuthCommand) -> io::Result<CommandOutput> {
            Ok(CommandOutput {
                status: Some(2),
                stdout: String::new(),
                stderr: "boom".into(),
            })
        }
    }

    fn provider_user(with_expiry: bool) -> Value {
        let mut config = json!({
            "cmd-path": "/bin/token-helper",
            "token-key": "{.token}"
        });
        if with_expiry {
            config["expiry-key"] = json!("{.expiry}");
        }
        json!({ "auth-provider": { "name": "exec", "config": config } })
    }

    #[test]
    fn test_decide() {
        let now = Utc::now();
        let token = Secret::new("t");

        assert_eq!(decide(now, None, None), RefreshDecision::Refresh);
        assert_eq!(decide(now, None, Some(now + Duration::hours(1))), RefreshDecision::Refresh);
        assert_eq!(decide(now, Some(&token), None), RefreshDecision::UseCached);
        assert_eq!(
            decide(now, Some(&token), Some(now + Duration::seconds(1))),
            RefreshDecision::UseCached
        );
        assert_eq!(decide(now, Some(&token), Some(now)), RefreshDecision::Refresh);
        assert_eq!(
            decide(now, Some(&token), Some(now - Duration::seconds(1))),
            RefreshDecision::Refresh
        );
    }

    #[test]
    fn test_classify_user() {
        assert!(matches!(TokenSource::from_user(&json!({})), TokenSource::None));
        assert!(matches!(TokenSource::from_user(&json!({ "token": "" })), TokenSource::None));
        assert!(matches!(
            TokenSource::from_user(&json!({ "token": "abc" })),
            TokenSource::Static(_)
        ));

        let mut user = provider_user(false);
        user["token"] = json!("ignored");
        let source = TokenSource::from_user(&user);
        assert!(source.is_auth_provider());
        assert_eq!(source.state(Utc::now()), TokenState::DynamicExpired);
    }

    #[test]
    fn test_static_token_never_runs() {
        let runner = CountingRunner::new("{}");
        let source = TokenSource::from_user(&json!({ "token": "static" }));

        for _ in 0..3 {
            let token = source.token(Utc::now(), &runner, &JsonPathQuery).unwrap();
            assert_eq!(token.unwrap().expose(), "static");
        }
        assert_eq!(runner.calls(), 0);
        assert_eq!(source.state(Utc::now()), TokenState::StaticToken);
    }

    #[test]
    fn test_no_token() {
        let runner = CountingRunner::new("{}");
        let source = TokenSource::from_user(&json!({ "client-key": "/k" }));
        assert!(source.token(Utc::now(), &runner, &JsonPathQuery).unwrap().is_none());
        assert_eq!(source.state(Utc::now()), TokenState::NoToken);
        assert_eq!(runner.calls(), 0);
    }

    #[test]
    fn test_refresh_follows_expiry() {
        let runner = CountingRunner::new(r#"{"token":"fresh","expiry":"2030-01-01T00:00:00Z"}"#);
        let source = TokenSource::from_user(&provider_user(true));
        let before = "2029-12-31T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let after = "2030-01-01T00:00:01Z".parse::<DateTime<Utc>>().unwrap();

        assert_eq!(
            source.token(before, &runner, &JsonPathQuery).unwrap().unwrap().expose(),
            "fresh"
        );
        assert_eq!(runner.calls(), 1);
        assert_eq!(source.state(before), TokenState::DynamicFresh);

        source.token(before, &runner, &JsonPathQuery).unwrap();
        assert_eq!(runner.calls(), 1);

        assert_eq!(source.state(after), TokenState::DynamicExpired);
        source.token(after, &runner, &JsonPathQuery).unwrap();
        assert_eq!(runner.calls(), 2);
    }

    #[test]
    fn test_failed_refresh_keeps_previous_pair() {
        let runner = CountingRunner::new(r#"{"token":"first","expiry":1000}"#);
        let source = TokenSource::from_user(&provider_user(true));
        let now = DateTime::from_timestamp(500, 0).unwrap();

        source.token(now, &runner, &JsonPathQuery).unwrap();
        let expiry = source.expiry();
        assert_eq!(expiry, DateTime::from_timestamp(1000, 0));

        let later = DateTime::from_timestamp(2000, 0).unwrap();
        assert!(source.token(later, &FailingRunner, &JsonPathQuery).is_err());
        assert_eq!(source.expiry(), expiry);
        assert_eq!(
            source.token(now, &FailingRunner, &JsonPathQuery).unwrap().unwrap().expose(),
            "first"
        );
    }
}
