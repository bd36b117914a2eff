//! Path queries over generic document trees.

use serde_json::Value;
use serde_json_path::JsonPath;

use crate::error::{CredentialError, Result};

/// Evaluates a path expression against a document tree.
///
/// Returns the first matching node, or `None` when nothing matches.
pub trait PathQuery: Send + Sync {
    fn query(&self, document: &Value, expression: &str) -> Result<Option<Value>>;
}

/// [`PathQuery`] backed by RFC 9535 JSONPath.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPathQuery;

impl PathQuery for JsonPathQuery {
    fn query(&self, document: &Value, expression: &str) -> Result<Option<Value>> {
        let path = JsonPath::parse(expression).map_err(|e| CredentialError::InvalidPath {
            expression: expression.to_string(),
            message: e.to_string(),
        })?;
        Ok(path.query(document).first().cloned())
    }
}

/// Turn a kubectl-style template key into a rooted path expression.
///
/// `{.credential.access_token}` becomes `$.credential.access_token`.
/// Dotted names that are not valid shorthand, such as `access-token`, are
/// rewritten to bracket form: `{.access-token}` becomes `$['access-token']`.
/// Already-rooted expressions pass through unchanged.
pub fn normalize_template_path(expression: &str) -> String {
    let trimmed = expression.trim();
    let inner = trimmed
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .unwrap_or(trimmed)
        .trim();

    if inner.starts_with('$') {
        return inner.to_string();
    }
    // Quoted names and recursive descent are left to the parser as written.
    if inner.contains(['\'', '"']) || inner.contains("..") {
        return match inner.chars().next() {
            Some('.' | '[') => format!("${inner}"),
            _ => format!("$.{inner}"),
        };
    }

    let mut path = String::from("$");
    for segment in inner.strip_prefix('.').unwrap_or(inner).split('.') {
        let (name, rest) = segment.split_at(segment.find('[').unwrap_or(segment.len()));
        if name == "*" || is_shorthand_name(name) {
            path.push('.');
            path.push_str(name);
        } else if !name.is_empty() {
            path.push_str(&format!("['{name}']"));
        }
        path.push_str(rest);
    }
    path
}

// RFC 9535 member-name-shorthand: ALPHA / "_" / non-ASCII, then also DIGIT.
fn is_shorthand_name(name: &str) -> bool {
    let mut chars = name.chars();
    let valid_first = |c: char| c.is_ascii_alphabetic() || c == '_' || !c.is_ascii();
    chars.next().is_some_and(valid_first)
        && chars.all(|c| valid_first(c) || c.is_ascii_digit())
}
