//! Routing rules derived from an application's handler declarations
//!
//! Everything here is pure: handlers in, ordered rules out.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Path claimed by the catch-all rule
pub const ROOT_PATH: &str = "/";

/// Transport a handler may be served over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurePolicy {
    Always,
    Never,
    #[default]
    #[serde(alias = "optional")]
    Either,
}

impl SecurePolicy {
    /// Whether a handler with this policy is routed on the `scheme` host
    pub fn allows(self, scheme: Scheme) -> bool {
        !matches!(
            (self, scheme),
            (SecurePolicy::Always, Scheme::Http) | (SecurePolicy::Never, Scheme::Https)
        )
    }
}

/// Characters that would end or extend an nginx directive
fn is_config_syntax(c: char) -> bool {
    c.is_whitespace()
        || c.is_control()
        || matches!(c, '{' | '}' | ';' | '"' | '\'' | '\\' | '#')
}

/// Reason a value can't be spliced into the proxy config as one token
pub(crate) fn config_token_error(value: &str) -> Option<&'static str> {
    if value.is_empty() {
        Some("must not be empty")
    } else if value.chars().any(is_config_syntax) {
        Some("must not contain whitespace, quotes, braces, ';' or '#'")
    } else {
        None
    }
}

/// Reason `path` can't be used as a `location` prefix
pub(crate) fn location_path_error(path: &str) -> Option<&'static str> {
    if !path.starts_with('/') {
        return Some("url must start with '/'");
    }
    config_token_error(path)
}

/// What serves requests matched by a handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HandlerKind {
    /// Files served straight from a directory of the deployed application
    Static {
        dir: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expiration: Option<String>,
    },
    /// Forwarded to the application backend pool
    Application,
    /// Forwarded to the platform upload-handling backend
    Upload,
}

/// A declared URL-path rule of an application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handler {
    pub url: String,

    #[serde(flatten)]
    pub kind: HandlerKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<SecurePolicy>,
}

impl Handler {
    pub fn application(url: impl Into<String>, secure: Option<SecurePolicy>) -> Self {
        Self {
            url: url.into(),
            kind: HandlerKind::Application,
            secure,
        }
    }

    pub fn static_dir(
        url: impl Into<String>,
        dir: impl Into<String>,
        secure: Option<SecurePolicy>,
    ) -> Self {
        Self {
            url: url.into(),
            kind: HandlerKind::Static {
                dir: dir.into(),
                expiration: None,
            },
            secure,
        }
    }

    /// Declared policy, `Either` when none was given
    pub fn policy(&self) -> SecurePolicy {
        self.secure.unwrap_or_default()
    }
}

/// Handlers split by secure policy, declaration order preserved
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SecurePartition<'a> {
    pub always_secure: Vec<&'a Handler>,
    pub never_secure: Vec<&'a Handler>,
    pub either: Vec<&'a Handler>,
}

impl SecurePartition<'_> {
    pub fn len(&self) -> usize {
        self.always_secure.len() + self.never_secure.len() + self.either.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Partition view of `handlers` by secure policy.
///
/// [`build_location_rules`] selects from the same groups through
/// [`SecurePolicy::allows`]: HTTP gets `never_secure` and `either`, HTTPS
/// gets `always_secure` and `either`.
pub fn classify(handlers: &[Handler]) -> SecurePartition<'_> {
    let mut partition = SecurePartition::default();
    for handler in handlers {
        match handler.policy() {
            SecurePolicy::Always => partition.always_secure.push(handler),
            SecurePolicy::Never => partition.never_secure.push(handler),
            SecurePolicy::Either => partition.either.push(handler),
        }
    }
    partition
}

/// Virtual host a rule set is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Http => write!(f, "http"),
            Scheme::Https => write!(f, "https"),
        }
    }
}

/// Where a matched request goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upstream {
    StaticFiles {
        dir: String,
        expiration: Option<String>,
    },
    AppBackend,
    UploadBackend,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    pub path_pattern: String,
    pub target: Upstream,
    pub rank: usize,
}

impl RouteRule {
    pub fn claims_root(&self) -> bool {
        self.path_pattern == ROOT_PATH
    }
}

impl From<&Handler> for Upstream {
    fn from(handler: &Handler) -> Self {
        match &handler.kind {
            HandlerKind::Static { dir, expiration } => Upstream::StaticFiles {
                dir: dir.clone(),
                expiration: expiration.clone(),
            },
            HandlerKind::Application => Upstream::AppBackend,
            HandlerKind::Upload => Upstream::UploadBackend,
        }
    }
}

/// Ordered rules for one virtual host.
///
/// Declared handlers come first, in order; a catch-all rule to the
/// application backend closes the list unless a handler already claims `/`.
pub fn build_location_rules(handlers: &[Handler], scheme: Scheme) -> Vec<RouteRule> {
    let mut rules: Vec<RouteRule> = handlers
        .iter()
        .filter(|handler| handler.policy().allows(scheme))
        .enumerate()
        .map(|(rank, handler)| RouteRule {
            path_pattern: handler.url.clone(),
            target: Upstream::from(handler),
            rank,
        })
        .collect();

    if !rules.iter().any(RouteRule::claims_root) {
        rules.push(RouteRule {
            path_pattern: ROOT_PATH.to_string(),
            target: Upstream::AppBackend,
            rank: rules.len(),
        });
    }

    rules
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_handlers() -> Vec<Handler> {
        vec![
            Handler::application("/admin", Some(SecurePolicy::Always)),
            Handler::static_dir("/static", "static", None),
            Handler::application("/feeds", Some(SecurePolicy::Never)),
            Handler::static_dir("/images", "img", Some(SecurePolicy::Either)),
        ]
    }

    fn paths(rules: &[RouteRule]) -> Vec<&str> {
        rules.iter().map(|r| r.path_pattern.as_str()).collect()
    }

    #[test]
    fn test_classify_is_exhaustive_and_disjoint() {
        let handlers = sample_handlers();
        let partition = classify(&handlers);

        assert_eq!(partition.len(), handlers.len());
        assert_eq!(partition.always_secure.len(), 1);
        assert_eq!(partition.never_secure.len(), 1);
        assert_eq!(partition.either.len(), 2);
        assert_eq!(partition.either[0].url, "/static");
        for handler in &handlers {
            let hits = [
                &partition.always_secure,
                &partition.never_secure,
                &partition.either,
            ]
            .iter()
            .filter(|set| set.iter().any(|h| std::ptr::eq(*h, handler)))
            .count();
            assert_eq!(hits, 1, "{} must land in exactly one set", handler.url);
        }
    }

    #[test]
    fn test_rules_follow_partition() {
        let handlers = sample_handlers();
        let partition = classify(&handlers);

        let https: Vec<&str> = partition
            .always_secure
            .iter()
            .chain(&partition.either)
            .map(|h| h.url.as_str())
            .collect();
        let rules = build_location_rules(&handlers, Scheme::Https);
        for url in https {
            assert!(rules.iter().any(|r| r.path_pattern == url), "{url} missing on https");
        }
        for handler in &partition.never_secure {
            assert!(!handler.policy().allows(Scheme::Https));
            assert!(handler.policy().allows(Scheme::Http));
        }
    }

    #[test]
    fn test_location_path_error() {
        assert_eq!(location_path_error("/static/css"), None);
        assert_eq!(location_path_error("/_ah/login"), None);
        assert!(location_path_error("admin").is_some());
        for path in [
            "/x { return 200; } location /y",
            "/a b",
            "/a;",
            "/a\"b",
            "/a#",
            "/a\n",
        ] {
            assert!(location_path_error(path).is_some(), "{path:?} should be rejected");
        }
    }

    #[test]
    fn test_classify_empty() {
        assert!(classify(&[]).is_empty());
    }

    #[test]
    fn test_http_rules_skip_always_secure() {
        let rules = build_location_rules(&sample_handlers(), Scheme::Http);
        assert_eq!(paths(&rules), vec!["/static", "/feeds", "/images", "/"]);
        assert_eq!(rules.last().unwrap().target, Upstream::AppBackend);
        assert_eq!(rules.iter().map(|r| r.rank).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_https_rules_skip_never_secure() {
        let rules = build_location_rules(&sample_handlers(), Scheme::Https);
        assert_eq!(paths(&rules), vec!["/admin", "/static", "/images", "/"]);
    }

    #[test]
    fn test_explicit_root_suppresses_default() {
        let handlers = vec![
            Handler::static_dir("/", "public", None),
            Handler::application("/api", None),
        ];
        let rules = build_location_rules(&handlers, Scheme::Http);

        assert_eq!(paths(&rules), vec!["/", "/api"]);
        assert!(matches!(rules[0].target, Upstream::StaticFiles { .. }));
    }

    #[test]
    fn test_root_claimed_only_on_one_scheme() {
        let handlers = vec![Handler::application("/", Some(SecurePolicy::Always))];

        let https = build_location_rules(&handlers, Scheme::Https);
        let http = build_location_rules(&handlers, Scheme::Http);

        assert_eq!(https.len(), 1);
        assert_eq!(paths(&http), vec!["/"]);
        assert_eq!(http[0].target, Upstream::AppBackend);
    }

    #[test]
    fn test_handler_deserializes_with_default_policy() {
        let handler: Handler = serde_json::from_value(serde_json::json!({
            "url": "/css",
            "kind": "static",
            "dir": "stylesheets",
            "expiration": "1d"
        }))
        .unwrap();

        assert_eq!(handler.policy(), SecurePolicy::Either);
        assert_eq!(
            Upstream::from(&handler),
            Upstream::StaticFiles {
                dir: "stylesheets".to_string(),
                expiration: Some("1d".to_string()),
            }
        );
    }
}
