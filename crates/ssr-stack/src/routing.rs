//! Distribution routing table.
//!
//! The CDN evaluates this table per request; the orchestrator only
//! declares it. `RoutingTable::resolve` mirrors the CDN's matching so the
//! declared behavior for a path can be checked locally.

use std::cmp::Reverse;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::EdgeEventType;
use crate::error::{Result, StackError};

/// Longest path pattern CloudFront accepts.
pub const MAX_PATTERN_LEN: usize = 255;

/// A CloudFront cache-behavior path pattern.
///
/// `*` matches any sequence of characters, `?` exactly one. Matching is
/// case-sensitive and a leading `/` is optional on both sides.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PathPattern(String);

impl PathPattern {
    /// Parse and validate a pattern.
    pub fn parse(pattern: &str) -> Result<Self> {
        let invalid = |reason: &str| StackError::InvalidPathPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        if pattern.is_empty() {
            return Err(invalid("pattern is empty"));
        }
        if pattern.len() > MAX_PATTERN_LEN {
            return Err(invalid("pattern is longer than 255 characters"));
        }
        if pattern.chars().any(|c| !c.is_ascii_graphic()) {
            return Err(invalid("pattern contains whitespace or non-ASCII characters"));
        }

        let normalized = pattern.trim_start_matches('/');
        if normalized.is_empty() || normalized.chars().all(|c| c == '*') {
            return Err(invalid("matches every path; that is the default behavior"));
        }

        Ok(Self(normalized.to_string()))
    }

    /// Pattern text without a leading slash.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Literal characters before the first wildcard.
    pub fn literal_prefix(&self) -> &str {
        let end = self.0.find(|c: char| c == '*' || c == '?').unwrap_or(self.0.len());
        &self.0[..end]
    }

    /// Sort key: longer literal prefix first, then more literal characters.
    fn specificity(&self) -> (usize, usize) {
        let literals = self.0.chars().filter(|c| *c != '*' && *c != '?').count();
        (self.literal_prefix().len(), literals)
    }

    /// Check whether a request path matches.
    pub fn matches(&self, path: &str) -> bool {
        let path = path.split('?').next().unwrap_or("");
        let path = path.trim_start_matches('/');
        wildcard_match(self.0.as_bytes(), path.as_bytes())
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PathPattern {
    type Error = StackError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<PathPattern> for String {
    fn from(pattern: PathPattern) -> Self {
        pattern.0
    }
}

fn wildcard_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == b'?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == b'*' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            t = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}

/// Reference to an explicit function version.
///
/// Replicated edge functions cannot be attached through a mutable alias,
/// so behaviors always point at a concrete version resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionVersionRef {
    /// Logical id of the version resource.
    pub logical_id: String,
    /// Code hash the version was published from.
    pub code_hash: String,
}

impl fmt::Display for FunctionVersionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.logical_id)
    }
}

/// A function attached to a behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeFunctionAssociation {
    /// Event the function runs on.
    pub event_type: EdgeEventType,
    /// Function version.
    pub version: FunctionVersionRef,
}

/// Per-path routing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Behavior {
    /// Origin id requests are forwarded to.
    pub origin: String,
    /// Functions attached to the behavior.
    #[serde(default)]
    pub edge_functions: Vec<EdgeFunctionAssociation>,
}

impl Behavior {
    /// Behavior served straight from an origin.
    pub fn origin(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            edge_functions: Vec::new(),
        }
    }

    /// Attach a function at an event.
    pub fn with_function(mut self, event_type: EdgeEventType, version: FunctionVersionRef) -> Self {
        self.edge_functions.push(EdgeFunctionAssociation {
            event_type,
            version,
        });
        self
    }

    /// Whether any function runs for this behavior.
    pub fn invokes_function(&self) -> bool {
        !self.edge_functions.is_empty()
    }
}

/// Behavior selected for a request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteMatch<'a> {
    /// Matching override pattern, `None` for the default behavior.
    pub pattern: Option<&'a PathPattern>,
    /// Selected behavior.
    pub behavior: &'a Behavior,
}

impl RouteMatch<'_> {
    /// Whether the default behavior was selected.
    pub fn is_default(&self) -> bool {
        self.pattern.is_none()
    }
}

/// One default behavior plus path-pattern overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTable {
    default: Behavior,
    overrides: Vec<(PathPattern, Behavior)>,
}

impl RoutingTable {
    /// Create a table with only a default behavior.
    pub fn new(default: Behavior) -> Self {
        Self {
            default,
            overrides: Vec::new(),
        }
    }

    /// Add an override; duplicate patterns are rejected.
    ///
    /// Overrides stay ordered most specific first, ties in insertion order.
    pub fn add_override(&mut self, pattern: PathPattern, behavior: Behavior) -> Result<()> {
        if self.overrides.iter().any(|(p, _)| *p == pattern) {
            return Err(StackError::InvalidPathPattern {
                pattern: pattern.to_string(),
                reason: "pattern is declared more than once".to_string(),
            });
        }
        self.overrides.push((pattern, behavior));
        self.overrides
            .sort_by_key(|(p, _)| Reverse(p.specificity()));
        Ok(())
    }

    /// Builder form of `add_override`.
    pub fn with_override(mut self, pattern: PathPattern, behavior: Behavior) -> Result<Self> {
        self.add_override(pattern, behavior)?;
        Ok(self)
    }

    /// The default behavior.
    pub fn default_behavior(&self) -> &Behavior {
        &self.default
    }

    /// Overrides in precedence order.
    pub fn overrides(&self) -> &[(PathPattern, Behavior)] {
        &self.overrides
    }

    /// Select the behavior for a request path.
    pub fn resolve(&self, path: &str) -> RouteMatch<'_> {
        self.overrides
            .iter()
            .find(|(pattern, _)| pattern.matches(path))
            .map(|(pattern, behavior)| RouteMatch {
                pattern: Some(pattern),
                behavior,
            })
            .unwrap_or(RouteMatch {
                pattern: None,
                behavior: &self.default,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version() -> FunctionVersionRef {
        FunctionVersionRef {
            logical_id: "EdgeFunctionCurrentVersionabcd1234".into(),
            code_hash: "abcd1234".into(),
        }
    }

    fn nuxt_table() -> RoutingTable {
        RoutingTable::new(
            Behavior::origin("Origin1").with_function(EdgeEventType::OriginRequest, version()),
        )
        .with_override(PathPattern::parse("_nuxt/*").unwrap(), Behavior::origin("Origin1"))
        .unwrap()
    }

    #[test]
    fn test_static_prefix_served_from_storage() {
        let table = nuxt_table();
        let route = table.resolve("_nuxt/app.js");
        assert!(!route.is_default());
        assert!(!route.behavior.invokes_function());

        assert!(!table.resolve("/_nuxt/entry.123.css").behavior.invokes_function());
        assert!(!table.resolve("_nuxt/").behavior.invokes_function());
    }

    #[test]
    fn test_other_paths_invoke_function() {
        let table = nuxt_table();
        for path in ["/assets/logo.png", "/", "/products/42", "/_nuxtx/app.js", "/api/_nuxt/a"] {
            let route = table.resolve(path);
            assert!(route.is_default(), "{}", path);
            assert!(route.behavior.invokes_function(), "{}", path);
        }
    }

    #[test]
    fn test_matching_is_case_sensitive_and_ignores_query() {
        let table = nuxt_table();
        assert!(table.resolve("/_NUXT/app.js").is_default());
        assert!(!table.resolve("/_nuxt/app.js?v=2").is_default());
    }

    #[test]
    fn test_most_specific_override_wins() {
        let table = RoutingTable::new(Behavior::origin("Fn"))
            .with_override(PathPattern::parse("static/*").unwrap(), Behavior::origin("Short"))
            .unwrap()
            .with_override(
                PathPattern::parse("static/images/*").unwrap(),
                Behavior::origin("Long"),
            )
            .unwrap();

        assert_eq!(table.overrides()[0].0.as_str(), "static/images/*");
        assert_eq!(table.resolve("/static/images/a.png").behavior.origin, "Long");
        assert_eq!(table.resolve("/static/app.css").behavior.origin, "Short");
        assert_eq!(table.resolve("/index.html").behavior.origin, "Fn");
    }

    #[test]
    fn test_duplicate_override_rejected() {
        let mut table = nuxt_table();
        let err = table
            .add_override(PathPattern::parse("/_nuxt/*").unwrap(), Behavior::origin("x"))
            .unwrap_err();
        assert!(matches!(err, StackError::InvalidPathPattern { .. }));
        assert_eq!(table.overrides().len(), 1);
    }

    #[test]
    fn test_pattern_validation() {
        assert!(PathPattern::parse("").is_err());
        assert!(PathPattern::parse("*").is_err());
        assert!(PathPattern::parse("/*").is_err());
        assert!(PathPattern::parse("_nuxt /*").is_err());
        assert!(PathPattern::parse(&"a".repeat(256)).is_err());
        assert_eq!(PathPattern::parse("/_nuxt/*").unwrap().as_str(), "_nuxt/*");
    }

    #[test]
    fn test_wildcards() {
        let pattern = PathPattern::parse("images/*.jp?g").unwrap();
        assert!(pattern.matches("/images/a/b.jpeg"));
        assert!(pattern.matches("images/x.jpgg"));
        assert!(!pattern.matches("images/x.png"));
        assert_eq!(pattern.literal_prefix(), "images/");
    }

    #[test]
    fn test_pattern_serde() {
        let pattern: PathPattern = serde_json::from_str("\"/_nuxt/*\"").unwrap();
        assert_eq!(pattern.as_str(), "_nuxt/*");
        assert!(serde_json::from_str::<PathPattern>("\"*\"").is_err());
    }
}
