//! Host allow-list.
//!
//! Hosts matching the allow-list may be fetched over plain `http` and may
//! resolve to private addresses. Everything else is default-deny.
//!
//! # Pattern forms
//! - `cdn.example.com`: exact host (case-insensitive)
//! - `*.example.com`: any subdomain, not the apex
//! - `.example.com`: the apex and any subdomain
//! - `127.0.0.1`, `::1`: exact address literal

use std::fmt;

/// A single compiled allow-list entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostPattern {
    Exact(String),
    Wildcard(String),
    Suffix(String),
}

impl HostPattern {
    /// Compile a configured pattern. Returns a reason on malformed input.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let pattern = normalize_host(raw);
        if pattern.is_empty() {
            return Err("empty pattern".to_string());
        }
        if pattern.contains("://") || pattern.contains('/') {
            return Err(format!("'{raw}' must be a host, not a URL"));
        }
        if pattern.chars().any(|c| c.is_whitespace() || c.is_control() || c == '@') {
            return Err(format!("'{raw}' contains invalid characters"));
        }

        if let Some(suffix) = pattern.strip_prefix("*.") {
            if suffix.is_empty() || suffix.contains('*') || suffix.starts_with('.') {
                return Err(format!("'{raw}' has an empty or invalid wildcard suffix"));
            }
            return Ok(HostPattern::Wildcard(suffix.to_string()));
        }
        if let Some(suffix) = pattern.strip_prefix('.') {
            if suffix.is_empty() || suffix.contains('*') || suffix.starts_with('.') {
                return Err(format!("'{raw}' has an empty or invalid suffix"));
            }
            return Ok(HostPattern::Suffix(suffix.to_string()));
        }
        if pattern.contains('*') {
            return Err(format!("'{raw}' may only use a leading '*.' wildcard"));
        }
        Ok(HostPattern::Exact(pattern))
    }

    /// Match an already-normalized host.
    fn matches(&self, host: &str) -> bool {
        match self {
            HostPattern::Exact(expected) => host == expected,
            HostPattern::Wildcard(suffix) => host
                .strip_suffix(suffix.as_str())
                .is_some_and(|prefix| prefix.len() > 1 && prefix.ends_with('.')),
            HostPattern::Suffix(suffix) => {
                host == suffix
                    || host
                        .strip_suffix(suffix.as_str())
                        .is_some_and(|prefix| prefix.ends_with('.'))
            }
        }
    }
}

impl fmt::Display for HostPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostPattern::Exact(host) => write!(f, "{host}"),
            HostPattern::Wildcard(suffix) => write!(f, "*.{suffix}"),
            HostPattern::Suffix(suffix) => write!(f, ".{suffix}"),
        }
    }
}

/// Ordered, read-only set of trusted host patterns.
///
/// Built once at startup and shared behind an `Arc`; never mutated at
/// request time.
#[derive(Debug, Clone, Default)]
pub struct AllowListPolicy {
    patterns: Vec<HostPattern>,
}

impl AllowListPolicy {
    /// Compile all configured patterns, collecting every failure.
    pub fn from_patterns<S: AsRef<str>>(raw: &[S]) -> Result<Self, Vec<String>> {
        let mut patterns = Vec::with_capacity(raw.len());
        let mut errors = Vec::new();
        for entry in raw {
            match HostPattern::parse(entry.as_ref()) {
                Ok(pattern) => patterns.push(pattern),
                Err(e) => errors.push(e),
            }
        }
        if errors.is_empty() {
            Ok(Self { patterns })
        } else {
            Err(errors)
        }
    }

    /// Whether `host` (as it appears in a URL) is allow-listed.
    pub fn is_allowed(&self, host: &str) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        let host = normalize_host(host);
        self.patterns.iter().any(|p| p.matches(&host))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Lowercase, strip IPv6 brackets and a trailing root dot.
pub(crate) fn normalize_host(host: &str) -> String {
    let host = host.trim();
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    host.trim_end_matches('.').to_ascii_lowercase()
}
