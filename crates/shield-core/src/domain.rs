//! Domain name canonicalization and matching.
//!
//! Every domain that enters the system passes through [`canonicalize`]
//! exactly once, at the boundary. All internal storage and comparison
//! operates on canonical form: lower-case, no scheme, no path, no trailing
//! dot, no leading `www.`.
//!
//! Matching is subdomain-inclusive: a query `q` matches a stored pattern `p`
//! iff `q == p` or `q` ends with `"." + p`.

use thiserror::Error;

/// Errors from domain validation.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The input is empty after stripping scheme, path, and whitespace.
    #[error("empty domain")]
    Empty,

    /// The input contains whitespace.
    #[error("domain contains whitespace: {0:?}")]
    Whitespace(String),

    /// The input has no dot, so it cannot be a public host name.
    #[error("not a domain name (no dot): {0:?}")]
    NoDot(String),

    /// A label contains a character outside letters, digits, and hyphens.
    #[error("invalid character in domain: {0:?}")]
    InvalidCharacter(String),

    /// A label is empty or starts/ends with a hyphen.
    #[error("malformed label in domain: {0:?}")]
    MalformedLabel(String),
}

/// Canonicalizes a raw domain input.
///
/// Strips an optional scheme (`https://`, `http://`, anything up to `://`),
/// a path/query suffix, a port, a trailing dot, and a leading `www.`;
/// lower-cases the rest and validates that what remains is a plausible
/// host name (LDH labels separated by dots, at least one dot).
///
/// # Errors
///
/// Returns a [`DomainError`] describing the first validation failure.
pub fn canonicalize(input: &str) -> Result<String, DomainError> {
    let trimmed = input.trim();
    if trimmed.chars().any(char::is_whitespace) {
        return Err(DomainError::Whitespace(input.to_string()));
    }

    let mut host = trimmed;
    if let Some((_, rest)) = host.split_once("://") {
        host = rest;
    }
    if let Some((h, _)) = host.split_once('/') {
        host = h;
    }
    if let Some((h, _)) = host.split_once('?') {
        host = h;
    }
    if let Some((h, _)) = host.split_once(':') {
        host = h;
    }

    let mut name = host.trim_end_matches('.').to_ascii_lowercase();
    if let Some(stripped) = name.strip_prefix("www.") {
        name = stripped.to_string();
    }

    if name.is_empty() {
        return Err(DomainError::Empty);
    }
    if !name.contains('.') {
        return Err(DomainError::NoDot(input.to_string()));
    }

    for label in name.split('.') {
        if label.is_empty() {
            return Err(DomainError::MalformedLabel(input.to_string()));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(DomainError::MalformedLabel(input.to_string()));
        }
        if !label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(DomainError::InvalidCharacter(input.to_string()));
        }
    }

    Ok(name)
}

/// Subdomain-inclusive match of a query against a stored pattern.
///
/// Both arguments are expected in canonical form.
#[must_use]
pub fn domain_matches(query: &str, pattern: &str) -> bool {
    if query == pattern {
        return true;
    }
    query.len() > pattern.len()
        && query.ends_with(pattern)
        && query.as_bytes()[query.len() - pattern.len() - 1] == b'.'
}

/// Expands a canonical domain into the set of host names the enforcement
/// surfaces must cover.
///
/// Every domain yields itself plus its `www.` variant. A fixed, closed
/// table adds the well-known alternate hosts of the largest services;
/// outside the table nothing else is emitted.
#[must_use]
pub fn expand_variants(domain: &str) -> Vec<String> {
    let mut names = vec![domain.to_string(), format!("www.{domain}")];

    match domain {
        "youtube.com" => {
            names.push("m.youtube.com".to_string());
            names.push("music.youtube.com".to_string());
            names.push("youtu.be".to_string());
            names.push("youtube-nocookie.com".to_string());
        },
        "twitter.com" | "x.com" => {
            names.push(format!("mobile.{domain}"));
        },
        "reddit.com" => {
            names.push("old.reddit.com".to_string());
            names.push("new.reddit.com".to_string());
            names.push("i.reddit.com".to_string());
        },
        "facebook.com" => {
            names.push("m.facebook.com".to_string());
            names.push("mobile.facebook.com".to_string());
            names.push("touch.facebook.com".to_string());
            names.push("web.facebook.com".to_string());
        },
        "instagram.com" => {
            names.push("m.instagram.com".to_string());
            names.push("i.instagram.com".to_string());
            names.push("graph.instagram.com".to_string());
        },
        "tiktok.com" => {
            names.push("m.tiktok.com".to_string());
            names.push("vm.tiktok.com".to_string());
        },
        _ => {},
    }

    names.dedup();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_strips_scheme_path_and_www() {
        assert_eq!(
            canonicalize("https://www.Twitter.com/home").unwrap(),
            "twitter.com"
        );
        assert_eq!(canonicalize("reddit.com.").unwrap(), "reddit.com");
        assert_eq!(canonicalize("news.ycombinator.com").unwrap(), "news.ycombinator.com");
        assert_eq!(canonicalize("example.com:8080").unwrap(), "example.com");
        assert_eq!(canonicalize("http://x.com?ref=1").unwrap(), "x.com");
    }

    #[test]
    fn canonicalize_rejects_garbage() {
        assert!(canonicalize("").is_err());
        assert!(canonicalize("localhost").is_err());
        assert!(canonicalize("has space.com").is_err());
        assert!(canonicalize("bad_char.com").is_err());
        assert!(canonicalize("-leading.com").is_err());
        assert!(canonicalize("double..dot.com").is_err());
    }

    #[test]
    fn matching_is_subdomain_inclusive() {
        assert!(domain_matches("twitter.com", "twitter.com"));
        assert!(domain_matches("m.twitter.com", "twitter.com"));
        assert!(domain_matches("a.b.twitter.com", "twitter.com"));
        assert!(!domain_matches("nottwitter.com", "twitter.com"));
        assert!(!domain_matches("twitter.com.evil.org", "twitter.com"));
        assert!(!domain_matches("twitter.com", "m.twitter.com"));
    }

    #[test]
    fn variants_cover_known_services() {
        let names = expand_variants("youtube.com");
        for expected in [
            "youtube.com",
            "www.youtube.com",
            "m.youtube.com",
            "music.youtube.com",
            "youtu.be",
            "youtube-nocookie.com",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }

        let names = expand_variants("x.com");
        assert!(names.iter().any(|n| n == "mobile.x.com"));
    }

    #[test]
    fn variants_outside_table_are_bare_plus_www() {
        assert_eq!(
            expand_variants("example.com"),
            vec!["example.com".to_string(), "www.example.com".to_string()]
        );
    }

    #[test]
    fn tiktok_www_not_duplicated() {
        let names = expand_variants("tiktok.com");
        let www_count = names.iter().filter(|n| *n == "www.tiktok.com").count();
        assert_eq!(www_count, 1);
        assert!(names.iter().any(|n| n == "vm.tiktok.com"));
    }
}
