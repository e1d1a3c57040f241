//! Domain utilities for rule conversion
//!
//! Safari triggers only accept ASCII host names, so every domain that
//! reaches a trigger goes through [`to_punycode`]. Domains written with a
//! wildcard top-level domain (`example.*`) are expanded against a fixed
//! table of popular TLDs because `if-domain` has no wildcard support.
//!
//! # Examples
//!
//! ```
//! use cb_core::domain::{resolve_tld_wildcards, to_punycode};
//!
//! assert_eq!(to_punycode("меил.рф"), "xn--e1agjb.xn--p1ai");
//!
//! let mut domains = vec!["example.*".to_string()];
//! resolve_tld_wildcards(&mut domains);
//! assert_eq!(domains[0], "example.com");
//! ```

// =============================================================================
// Punycode
// =============================================================================

/// Convert a (possibly internationalized) domain to its ASCII form.
///
/// ASCII input is returned unchanged. Input that cannot be converted is
/// returned as is.
pub fn to_punycode(domain: &str) -> String {
    if domain.is_ascii() {
        return domain.to_string();
    }

    match idna::domain_to_ascii(domain) {
        Ok(ascii) => ascii,
        Err(err) => {
            log::debug!("Unable to convert {} to punycode: {:?}", domain, err);
            domain.to_string()
        }
    }
}

/// Lower-case and punycode-encode a domain taken from a rule.
pub fn normalize_domain(domain: &str) -> String {
    to_punycode(&domain.to_lowercase())
}

// =============================================================================
// Top-Level Domain Wildcards
// =============================================================================

/// Popular top-level domains used to expand `example.*` domains.
///
/// The table order defines the output order of the expansion.
pub const TOP_LEVEL_DOMAINS: [&str; 100] = [
    "com", "org", "ru", "net", "de", "uk", "info", "fr", "jp", "br",
    "it", "pl", "in", "nl", "au", "es", "cn", "ca", "ch", "eu",
    "ir", "kr", "se", "be", "tr", "cz", "us", "mx", "vn", "gr",
    "ua", "tw", "ro", "dk", "za", "no", "ar", "at", "hu", "co",
    "me", "fi", "sk", "cl", "pt", "io", "biz", "id", "nz", "il",
    "ie", "kz", "tv", "pk", "my", "sg", "lt", "hk", "ph", "by",
    "rs", "bg", "si", "hr", "lv", "ee", "ae", "sa", "pe", "ng",
    "eg", "th", "ve", "az", "ge", "uz", "lk", "am", "ma", "ke",
    "is", "lu", "cc", "cy", "ba", "md", "mk", "al", "to", "ws",
    "ec", "do", "uy", "bd", "np", "tk", "ly", "la", "gg", "sh",
];

/// Expand every `name.*` entry in place into one entry per popular TLD.
///
/// Entries without a wildcard keep their position.
pub fn resolve_tld_wildcards(domains: &mut Vec<String>) {
    if !domains.iter().any(|d| d.ends_with(".*")) {
        return;
    }

    let source = std::mem::take(domains);
    for domain in source {
        match domain.strip_suffix(".*") {
            Some(name) => {
                domains.extend(TOP_LEVEL_DOMAINS.iter().map(|tld| format!("{}.{}", name, tld)));
            }
            None => domains.push(domain),
        }
    }
}

// =============================================================================
// Domain From Rule Text
// =============================================================================

/// Domain and trailing path extracted from the pattern of a URL rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleDomain {
    pub domain: String,
    pub path: Option<String>,
}

const DOMAIN_PREFIXES: [&str; 6] = ["http://www.", "https://www.", "http://", "https://", "||", "//"];

/// Split a URL rule pattern into its host part and the remaining path.
///
/// Scheme and `||` prefixes are skipped. The host ends at the first `/`, or
/// at the first `^` when there is no slash. The host is not validated.
pub fn split_pattern_domain(pattern: &str) -> (&str, Option<&str>) {
    let start = DOMAIN_PREFIXES
        .iter()
        .find(|prefix| pattern.starts_with(*prefix))
        .map_or(0, |prefix| prefix.len());

    let rest = &pattern[start..];
    match rest.find('/').or_else(|| rest.find('^')) {
        Some(idx) => (&rest[..idx], Some(&rest[idx..])),
        None => (rest, None),
    }
}

/// Extract the host name a URL rule pattern is anchored to.
///
/// Returns `None` when the candidate is not a plain host name.
pub fn parse_rule_domain(pattern: &str) -> Option<RuleDomain> {
    let (domain, path) = split_pattern_domain(pattern);
    if !is_valid_domain_name(domain) {
        return None;
    }

    Some(RuleDomain {
        domain: to_punycode(domain).to_lowercase(),
        path: path.map(str::to_string),
    })
}

/// Punycode-encode the host of a URL rule pattern, leaving the rest as is.
pub fn ascii_domain_pattern(pattern: &str) -> String {
    if pattern.is_ascii() {
        return pattern.to_string();
    }

    let (domain, _) = split_pattern_domain(pattern);
    if domain.is_empty() || domain.is_ascii() {
        return pattern.to_string();
    }
    pattern.replace(domain, &to_punycode(domain))
}

/// Check that `domain` looks like `label(.label)*.tld`.
///
/// Labels use ASCII letters, digits, `-` and `.`, must start and end with a
/// letter or digit, and the TLD has at least two letters.
pub fn is_valid_domain_name(domain: &str) -> bool {
    let Some(dot) = domain.rfind('.') else {
        return false;
    };
    let (head, tld) = (&domain[..dot], &domain[dot + 1..]);

    if tld.len() < 2 || !tld.bytes().all(|b| b.is_ascii_alphabetic() || b == b'-') {
        return false;
    }

    let bytes = head.as_bytes();
    match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) if bytes.len() >= 2 => {
            first.is_ascii_alphanumeric()
                && last.is_ascii_alphanumeric()
                && bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'-' || *b == b'.')
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_punycode() {
        assert_eq!(to_punycode("example.org"), "example.org");
        assert_eq!(to_punycode("меил.рф"), "xn--e1agjb.xn--p1ai");
        assert_eq!(normalize_domain("ExAmple.COM"), "example.com");
    }

    #[test]
    fn test_tld_table() {
        assert_eq!(TOP_LEVEL_DOMAINS[0], "com");
        assert_eq!(TOP_LEVEL_DOMAINS[1], "org");
        assert_eq!(TOP_LEVEL_DOMAINS[2], "ru");
        assert_eq!(TOP_LEVEL_DOMAINS[99], "sh");
    }

    #[test]
    fn test_resolve_tld_wildcards() {
        let mut domains = vec!["surge.*".to_string(), "example.org".to_string()];
        resolve_tld_wildcards(&mut domains);
        assert_eq!(domains.len(), 101);
        assert_eq!(domains[0], "surge.com");
        assert_eq!(domains[2], "surge.ru");
        assert_eq!(domains[99], "surge.sh");
        assert_eq!(domains[100], "example.org");

        let mut plain = vec!["a.com".to_string()];
        resolve_tld_wildcards(&mut plain);
        assert_eq!(plain, vec!["a.com"]);
    }

    #[test]
    fn test_parse_rule_domain() {
        let parsed = parse_rule_domain("||example.org^").unwrap();
        assert_eq!(parsed.domain, "example.org");
        assert_eq!(parsed.path.as_deref(), Some("^"));

        let parsed = parse_rule_domain("||hulu.com/page").unwrap();
        assert_eq!(parsed.domain, "hulu.com");
        assert_eq!(parsed.path.as_deref(), Some("/page"));

        let parsed = parse_rule_domain("https://www.Example.com").unwrap();
        assert_eq!(parsed.domain, "example.com");
        assert_eq!(parsed.path, None);

        assert!(parse_rule_domain("||*").is_none());
        assert!(parse_rule_domain("/banner/").is_none());
    }

    #[test]
    fn test_ascii_domain_pattern() {
        assert_eq!(ascii_domain_pattern("меил.рф"), "xn--e1agjb.xn--p1ai");
        assert_eq!(ascii_domain_pattern("||меил.рф^"), "||xn--e1agjb.xn--p1ai^");
        assert_eq!(ascii_domain_pattern("||example.org/путь"), "||example.org/путь");
        assert_eq!(ascii_domain_pattern("||example.org^"), "||example.org^");
    }

    #[test]
    fn test_is_valid_domain_name() {
        assert!(is_valid_domain_name("sub.example-site.com"));
        assert!(is_valid_domain_name("UpperCase.test"));
        assert!(!is_valid_domain_name("localhost"));
        assert!(!is_valid_domain_name("-bad.com"));
        assert!(!is_valid_domain_name("a.com"));
        assert!(!is_valid_domain_name("example.c0m"));
    }
}
