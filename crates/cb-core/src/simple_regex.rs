//! Wildcard pattern to regular expression compiler
//!
//! URL rules are written with a small wildcard language:
//!
//! - `||` anchors the pattern to the start of a host name
//! - `|` anchors the pattern to the start or the end of the URL
//! - `*` matches any sequence of characters
//! - `^` matches a separator character or the end of the URL
//!
//! Safari compiles every `url-filter` into a DFA on the device, so the
//! produced expressions stay deliberately small: the host anchor accepts a
//! single optional subdomain level and the separator is an optional
//! character class.

/// Regex prefix replacing the `||` host anchor.
pub const URL_FILTER_REGEXP_START_URL: &str = r"^[htpsw]+:\/\/([a-z0-9-]+\.)?";
/// Regex replacing the `^` separator.
pub const URL_FILTER_REGEXP_SEPARATOR: &str = "[/:&?]?";
/// `url-filter` for rules matching every URL.
pub const URL_FILTER_ANY_URL: &str = r"^[htpsw]+:\/\/";
/// `url-filter` for websocket rules matching every URL.
pub const URL_FILTER_WS_ANY_URL: &str = r"^wss?:\/\/";
/// `url-filter` of cosmetic, script and scriptlet triggers.
pub const URL_FILTER_ANY: &str = ".*";

const MASK_START_URL: &str = "||";
const MASK_PIPE: &str = "|";
const MASK_SEPARATOR: &str = "^";
const MASK_ANY_SYMBOL: &str = "*";

const REGEX_ANY_SYMBOL: &str = ".*";
const REGEX_START_STRING: &str = "^";
const REGEX_END_STRING: &str = "$";

/// Characters escaped in the pattern. `*`, `|` and `^` are masks and are
/// handled separately.
const SPECIALS: &[char] = &['.', '+', '?', '$', '{', '}', '(', ')', '[', ']', '\\', '/'];

/// Compile a URL rule pattern (without its `$options`) into a regex source.
pub fn create_regex_text(pattern: &str) -> String {
    if pattern == MASK_START_URL || pattern == MASK_PIPE || pattern == MASK_ANY_SYMBOL {
        return REGEX_ANY_SYMBOL.to_string();
    }

    let escaped = escape_regexp(pattern);

    // A literal `|` is escaped everywhere except in the anchors at both ends
    let prefix_len = if escaped.starts_with(MASK_START_URL) {
        MASK_START_URL.len()
    } else if escaped.starts_with(MASK_PIPE) {
        MASK_PIPE.len()
    } else {
        0
    };
    let last = escaped
        .char_indices()
        .last()
        .map_or(escaped.len(), |(idx, _)| idx)
        .max(prefix_len);
    let mut regex = String::with_capacity(escaped.len() + 16);
    regex.push_str(&escaped[..prefix_len]);
    regex.push_str(&escaped[prefix_len..last].replace('|', r"\|"));
    regex.push_str(&escaped[last..]);

    let regex = regex
        .replace(MASK_ANY_SYMBOL, REGEX_ANY_SYMBOL)
        .replace(MASK_SEPARATOR, URL_FILTER_REGEXP_SEPARATOR);

    let mut regex = if let Some(rest) = regex.strip_prefix(MASK_START_URL) {
        format!("{}{}", URL_FILTER_REGEXP_START_URL, rest)
    } else if let Some(rest) = regex.strip_prefix(MASK_PIPE) {
        format!("{}{}", REGEX_START_STRING, rest)
    } else {
        regex
    };

    if regex.ends_with(MASK_PIPE) {
        regex.pop();
        regex.push_str(REGEX_END_STRING);
    }

    regex
}

fn escape_regexp(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() * 2);
    for c in text.chars() {
        if SPECIALS.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_anchor() {
        assert_eq!(
            create_regex_text("||example.org^"),
            r"^[htpsw]+:\/\/([a-z0-9-]+\.)?example\.org[/:&?]?"
        );
        assert_eq!(
            create_regex_text("||*/test-files/adguard.png"),
            r"^[htpsw]+:\/\/([a-z0-9-]+\.)?.*\/test-files\/adguard\.png"
        );
    }

    #[test]
    fn test_pipes() {
        assert_eq!(create_regex_text("|http"), "^http");
        assert_eq!(create_regex_text("|blob:"), "^blob:");
        assert_eq!(create_regex_text("/ads.js|"), r"\/ads\.js$");
        assert_eq!(create_regex_text("a|b"), r"a\|b");
    }

    #[test]
    fn test_any_symbol_masks() {
        assert_eq!(create_regex_text("||"), ".*");
        assert_eq!(create_regex_text("|"), ".*");
        assert_eq!(create_regex_text("*"), ".*");
        assert_eq!(create_regex_text(""), "");
        assert_eq!(create_regex_text("/banner/*/img^"), r"\/banner\/.*\/img[/:&?]?");
    }

    #[test]
    fn test_escapes_specials() {
        assert_eq!(create_regex_text("a+b?(c)"), r"a\+b\?\(c\)");
        assert_eq!(create_regex_text(".rocks^"), r"\.rocks[/:&?]?");
    }

    #[test]
    fn test_non_ascii_tail() {
        assert_eq!(create_regex_text("/путь"), r"\/путь");
    }
}
