//! String helpers for rule text processing
//!
//! Filter rules use a backslash to escape their own delimiters (`\,` inside
//! option lists, `\$` inside URL patterns), so plain `str::split` is not
//! enough for them.

/// Split `text` by `delimiter`, honouring `escape` in front of a delimiter.
///
/// An escaped delimiter is kept in the token without its escape character.
/// A delimiter at the very start of the text is dropped. Empty tokens are
/// skipped unless `preserve_all_tokens` is set.
pub fn split_by_delimiter_with_escape(
    text: &str,
    delimiter: char,
    escape: char,
    preserve_all_tokens: bool,
) -> Vec<String> {
    let mut parts = Vec::new();
    if text.is_empty() {
        return parts;
    }

    let mut current = String::new();
    let mut prev: Option<char> = None;
    for (idx, c) in text.char_indices() {
        if c == delimiter {
            if idx == 0 {
                // Leading delimiter is ignored
            } else if prev == Some(escape) {
                current.pop();
                current.push(c);
            } else if preserve_all_tokens || !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
        prev = Some(c);
    }

    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Find the last occurrence of `needle` that is not preceded by `escape`,
/// looking only at byte positions `>= min_index` and below the last byte.
///
/// The final byte is excluded because a trailing delimiter never separates
/// anything.
pub fn find_last_unescaped(text: &str, needle: u8, escape: u8, min_index: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.len() < 2 {
        return None;
    }

    let mut idx = bytes.len() - 2;
    loop {
        if idx < min_index {
            return None;
        }
        if bytes[idx] == needle && (idx == 0 || bytes[idx - 1] != escape) {
            return Some(idx);
        }
        if idx == 0 {
            return None;
        }
        idx -= 1;
    }
}

/// Split `text` by `delimiter` occurring outside of `quote`-delimited runs.
///
/// Quotes are kept in the resulting parts; the parts are trimmed and empty
/// ones dropped.
pub fn split_outside_quotes(text: &str, delimiter: char, quote: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;

    for (idx, c) in text.char_indices() {
        if c == quote {
            in_quotes = !in_quotes;
        } else if c == delimiter && !in_quotes {
            parts.push(&text[start..idx]);
            start = idx + c.len_utf8();
        }
    }
    parts.push(&text[start..]);

    parts
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect()
}

/// Read a `quote`-delimited token starting at the opening quote of `text`.
///
/// A quote preceded by a backslash does not terminate the token; backslashes
/// are kept verbatim. Returns the token body and the rest of the text after
/// the closing quote.
pub fn read_quoted(text: &str) -> Option<(&str, &str)> {
    let mut chars = text.char_indices();
    let (_, quote) = chars.next()?;
    if quote != '\'' && quote != '"' {
        return None;
    }

    let mut escaped = false;
    for (idx, c) in chars {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Some((&text[1..idx], &text[idx + 1..]));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_with_escape() {
        assert_eq!(
            split_by_delimiter_with_escape("image,domain=a.com|b.com", ',', '\\', false),
            vec!["image", "domain=a.com|b.com"]
        );
        assert_eq!(
            split_by_delimiter_with_escape("csp=a\\,b,script", ',', '\\', false),
            vec!["csp=a,b", "script"]
        );
        assert_eq!(split_by_delimiter_with_escape(",a,,b", ',', '\\', false), vec!["a", "b"]);
        assert_eq!(split_by_delimiter_with_escape("a,,b", ',', '\\', true), vec!["a", "", "b"]);
        assert!(split_by_delimiter_with_escape("", ',', '\\', false).is_empty());
    }

    #[test]
    fn test_find_last_unescaped() {
        assert_eq!(find_last_unescaped("||ads.com^$image", b'$', b'\\', 0), Some(10));
        assert_eq!(find_last_unescaped("a\\$b", b'$', b'\\', 0), None);
        assert_eq!(find_last_unescaped("a$b$c", b'$', b'\\', 0), Some(3));
        assert_eq!(find_last_unescaped("@@$image", b'$', b'\\', 2), Some(2));
        assert_eq!(find_last_unescaped("abc$", b'$', b'\\', 0), None);
        assert_eq!(find_last_unescaped("$", b'$', b'\\', 0), None);
    }

    #[test]
    fn test_split_outside_quotes() {
        assert_eq!(
            split_outside_quotes("log 'a;b'; abort-on-property-read x ;", ';', '\''),
            vec!["log 'a;b'", "abort-on-property-read x"]
        );
    }

    #[test]
    fn test_read_quoted() {
        assert_eq!(read_quoted("'abc', 'd'"), Some(("abc", ", 'd'")));
        assert_eq!(read_quoted(r#""a\"b")"#), Some((r#"a\"b"#, ")")));
        assert_eq!(read_quoted("'unterminated"), None);
        assert_eq!(read_quoted("bare"), None);
    }
}
