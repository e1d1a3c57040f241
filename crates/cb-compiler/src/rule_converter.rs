//! Third-party syntax normalizer
//!
//! Rewrites uBlock Origin and Adblock Plus specific syntax into the
//! canonical form the parser understands. One input line may turn into
//! several rules. Canonical rules pass through unchanged, so
//! `convert_rule` is idempotent.

use once_cell::sync::Lazy;
use regex::Regex;

use cb_core::strings::{find_last_unescaped, split_outside_quotes};

const UBO_SCRIPTLET_MARKER: &str = "##+js(";
const UBO_SCRIPTLET_EXCEPTION_MARKER: &str = "#@#+js(";
const ABP_SNIPPET_MARKER: &str = "#$#";
const ABP_SNIPPET_EXCEPTION_MARKER: &str = "#@$#";
const SCRIPTLET_MARKER: &str = "#%#//scriptlet(";
const SCRIPTLET_EXCEPTION_MARKER: &str = "#@%#//scriptlet(";
const UBO_PREFIX: &str = "ubo-";
const ABP_PREFIX: &str = "abp-";

const SCRIPT_HAS_TEXT_MARKER: &str = "##^script";
const HAS_TEXT: &str = ":has-text(";

const ALL_OPTION: &str = "all";
const ALL_REPLACEMENTS: [&str; 2] = ["document", "popup"];

/// CSS injection rules share the `#$#` marker with ABP snippets.
static CSS_INJECTION_RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#@?\$#.+?\s*\{.*\}\s*$").expect("valid CSS injection regex"));

/// Normalize one rule into one or more canonical rule texts.
pub fn convert_rule(rule_text: &str) -> Vec<String> {
    if let Some(converted) = convert_ubo_scriptlet(rule_text) {
        return vec![converted];
    }
    if let Some(converted) = convert_abp_snippet(rule_text) {
        return converted;
    }
    if let Some(converted) = convert_script_has_text(rule_text) {
        return converted;
    }
    if let Some(converted) = convert_all_option(rule_text) {
        return converted;
    }
    vec![rule_text.to_string()]
}

fn quote_arg(arg: &str) -> String {
    format!("\"{}\"", arg.replace('"', "\\\""))
}

fn scriptlet_rule(domains: &str, exception: bool, name: &str, args: &[String]) -> String {
    let marker = if exception { SCRIPTLET_EXCEPTION_MARKER } else { SCRIPTLET_MARKER };
    let mut params = Vec::with_capacity(args.len() + 1);
    params.push(quote_arg(name));
    params.extend(args.iter().map(|arg| quote_arg(arg)));
    format!("{}{}{})", domains, marker, params.join(", "))
}

// =============================================================================
// uBlock Origin
// =============================================================================

/// `example.org##+js(name, arg)` -> `example.org#%#//scriptlet("ubo-name", "arg")`
fn convert_ubo_scriptlet(rule_text: &str) -> Option<String> {
    let (idx, marker, exception) = match rule_text.find(UBO_SCRIPTLET_MARKER) {
        Some(idx) => (idx, UBO_SCRIPTLET_MARKER, false),
        None => (rule_text.find(UBO_SCRIPTLET_EXCEPTION_MARKER)?, UBO_SCRIPTLET_EXCEPTION_MARKER, true),
    };

    let body = &rule_text[idx + marker.len()..];
    let body = body.strip_suffix(')').unwrap_or(body);
    let mut args: Vec<String> = body.split(',').map(|arg| arg.trim().to_string()).collect();

    let name = args.remove(0);
    if name.is_empty() {
        return None;
    }
    let name = format!("{}{}", UBO_PREFIX, name);
    Some(scriptlet_rule(&rule_text[..idx], exception, &name, &args))
}

// =============================================================================
// Adblock Plus
// =============================================================================

/// `example.org#$#snippet arg 'quoted arg'; other` -> one scriptlet rule per
/// snippet call. CSS injection rules are left alone.
fn convert_abp_snippet(rule_text: &str) -> Option<Vec<String>> {
    let (idx, marker, exception) = match rule_text.find(ABP_SNIPPET_MARKER) {
        Some(idx) => (idx, ABP_SNIPPET_MARKER, false),
        None => (rule_text.find(ABP_SNIPPET_EXCEPTION_MARKER)?, ABP_SNIPPET_EXCEPTION_MARKER, true),
    };
    if CSS_INJECTION_RULE.is_match(rule_text) {
        return None;
    }

    let domains = &rule_text[..idx];
    let body = &rule_text[idx + marker.len()..];

    let rules: Vec<String> = split_outside_quotes(body, ';', '\'')
        .into_iter()
        .filter_map(|statement| {
            let mut tokens = snippet_tokens(statement);
            if tokens.is_empty() {
                return None;
            }
            let name = format!("{}{}", ABP_PREFIX, tokens.remove(0));
            Some(scriptlet_rule(domains, exception, &name, &tokens))
        })
        .collect();

    if rules.is_empty() {
        None
    } else {
        Some(rules)
    }
}

/// Split a snippet call into whitespace separated tokens; `'...'` groups a
/// token containing spaces.
fn snippet_tokens(statement: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = statement.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let mut token = String::new();
        if c == '\'' {
            chars.next();
            for c in chars.by_ref() {
                if c == '\'' {
                    break;
                }
                token.push(c);
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                token.push(c);
                chars.next();
            }
        }
        tokens.push(token);
    }
    tokens
}

// =============================================================================
// Script content rules
// =============================================================================

/// `example.com##^script:has-text(x)` -> `example.com$$script[tag-content="x"]`
///
/// Each plain text argument becomes its own rule; regex arguments stay in a
/// single `##^script:has-text(...)` rule.
fn convert_script_has_text(rule_text: &str) -> Option<Vec<String>> {
    let idx = rule_text.find(SCRIPT_HAS_TEXT_MARKER)?;
    let domains = &rule_text[..idx];
    let chain = &rule_text[idx + SCRIPT_HAS_TEXT_MARKER.len()..];

    let mut parts = chain.split(HAS_TEXT);
    if !parts.next()?.is_empty() {
        return None;
    }

    let mut rules = Vec::new();
    let mut regexps = Vec::new();
    for part in parts {
        let content = part.strip_suffix(')')?;
        if content.len() >= 2 && content.starts_with('/') && content.ends_with('/') {
            regexps.push(content);
        } else {
            rules.push(format!("{}$$script[tag-content=\"{}\"]", domains, content));
        }
    }

    // A chain of regexps only is already canonical
    if rules.is_empty() {
        return None;
    }
    if !regexps.is_empty() {
        let chain: String = regexps.iter().map(|re| format!("{}{})", HAS_TEXT, re)).collect();
        rules.push(format!("{}{}{}", domains, SCRIPT_HAS_TEXT_MARKER, chain));
    }
    Some(rules)
}

// =============================================================================
// $all
// =============================================================================

/// `||example.org^$all` -> `||example.org^$document` and `||example.org^$popup`
fn convert_all_option(rule_text: &str) -> Option<Vec<String>> {
    let idx = find_last_unescaped(rule_text, b'$', b'\\', 0)?;
    let (pattern, options) = (&rule_text[..idx], &rule_text[idx + 1..]);

    let tokens: Vec<&str> = options.split(',').collect();
    let position = tokens.iter().position(|token| *token == ALL_OPTION)?;

    Some(
        ALL_REPLACEMENTS
            .iter()
            .map(|replacement| {
                let mut options = tokens.clone();
                options[position] = replacement;
                format!("{}${}", pattern, options.join(","))
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_rules_pass_through() {
        for rule in [
            "example.org#%#//scriptlet('abort-on-property-read', 'I10C')",
            "example.org#@%#//scriptlet('abort-on-property-read', 'I10C')",
            "firmgoogle.com#$#.pub_300x250 {display:block!important;}",
            "example.com#@$#h1 { display: none!important; }",
            "example.com##^script:some-another-rule(test)",
            "||example.org^$document",
        ] {
            assert_eq!(convert_rule(rule), vec![rule]);
        }
    }

    #[test]
    fn ubo_scriptlets() {
        assert_eq!(
            convert_rule("example.org##+js(setTimeout-defuser.js, [native code], 8000)"),
            vec![r#"example.org#%#//scriptlet("ubo-setTimeout-defuser.js", "[native code]", "8000")"#]
        );
        assert_eq!(
            convert_rule("example.org#@#+js(setTimeout-defuser.js, [native code], 8000)"),
            vec![r#"example.org#@%#//scriptlet("ubo-setTimeout-defuser.js", "[native code]", "8000")"#]
        );
    }

    #[test]
    fn abp_snippets() {
        assert_eq!(
            convert_rule("example.org#$#hide-if-contains li.serp-item 'li.serp-item div.label'"),
            vec![r#"example.org#%#//scriptlet("abp-hide-if-contains", "li.serp-item", "li.serp-item div.label")"#]
        );

        let rule = r#"example.org#$#hide-if-has-and-matches-style 'd[id^="_"]' 'div > s' 'display: none'; hide-if-contains /.*/ .p 'a[href^="/ad__c?"]'"#;
        assert_eq!(
            convert_rule(rule),
            vec![
                r#"example.org#%#//scriptlet("abp-hide-if-has-and-matches-style", "d[id^=\"_\"]", "div > s", "display: none")"#,
                r#"example.org#%#//scriptlet("abp-hide-if-contains", "/.*/", ".p", "a[href^=\"/ad__c?\"]")"#,
            ]
        );
    }

    #[test]
    fn script_has_text() {
        assert_eq!(
            convert_rule("example.com##^script:has-text(12313)"),
            vec![r#"example.com$$script[tag-content="12313"]"#]
        );
        assert_eq!(
            convert_rule(r"example.com##^script:has-text(===):has-text(/[wW]{16000}/)"),
            vec![
                r#"example.com$$script[tag-content="==="]"#,
                r"example.com##^script:has-text(/[wW]{16000}/)",
            ]
        );
    }

    #[test]
    fn all_option() {
        assert_eq!(
            convert_rule("||example.org^$all"),
            vec!["||example.org^$document", "||example.org^$popup"]
        );
        assert_eq!(
            convert_rule("||example.org^$all,important"),
            vec!["||example.org^$document,important", "||example.org^$popup,important"]
        );
        assert_eq!(convert_rule("||example.org^$allow"), vec!["||example.org^$allow"]);
    }

    #[test]
    fn conversion_is_idempotent() {
        for rule in [
            "example.org##+js(nano-sib, 1000)",
            "example.org#$#abort-on-property-read 'a b'; log x",
            r"example.com##^script:has-text(===):has-text(/[wW]{16000}/)",
            "||example.org^$all,important",
        ] {
            for converted in convert_rule(rule) {
                assert_eq!(convert_rule(&converted), vec![converted.clone()]);
            }
        }
    }
}
