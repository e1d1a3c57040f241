//! Rule parser and classifier
//!
//! Turns one line of filter rule text into a typed [`FilterRule`]. The line
//! is normalized first (see [`crate::rule_converter`]), so third-party
//! dialects arrive here already in canonical syntax.

use regex::RegexBuilder;
use serde::Serialize;

use cb_core::domain::{ascii_domain_pattern, normalize_domain};
use cb_core::simple_regex::create_regex_text;
use cb_core::strings::{find_last_unescaped, read_quoted, split_by_delimiter_with_escape};
use cb_core::types::{find_rule_marker, ContentType, MarkerKind, RuleMarker, RuleOptions};

use crate::error::RuleError;
use crate::rule_converter::convert_rule;
use crate::rules::{
    CompositeRule, CssFilterRule, FilterRule, RuleDomains, ScriptFilterRule, ScriptletRule, UrlFilterRule,
};

const COMMENT_MARKER: char = '!';
const WHITELIST_MARKER: &str = "@@";
const OLD_INJECT_RULES: &str = "adg_start_style_inject";
/// Content rules (`$$`, `$@$`) and JS rules (`%%`) have no Safari counterpart
const UNSUPPORTED_MARKERS: [&str; 3] = ["$$", "$@$", "%%"];
const SCRIPTLET_MARKER: &str = "//scriptlet(";
const REGEX_MARKER: char = '/';
const REPLACE_OPTION: &str = "replace=";

/// Pseudo-classes only the extended CSS engine understands.
const EXTENDED_CSS_MARKERS: [&str; 13] = [
    "[-ext-",
    ":has(",
    ":has-text(",
    ":contains(",
    ":matches-css(",
    ":matches-css-before(",
    ":matches-css-after(",
    ":-abp-has(",
    ":-abp-contains(",
    ":-abp-properties(",
    ":properties(",
    ":if(",
    ":if-not(",
];

/// Modifiers that make no sense in Safari and are skipped silently.
const IGNORED_OPTIONS: [&str; 3] = ["background", "extension", "collapse"];

// =============================================================================
// Entry points
// =============================================================================

/// Parse a rule line as it comes from a filter list.
///
/// Returns `Ok(None)` for lines that are not rules (blank lines, comments,
/// indented continuation lines, list metadata such as `Title - ...`).
/// A line that looks like a rule but yields nothing convertible is an error.
pub fn parse_ag_rule(rule_text: &str) -> Result<Option<FilterRule>, RuleError> {
    if rule_text.is_empty()
        || rule_text.starts_with(COMMENT_MARKER)
        || rule_text.starts_with(' ')
        || rule_text.find(" - ").is_some_and(|idx| idx > 0)
    {
        return Ok(None);
    }

    match create_rule(rule_text)? {
        Some(rule) => Ok(Some(rule)),
        None => Err(RuleError::Unsupported(rule_text.to_string())),
    }
}

/// Build a rule object from rule text.
///
/// Dialect rules are normalized first; a line that normalizes into several
/// rules becomes a [`CompositeRule`]. Returns `Ok(None)` for comments and
/// for rule kinds Safari cannot express.
pub fn create_rule(rule_text: &str) -> Result<Option<FilterRule>, RuleError> {
    let rule_text = rule_text.trim();
    if rule_text.is_empty() || rule_text.starts_with(COMMENT_MARKER) {
        return Ok(None);
    }

    let mut converted = convert_rule(rule_text);
    if converted.len() == 1 {
        let text = converted.remove(0);
        return create_single_rule(&text);
    }

    let mut rules = Vec::with_capacity(converted.len());
    for text in &converted {
        if let Some(rule) = create_single_rule(text)? {
            rules.push(rule);
        }
    }

    Ok(match rules.len() {
        0 => None,
        1 => rules.pop(),
        _ => Some(FilterRule::Composite(CompositeRule {
            rule_text: rule_text.to_string(),
            rules,
        })),
    })
}

fn create_single_rule(rule_text: &str) -> Result<Option<FilterRule>, RuleError> {
    if rule_text.starts_with(COMMENT_MARKER)
        || rule_text.contains(OLD_INJECT_RULES)
        || UNSUPPORTED_MARKERS.iter().any(|marker| rule_text.contains(marker))
    {
        return Ok(None);
    }

    let rule = match find_rule_marker(rule_text) {
        Some((idx, marker)) => match marker.kind {
            MarkerKind::Css => FilterRule::Css(parse_css_rule(rule_text, idx, marker)?),
            MarkerKind::Script => parse_script_rule(rule_text, idx, marker)?,
        },
        None => FilterRule::Url(parse_url_rule(rule_text)?),
    };
    Ok(Some(rule))
}

// =============================================================================
// Cosmetic and script rules
// =============================================================================

/// Parse a rule whose marker was found at byte `idx`.
pub fn parse_css_rule(rule_text: &str, idx: usize, marker: &RuleMarker) -> Result<CssFilterRule, RuleError> {
    let css_selector = rule_text[idx + marker.text.len()..].trim();
    if css_selector.is_empty() {
        return Err(RuleError::EmptySelector);
    }
    if marker.inject && !is_css_injection(css_selector) {
        return Err(RuleError::InvalidCssInjection(css_selector.to_string()));
    }

    Ok(CssFilterRule {
        rule_text: rule_text.to_string(),
        filter_id: None,
        domains: load_domains(&rule_text[..idx]),
        whitelist: marker.exception,
        css_selector: css_selector.to_string(),
        extended_css: marker.extended || is_extended_css(css_selector),
        inject: marker.inject,
    })
}

fn is_css_injection(style: &str) -> bool {
    match style.find('{') {
        Some(open) => open > 0 && style.ends_with('}'),
        None => false,
    }
}

fn is_extended_css(selector: &str) -> bool {
    EXTENDED_CSS_MARKERS.iter().any(|marker| selector.contains(marker))
}

/// Parse a `#%#` rule into either a script or a scriptlet rule.
pub fn parse_script_rule(rule_text: &str, idx: usize, marker: &RuleMarker) -> Result<FilterRule, RuleError> {
    let script = &rule_text[idx + marker.text.len()..];
    let domains = load_domains(&rule_text[..idx]);

    if script.starts_with(SCRIPTLET_MARKER) {
        let (name, args) = parse_scriptlet_call(script)?;
        let scriptlet_param = serde_json::to_string(&ScriptletParam { name: &name, args: &args })
            .map_err(|err| RuleError::InvalidScriptlet(err.to_string()))?;

        return Ok(FilterRule::Scriptlet(ScriptletRule {
            rule_text: rule_text.to_string(),
            filter_id: None,
            domains,
            whitelist: marker.exception,
            scriptlet: name,
            scriptlet_param,
        }));
    }

    Ok(FilterRule::Script(ScriptFilterRule {
        rule_text: rule_text.to_string(),
        filter_id: None,
        domains,
        whitelist: marker.exception,
        script: script.to_string(),
    }))
}

#[derive(Serialize)]
struct ScriptletParam<'a> {
    name: &'a str,
    args: &'a [String],
}

/// Parse `//scriptlet('name', 'arg1', "arg2")` into the name and arguments.
///
/// Arguments are quoted with `'` or `"`; their text is kept verbatim,
/// backslashes included.
pub fn parse_scriptlet_call(script: &str) -> Result<(String, Vec<String>), RuleError> {
    let invalid = || RuleError::InvalidScriptlet(script.to_string());

    let inner = script
        .strip_prefix(SCRIPTLET_MARKER)
        .and_then(|rest| rest.trim_end().strip_suffix(')'))
        .ok_or_else(invalid)?;

    let mut args = Vec::new();
    let mut rest = inner.trim_start();
    while !rest.is_empty() {
        let (arg, tail) = read_quoted(rest).ok_or_else(invalid)?;
        args.push(arg.to_string());

        rest = tail.trim_start();
        if let Some(tail) = rest.strip_prefix(',') {
            rest = tail.trim_start();
        } else if !rest.is_empty() {
            return Err(invalid());
        }
    }

    if args.is_empty() || args[0].is_empty() {
        return Err(invalid());
    }
    let name = args.remove(0);
    Ok((name, args))
}

/// Parse a domain list where `~` marks a restricted domain.
///
/// Cosmetic rules separate domains with `,`, `$domain=` uses `|`; both
/// separators are accepted.
pub fn load_domains(text: &str) -> RuleDomains {
    let mut domains = RuleDomains::default();
    for part in text.split([',', '|']).map(str::trim).filter(|part| !part.is_empty()) {
        match part.strip_prefix('~') {
            Some(domain) if !domain.is_empty() => domains.restricted.push(normalize_domain(domain)),
            Some(_) => {}
            None => domains.permitted.push(normalize_domain(part)),
        }
    }
    domains
}

// =============================================================================
// URL rules
// =============================================================================

/// Split URL rule text into `(pattern, options)`.
///
/// The `@@` prefix is dropped. The options delimiter is the last unescaped
/// `$`; regex rules (`/.../`) are not split, since `$` is an anchor there,
/// unless they carry `replace=`.
pub fn split_rule_options(rule_text: &str) -> (&str, Option<String>) {
    let start = if rule_text.starts_with(WHITELIST_MARKER) { WHITELIST_MARKER.len() } else { 0 };
    let pattern = &rule_text[start..];

    let is_regex = pattern.starts_with(REGEX_MARKER) && pattern.ends_with(REGEX_MARKER);
    if is_regex && !pattern.contains(REPLACE_OPTION) {
        return (pattern, None);
    }

    match find_last_unescaped(rule_text, b'$', b'\\', start) {
        Some(idx) => (&rule_text[start..idx], Some(rule_text[idx + 1..].replace("\\$", "$"))),
        None => (pattern, None),
    }
}

/// Parse a URL blocking or exception rule.
pub fn parse_url_rule(rule_text: &str) -> Result<UrlFilterRule, RuleError> {
    let (pattern, options) = split_rule_options(rule_text);
    let url_rule_text = ascii_domain_pattern(pattern);

    let mut rule = UrlFilterRule {
        rule_text: rule_text.to_string(),
        filter_id: None,
        domains: RuleDomains::default(),
        whitelist: rule_text.starts_with(WHITELIST_MARKER),
        url_rule_text,
        permitted_content_type: ContentType::ALL,
        restricted_content_type: ContentType::empty(),
        enabled_options: RuleOptions::empty(),
        disabled_options: RuleOptions::empty(),
        is_important: false,
        is_regex_rule: false,
        url_regexp_source: String::new(),
        bad_filter: None,
        csp_directive: None,
    };

    if let Some(options) = options {
        load_options(&mut rule, &options)?;
    }

    // $popup and the exception-only page modifiers apply to documents
    if rule.enabled_options.intersects(RuleOptions::DOCUMENT_LEVEL) {
        rule.permitted_content_type = ContentType::DOCUMENT;
    }

    let text = &rule.url_rule_text;
    rule.is_regex_rule = text.len() >= 2 && text.starts_with(REGEX_MARKER) && text.ends_with(REGEX_MARKER);
    rule.url_regexp_source = if rule.is_regex_rule {
        compile_regex_rule(&rule)?
    } else {
        create_regex_text(text)
    };

    if rule.is_csp_rule() {
        validate_csp_rule(&rule)?;
    }

    Ok(rule)
}

/// Pre-compile the body of a `/.../` rule and return it.
fn compile_regex_rule(rule: &UrlFilterRule) -> Result<String, RuleError> {
    let text = &rule.url_rule_text;
    let source = &text[1..text.len() - 1];

    RegexBuilder::new(source)
        .case_insensitive(!rule.is_match_case())
        .build()
        .map_err(|_| RuleError::IllegalRegexp(rule.rule_text.clone()))?;

    let matches_everything = source.is_empty() || source == ".*";
    if matches_everything && rule.domains.permitted.is_empty() {
        return Err(RuleError::TooWideRule(text.clone()));
    }

    Ok(source.to_string())
}

fn validate_csp_rule(rule: &UrlFilterRule) -> Result<(), RuleError> {
    let directive = rule.csp_directive.as_deref().unwrap_or_default();
    if !rule.whitelist && directive.is_empty() {
        return Err(RuleError::EmptyCspDirective);
    }

    let directive = directive.to_lowercase();
    if directive.contains("report-uri") || directive.contains("report-to") {
        return Err(RuleError::ForbiddenCspDirective(directive));
    }
    Ok(())
}

fn load_options(rule: &mut UrlFilterRule, options: &str) -> Result<(), RuleError> {
    for option in split_by_delimiter_with_escape(options, ',', '\\', false) {
        let (name, value) = match option.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (option.as_str(), None),
        };
        let name = name.to_lowercase();

        match name.as_str() {
            "domain" => {
                if let Some(value) = value {
                    let domains = load_domains(value);
                    rule.domains.permitted.extend(domains.permitted);
                    rule.domains.restricted.extend(domains.restricted);
                }
            }
            "third-party" | "3p" => set_option(rule, &name, RuleOptions::THIRD_PARTY, true)?,
            "~third-party" | "~3p" | "first-party" | "1p" => {
                set_option(rule, &name, RuleOptions::THIRD_PARTY, false)?
            }
            "match-case" => set_option(rule, &name, RuleOptions::MATCH_CASE, true)?,
            "important" => rule.is_important = true,
            "~important" => rule.is_important = false,
            "elemhide" => set_option(rule, &name, RuleOptions::ELEMHIDE, true)?,
            "generichide" => set_option(rule, &name, RuleOptions::GENERICHIDE, true)?,
            "jsinject" => set_option(rule, &name, RuleOptions::JSINJECT, true)?,
            "content" => set_option(rule, &name, RuleOptions::CONTENT, true)?,
            "urlblock" => set_option(rule, &name, RuleOptions::URLBLOCK, true)?,
            "genericblock" => set_option(rule, &name, RuleOptions::GENERICBLOCK, true)?,
            "document" => set_option(rule, &name, RuleOptions::DOCUMENT_WHITELIST, true)?,
            "popup" => set_option(rule, &name, RuleOptions::BLOCK_POPUPS, true)?,
            "empty" => set_option(rule, &name, RuleOptions::EMPTY_RESPONSE, true)?,
            "csp" => {
                set_option(rule, &name, RuleOptions::CSP_RULE, true)?;
                rule.csp_directive = value.map(str::to_string);
            }
            "replace" => return Err(RuleError::ReplaceNotSupported),
            "badfilter" => rule.bad_filter = Some(badfilter_target(&rule.rule_text)),
            _ => load_content_type(rule, &name)?,
        }
    }
    Ok(())
}

fn load_content_type(rule: &mut UrlFilterRule, name: &str) -> Result<(), RuleError> {
    let (restricted, type_name) = match name.strip_prefix('~') {
        Some(type_name) => (true, type_name),
        None => (false, name),
    };

    match ContentType::from_option_name(type_name) {
        Some(content_type) if restricted => {
            rule.restricted_content_type |= content_type;
        }
        Some(content_type) => {
            if rule.permitted_content_type == ContentType::ALL {
                rule.permitted_content_type = content_type;
            } else {
                rule.permitted_content_type |= content_type;
            }
        }
        None if IGNORED_OPTIONS.contains(&type_name) => {}
        None => return Err(RuleError::UnknownOption(name.to_uppercase())),
    }
    Ok(())
}

fn set_option(rule: &mut UrlFilterRule, name: &str, option: RuleOptions, enabled: bool) -> Result<(), RuleError> {
    if !enabled {
        rule.disabled_options |= option;
        return Ok(());
    }

    let forbidden = if rule.whitelist {
        RuleOptions::BLACKLIST_ONLY.contains(option)
    } else {
        RuleOptions::WHITELIST_ONLY.contains(option)
    };
    if forbidden {
        return Err(RuleError::OptionNotApplicable(format!("${}", name)));
    }

    rule.enabled_options |= option;
    Ok(())
}

/// Text of the rule a `$badfilter` rule cancels.
fn badfilter_target(rule_text: &str) -> String {
    rule_text
        .replacen("$badfilter,", "$", 1)
        .replacen(",badfilter", "", 1)
        .replacen("$badfilter", "", 1)
}
