//! Content blocker emitter
//!
//! Maps one parsed rule to one Safari trigger/action pair and validates the
//! result against what WebKit accepts. Every function here is pure apart
//! from the debug notes pushed to [`Diagnostics`].

use once_cell::sync::Lazy;
use regex::Regex;

use cb_core::domain::{parse_rule_domain, resolve_tld_wildcards};
use cb_core::safari::{ActionType, CbAction, CbRule, CbTrigger, LoadType, ResourceType};
use cb_core::simple_regex::{URL_FILTER_ANY, URL_FILTER_ANY_URL, URL_FILTER_WS_ANY_URL};
use cb_core::types::{ContentType, RuleOptions};

use crate::diagnostics::Diagnostics;
use crate::error::RuleError;
use crate::rules::{CssFilterRule, FilterRule, RuleDomains, ScriptFilterRule, ScriptletRule, UrlFilterRule};

/// URL patterns that match every URL. They get a fixed, cheap url-filter.
const ANY_URL_TEMPLATES: [&str; 4] = ["||*", "", "*", "|*"];

/// Content type groups and the Safari resource type each maps to.
const RESOURCE_TYPES: [(ContentType, ResourceType); 7] = [
    (ContentType::IMAGE, ResourceType::Image),
    (ContentType::STYLESHEET, ResourceType::StyleSheet),
    (ContentType::SCRIPT, ResourceType::Script),
    (ContentType::MEDIA, ResourceType::Media),
    (
        ContentType::XMLHTTPREQUEST.union(ContentType::OTHER).union(ContentType::WEBSOCKET),
        ResourceType::Raw,
    ),
    (ContentType::FONT, ResourceType::Font),
    (ContentType::SUBDOCUMENT.union(ContentType::DOCUMENT), ResourceType::Document),
];

const UNSUPPORTED_CONTENT_TYPES: [(ContentType, &str); 3] = [
    (ContentType::OBJECT, "object"),
    (ContentType::OBJECT_SUBREQUEST, "object_subrequest"),
    (ContentType::WEBRTC, "webrtc"),
];

// =============================================================================
// Regex Safety
// =============================================================================

static DIGIT_QUANTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[0-9,]+\}").expect("valid regex"));
static UNESCAPED_PIPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\\]+\|+\S*").expect("valid regex"));
static NON_ASCII: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\x00-\x7F]").expect("valid regex"));
static NEGATIVE_LOOKAHEAD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(\?!.*\)").expect("valid regex"));
static METACHARACTERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\\]\\[bBdDfnrsStvwW]").expect("valid regex"));

/// Reject regex constructs the WebKit content blocker engine cannot compile.
pub fn validate_regexp(url_filter: &str) -> Result<(), RuleError> {
    let checks: [(&Lazy<Regex>, &'static str); 5] = [
        (&DIGIT_QUANTIFIER, "'{digit}'"),
        (&UNESCAPED_PIPE, "'|'"),
        (&NON_ASCII, "non-ASCII characters"),
        (&NEGATIVE_LOOKAHEAD, "negative lookahead"),
        (&METACHARACTERS, "metacharacters"),
    ];

    for (check, construct) in checks {
        if check.is_match(url_filter) {
            return Err(RuleError::UnsafeRegexp(construct));
        }
    }
    Ok(())
}

// =============================================================================
// Entry Point
// =============================================================================

/// Convert a parsed rule into a Safari content blocker rule.
///
/// Composite rules are never emitted as a whole; the caller converts their
/// parts instead.
pub fn convert_ag_rule(rule: &FilterRule, diagnostics: &mut Diagnostics) -> Result<CbRule, RuleError> {
    match rule {
        FilterRule::Css(rule) => convert_css_rule(rule),
        FilterRule::Url(rule) => convert_url_rule(rule, diagnostics),
        FilterRule::Script(rule) => convert_script_rule(rule),
        FilterRule::Scriptlet(rule) => convert_scriptlet_rule(rule),
        FilterRule::Composite(_) => Err(RuleError::CompositeRule),
    }
}

fn action_type(whitelist: bool, action_type: ActionType) -> ActionType {
    if whitelist {
        ActionType::IgnorePreviousRules
    } else {
        action_type
    }
}

// =============================================================================
// Domain Options
// =============================================================================

/// Permitted and restricted domains as they are written to a trigger.
///
/// Lists are written last-to-first and TLD wildcards are expanded.
fn domain_lists(domains: &RuleDomains) -> (Vec<String>, Vec<String>) {
    let mut included: Vec<String> = domains.permitted.iter().rev().cloned().collect();
    let mut excluded: Vec<String> = domains.restricted.iter().rev().cloned().collect();
    resolve_tld_wildcards(&mut included);
    resolve_tld_wildcards(&mut excluded);
    (included, excluded)
}

fn write_domain_options(
    trigger: &mut CbTrigger,
    included: Vec<String>,
    excluded: Vec<String>,
) -> Result<(), RuleError> {
    if !included.is_empty() && !excluded.is_empty() {
        return Err(RuleError::MixedDomains);
    }
    if !included.is_empty() {
        trigger.if_domain = Some(included);
    }
    if !excluded.is_empty() {
        trigger.unless_domain = Some(excluded);
    }
    Ok(())
}

fn add_domain_options(trigger: &mut CbTrigger, domains: &RuleDomains) -> Result<(), RuleError> {
    let (included, excluded) = domain_lists(domains);
    write_domain_options(trigger, included, excluded)
}

// =============================================================================
// Cosmetic and Script Rules
// =============================================================================

fn convert_css_rule(rule: &CssFilterRule) -> Result<CbRule, RuleError> {
    let mut trigger = CbTrigger::new(URL_FILTER_ANY);
    add_domain_options(&mut trigger, &rule.domains)?;

    let mut action;
    if rule.extended_css || rule.inject {
        action = CbAction::new(action_type(rule.whitelist, ActionType::Css));
        action.css = Some(rule.css_selector.clone());
    } else {
        action = CbAction::new(action_type(rule.whitelist, ActionType::CssDisplayNone));
        action.selector = Some(rule.css_selector.clone());
    }

    if action.action_type == ActionType::Css && rule.css_selector.contains("url(") {
        return Err(RuleError::UrlInCss);
    }

    Ok(CbRule::new(trigger, action))
}

fn convert_script_rule(rule: &ScriptFilterRule) -> Result<CbRule, RuleError> {
    let mut trigger = CbTrigger::new(URL_FILTER_ANY);
    add_domain_options(&mut trigger, &rule.domains)?;

    let mut action = CbAction::new(action_type(rule.whitelist, ActionType::Script));
    action.script = Some(rule.script.clone());
    Ok(CbRule::new(trigger, action))
}

fn convert_scriptlet_rule(rule: &ScriptletRule) -> Result<CbRule, RuleError> {
    let mut trigger = CbTrigger::new(URL_FILTER_ANY);
    add_domain_options(&mut trigger, &rule.domains)?;

    let mut action = CbAction::new(action_type(rule.whitelist, ActionType::Scriptlet));
    action.scriptlet = Some(rule.scriptlet.clone());
    action.scriptlet_param = Some(rule.scriptlet_param.clone());
    Ok(CbRule::new(trigger, action))
}

// =============================================================================
// URL Rules
// =============================================================================

/// Build the url-filter regex of a URL rule.
pub fn create_url_filter(rule: &UrlFilterRule) -> String {
    let is_websocket = rule.is_content_type(ContentType::WEBSOCKET);
    let any_url = if is_websocket { URL_FILTER_WS_ANY_URL } else { URL_FILTER_ANY_URL };

    if ANY_URL_TEMPLATES.contains(&rule.url_rule_text.as_str()) {
        return any_url.to_string();
    }

    let source = &rule.url_regexp_source;
    if rule.is_regex_rule && !source.is_empty() {
        return source.clone();
    }
    if source.is_empty() {
        return URL_FILTER_ANY_URL.to_string();
    }

    // Relative websocket patterns would otherwise match http(s) URLs
    if is_websocket && !source.starts_with('^') && !source.starts_with("ws") {
        return format!("{}.*{}", URL_FILTER_WS_ANY_URL, source);
    }

    source.clone()
}

fn resource_types(rule: &UrlFilterRule) -> Result<Option<Vec<ResourceType>>, RuleError> {
    if rule.permitted_content_type == ContentType::ALL && rule.restricted_content_type.is_empty() {
        return Ok(None);
    }

    for (content_type, name) in UNSUPPORTED_CONTENT_TYPES {
        if rule.is_content_type(content_type) {
            return Err(RuleError::UnsupportedContentType(name));
        }
    }

    if rule.is_block_popups() {
        return Ok(Some(vec![ResourceType::Popup]));
    }

    let types: Vec<ResourceType> = RESOURCE_TYPES
        .iter()
        .filter(|(mask, _)| mask.iter().any(|flag| rule.check_content_type_mask(flag)))
        .map(|(_, resource_type)| *resource_type)
        .collect();

    Ok(if types.is_empty() { None } else { Some(types) })
}

/// Whitelist rules that must apply to a whole page rather than to requests.
fn is_page_exception(rule: &UrlFilterRule) -> bool {
    rule.whitelist
        && (rule.is_document_whitelist()
            || rule.is_single_option(RuleOptions::URLBLOCK)
            || rule.is_single_option(RuleOptions::GENERICBLOCK)
            || rule.is_single_option(RuleOptions::GENERICHIDE)
            || rule.is_single_option(RuleOptions::ELEMHIDE))
}

/// Domain a page exception is bound to, or `None` if the rule has to keep
/// its ordinary request-level trigger.
fn page_exception_domain(rule: &UrlFilterRule, diagnostics: &mut Diagnostics) -> Option<String> {
    if !is_page_exception(rule) {
        return None;
    }

    match parse_rule_domain(&rule.url_rule_text) {
        Some(parsed) => match parsed.path.as_deref() {
            None | Some("^") | Some("/") => Some(parsed.domain),
            Some(_) => {
                diagnostics.debug(format!("Whitelist special warning for rule: {}", rule.rule_text));
                None
            }
        },
        None => {
            diagnostics.debug(format!("Error parse domain from rule: {}", rule.rule_text));
            None
        }
    }
}

fn convert_url_rule(rule: &UrlFilterRule, diagnostics: &mut Diagnostics) -> Result<CbRule, RuleError> {
    if rule.is_csp_rule() {
        return Err(RuleError::CspNotSupported);
    }

    let url_filter = create_url_filter(rule);
    validate_regexp(&url_filter)?;

    let action = CbAction::new(action_type(rule.whitelist, ActionType::Block));
    let resource_type = resource_types(rule)?;
    let (included, excluded) = domain_lists(&rule.domains);
    if !included.is_empty() && !excluded.is_empty() {
        return Err(RuleError::MixedDomains);
    }

    let trigger = match page_exception_domain(rule, diagnostics) {
        Some(domain) => {
            // Catch-all over the page domain, independent of the request URL
            let mut domains = vec![domain];
            resolve_tld_wildcards(&mut domains);
            let mut trigger = CbTrigger::new(URL_FILTER_ANY);
            write_domain_options(&mut trigger, domains, excluded)?;
            trigger
        }
        None => {
            let mut trigger = CbTrigger::new(url_filter);
            if !(rule.whitelist && rule.is_document_whitelist()) {
                trigger.resource_type = resource_type;
            }
            trigger.load_type = rule.third_party().map(|third_party| {
                vec![if third_party { LoadType::ThirdParty } else { LoadType::FirstParty }]
            });
            if rule.is_match_case() {
                trigger.url_filter_is_case_sensitive = Some(true);
            }
            write_domain_options(&mut trigger, included, excluded)?;
            trigger
        }
    };

    let result = CbRule::new(trigger, action);
    validate_url_blocking_rule(rule, &result)?;
    Ok(result)
}

/// Blocking every document is only allowed when narrowed to third-party
/// loads or specific domains, or when asked for with `$document`.
fn validate_url_blocking_rule(rule: &UrlFilterRule, result: &CbRule) -> Result<(), RuleError> {
    let trigger = &result.trigger;
    let blocks_documents = result.action.action_type == ActionType::Block
        && trigger
            .resource_type
            .as_ref()
            .is_some_and(|types| types.contains(&ResourceType::Document));
    let narrowed = trigger.if_domain.is_some()
        || trigger
            .load_type
            .as_ref()
            .is_some_and(|types| types.contains(&LoadType::ThirdParty));

    if blocks_documents && !narrowed && !rule.is_document_whitelist() {
        return Err(RuleError::UnrestrictedDocumentBlocking);
    }
    Ok(())
}
