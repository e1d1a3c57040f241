use std::collections::{HashMap, HashSet};

use cb_core::safari::{ActionType, CbAction, CbRule, CbTrigger};
use cb_core::simple_regex::URL_FILTER_ANY;

use crate::diagnostics::Diagnostics;
use crate::rules::FilterRule;

/// Max number of selectors merged into one wide CSS rule.
pub const MAX_SELECTORS_PER_WIDE_RULE: usize = 250;

// =============================================================================
// Badfilter
// =============================================================================

/// Flatten composite rules and pull out `$badfilter` rules.
///
/// The text of every rule cancelled by a badfilter is added to `badfilters`;
/// the remaining rules are returned in source order.
pub fn collect_badfilters(rules: Vec<FilterRule>, badfilters: &mut HashSet<String>) -> Vec<FilterRule> {
    let mut result = Vec::with_capacity(rules.len());
    for rule in rules {
        let parts = match rule {
            FilterRule::Composite(composite) => composite.rules,
            rule => vec![rule],
        };

        for part in parts {
            match part.as_url().and_then(|url| url.bad_filter.as_ref()) {
                Some(target) => {
                    badfilters.insert(target.clone());
                }
                None => result.push(part),
            }
        }
    }
    result
}

// =============================================================================
// Exceptions
// =============================================================================

/// Payload used to match cosmetic and script exceptions with the rules they cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKey {
    /// `css-display-none` selector
    Selector,
    /// Extended CSS or injected style, matched against selectors too
    Css,
    Script,
    /// Scriptlet name
    Scriptlet,
}

impl ExceptionKey {
    fn payload<'a>(&self, action: &'a CbAction) -> Option<&'a str> {
        match self {
            Self::Selector => action.selector.as_deref(),
            Self::Css => action.css.as_deref().or(action.selector.as_deref()),
            Self::Script => action.script.as_deref(),
            Self::Scriptlet => action.scriptlet.as_deref(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Selector => "selector",
            Self::Css => "css",
            Self::Script => "script",
            Self::Scriptlet => "scriptlet",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExceptionStats {
    pub applied: usize,
    /// Rules dropped because they ended up with both domain lists
    pub conflicts: usize,
}

/// Turn domain-scoped exceptions into `unless-domain` entries of the
/// blocking rules they match.
///
/// An exception domain is added when the blocking rule has no `if-domain`
/// list, or when the exception domain contains one of its entries as a
/// substring. Blocking rules that end up with both lists are dropped.
pub fn apply_action_exceptions(
    mut blocking: Vec<CbRule>,
    exceptions: &[CbRule],
    key: ExceptionKey,
    diagnostics: &mut Diagnostics,
) -> (Vec<CbRule>, ExceptionStats) {
    diagnostics.info(format!("Applying {} {} exceptions", exceptions.len(), key.name()));

    let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, rule) in blocking.iter().enumerate() {
        if let Some(payload) = key.payload(&rule.action) {
            groups.entry(payload.to_string()).or_default().push(idx);
        }
    }

    let mut stats = ExceptionStats::default();
    for exception in exceptions {
        let Some(indices) = key.payload(&exception.action).and_then(|payload| groups.get(payload)) else {
            continue;
        };

        for &idx in indices {
            for domain in exception.trigger.if_domains() {
                push_exception_domain(domain, &mut blocking[idx].trigger);
            }
        }
        stats.applied += 1;
    }

    blocking.retain(|rule| {
        if !rule.trigger.has_conflicting_domains() {
            return true;
        }
        diagnostics.debug("Safari does not support permitted and restricted domains in one rule");
        if let Ok(json) = serde_json::to_string(rule) {
            diagnostics.debug(json);
        }
        stats.conflicts += 1;
        false
    });

    diagnostics.info(format!("Exceptions {} applied: {}", key.name(), stats.applied));
    diagnostics.info(format!("Exceptions {} errors: {}", key.name(), stats.conflicts));
    (blocking, stats)
}

fn push_exception_domain(domain: &str, trigger: &mut CbTrigger) {
    let permitted = trigger.if_domains();
    if !permitted.is_empty() && !permitted.iter().any(|p| domain.contains(p.as_str())) {
        return;
    }
    trigger.unless_domain.get_or_insert_with(Vec::new).push(domain.to_string());
}

// =============================================================================
// CSS Compaction
// =============================================================================

/// Element hiding rules split by how they are scoped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactedCss {
    /// No domain restriction
    pub wide: Vec<CbRule>,
    /// Only `unless-domain`
    pub generic_domain_sensitive: Vec<CbRule>,
    /// `if-domain`
    pub domain_sensitive: Vec<CbRule>,
}

/// Split CSS rules by scope, merging wide `css-display-none` selectors into
/// rules of up to [`MAX_SELECTORS_PER_WIDE_RULE`] selectors each.
///
/// With `merge_wide` unset, wide rules are kept as they are (extended CSS
/// cannot be joined into one selector list).
pub fn compact_css_rules(rules: Vec<CbRule>, merge_wide: bool, diagnostics: &mut Diagnostics) -> CompactedCss {
    diagnostics.info(format!("Trying to compact {} elemhide rules", rules.len()));

    let mut compacted = CompactedCss::default();
    let mut wide_selectors: Vec<String> = Vec::new();

    for rule in rules {
        if !rule.trigger.if_domains().is_empty() {
            compacted.domain_sensitive.push(rule);
        } else if !rule.trigger.unless_domains().is_empty() {
            compacted.generic_domain_sensitive.push(rule);
        } else if !merge_wide || rule.action.action_type != ActionType::CssDisplayNone {
            compacted.wide.push(rule);
        } else if let Some(selector) = rule.action.selector {
            wide_selectors.push(selector);
            if wide_selectors.len() >= MAX_SELECTORS_PER_WIDE_RULE {
                compacted.wide.push(wide_rule(&wide_selectors));
                wide_selectors.clear();
            }
        }
    }
    if !wide_selectors.is_empty() {
        compacted.wide.push(wide_rule(&wide_selectors));
    }

    diagnostics.info(format!(
        "Compacted result: wide={} domainSensitive={}",
        compacted.wide.len(),
        compacted.domain_sensitive.len()
    ));
    compacted
}

fn wide_rule(selectors: &[String]) -> CbRule {
    let mut action = CbAction::new(ActionType::CssDisplayNone);
    action.selector = Some(selectors.join(", "));
    CbRule::new(CbTrigger::new(URL_FILTER_ANY), action)
}

// =============================================================================
// Domain Wildcards
// =============================================================================

/// Prefix every `if-domain` and `unless-domain` entry with `*`.
pub fn apply_domain_wildcards(rules: &mut [CbRule]) {
    for rule in rules.iter_mut() {
        rule.trigger.add_domain_wildcards();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::create_rule;

    fn css(selector: &str, if_domain: &[&str], unless_domain: &[&str]) -> CbRule {
        let mut trigger = CbTrigger::new(".*");
        if !if_domain.is_empty() {
            trigger.if_domain = Some(if_domain.iter().map(|d| d.to_string()).collect());
        }
        if !unless_domain.is_empty() {
            trigger.unless_domain = Some(unless_domain.iter().map(|d| d.to_string()).collect());
        }
        let mut action = CbAction::new(ActionType::CssDisplayNone);
        action.selector = Some(selector.to_string());
        CbRule::new(trigger, action)
    }

    fn exception(selector: &str, domain: &str) -> CbRule {
        let mut rule = css(selector, &[domain], &[]);
        rule.action.action_type = ActionType::IgnorePreviousRules;
        rule
    }

    #[test]
    fn exceptions_become_unless_domains() {
        let mut diagnostics = Diagnostics::new();
        let blocking = vec![css(".banner", &[], &[]), css(".other", &[], &[])];
        let exceptions = vec![exception(".banner", "example.org"), exception(".missing", "example.org")];

        let (rules, stats) = apply_action_exceptions(blocking, &exceptions, ExceptionKey::Selector, &mut diagnostics);
        assert_eq!(stats, ExceptionStats { applied: 1, conflicts: 0 });
        assert_eq!(rules[0].trigger.unless_domains(), ["example.org"]);
        assert!(rules[1].trigger.unless_domain.is_none());
    }

    #[test]
    fn exception_on_restricted_rule_conflicts() {
        let mut diagnostics = Diagnostics::new();
        let blocking = vec![css(".banner", &["example.org"], &[]), css(".banner", &["other.com"], &[])];
        let exceptions = vec![exception(".banner", "sub.example.org")];

        let (rules, stats) = apply_action_exceptions(blocking, &exceptions, ExceptionKey::Selector, &mut diagnostics);
        assert_eq!(stats.conflicts, 1);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].trigger.if_domains(), ["other.com"]);
        assert_eq!(diagnostics.count(log::Level::Debug), 2);
    }

    #[test]
    fn css_key_matches_selectors_and_styles() {
        let mut extended = css(".banner:has(a)", &[], &[]);
        extended.action.action_type = ActionType::Css;
        extended.action.css = extended.action.selector.take();

        let (rules, stats) = apply_action_exceptions(
            vec![extended],
            &[exception(".banner:has(a)", "example.org")],
            ExceptionKey::Css,
            &mut Diagnostics::new(),
        );
        assert_eq!(stats.applied, 1);
        assert_eq!(rules[0].trigger.unless_domains(), ["example.org"]);
    }

    #[test]
    fn compacts_wide_rules() {
        let mut rules: Vec<CbRule> = (0..251).map(|i| css(&format!(".ad{}", i), &[], &[])).collect();
        rules.push(css(".ds", &["example.org"], &[]));
        rules.push(css(".gds", &[], &["example.org"]));

        let compacted = compact_css_rules(rules, true, &mut Diagnostics::new());
        assert_eq!(compacted.wide.len(), 2);
        assert_eq!(compacted.wide[0].action.selector.as_ref().unwrap().split(", ").count(), 250);
        assert_eq!(compacted.wide[1].action.selector.as_deref(), Some(".ad250"));
        assert_eq!(compacted.domain_sensitive.len(), 1);
        assert_eq!(compacted.generic_domain_sensitive.len(), 1);
    }

    #[test]
    fn keeps_wide_rules_when_not_merging() {
        let rules = vec![css(".a", &[], &[]), css(".b", &[], &[])];
        let compacted = compact_css_rules(rules.clone(), false, &mut Diagnostics::new());
        assert_eq!(compacted.wide, rules);
    }

    #[test]
    fn badfilter_collection_flattens_composites() {
        let rules = ["||example.org^$image,badfilter", "||example.org^$image", "||ads.com^$all,badfilter"]
            .iter()
            .filter_map(|text| create_rule(text).unwrap())
            .collect();

        let mut badfilters = HashSet::new();
        let rules = collect_badfilters(rules, &mut badfilters);
        assert_eq!(rules.len(), 1);
        assert!(badfilters.contains("||example.org^$image"));
        assert!(badfilters.contains("||ads.com^$document"));
        assert!(badfilters.contains("||ads.com^$popup"));
    }

    #[test]
    fn wildcards() {
        let mut rules = vec![css(".a", &["a.com"], &[]), css(".b", &[], &["*b.com"])];
        apply_domain_wildcards(&mut rules);
        assert_eq!(rules[0].trigger.if_domains(), ["*a.com"]);
        assert_eq!(rules[1].trigger.unless_domains(), ["*b.com"]);
    }
}
