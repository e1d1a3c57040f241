//! Typed filter rules
//!
//! [`FilterRule`] is a closed set of rule variants. Every stage after the
//! parser matches on it exhaustively, so a new rule kind cannot be added
//! without the compiler pointing at every place that must handle it.

use cb_core::types::{ContentType, RuleOptions};

/// Domains a rule is limited to (`permitted`) or disabled on (`restricted`).
///
/// Entries are lower-cased and punycode-encoded, in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleDomains {
    pub permitted: Vec<String>,
    pub restricted: Vec<String>,
}

/// Element hiding or CSS injection rule (`##`, `#@#`, `#?#`, `#$#`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssFilterRule {
    pub rule_text: String,
    pub filter_id: Option<i32>,
    pub domains: RuleDomains,
    pub whitelist: bool,
    pub css_selector: String,
    pub extended_css: bool,
    pub inject: bool,
}

/// Script injection rule (`#%#`, `#@%#`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFilterRule {
    pub rule_text: String,
    pub filter_id: Option<i32>,
    pub domains: RuleDomains,
    pub whitelist: bool,
    pub script: String,
}

/// Scriptlet call rule (`#%#//scriptlet(...)`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptletRule {
    pub rule_text: String,
    pub filter_id: Option<i32>,
    pub domains: RuleDomains,
    pub whitelist: bool,
    /// Scriptlet name
    pub scriptlet: String,
    /// JSON-encoded `{"name": ..., "args": [...]}`
    pub scriptlet_param: String,
}

/// URL blocking or exception rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlFilterRule {
    pub rule_text: String,
    pub filter_id: Option<i32>,
    pub domains: RuleDomains,
    pub whitelist: bool,
    /// Pattern part of the rule: no `@@` prefix, no `$options`, punycoded host
    pub url_rule_text: String,
    pub permitted_content_type: ContentType,
    pub restricted_content_type: ContentType,
    pub enabled_options: RuleOptions,
    pub disabled_options: RuleOptions,
    pub is_important: bool,
    pub is_regex_rule: bool,
    /// Regex source of the pattern (the literal body for `/.../` rules)
    pub url_regexp_source: String,
    /// Text of the rule this `$badfilter` rule disables
    pub bad_filter: Option<String>,
    pub csp_directive: Option<String>,
}

impl UrlFilterRule {
    /// `$document` exception: elemhide, urlblock, jsinject and content at once.
    pub fn is_document_whitelist(&self) -> bool {
        self.enabled_options.contains(RuleOptions::DOCUMENT_WHITELIST)
    }

    /// Whether `option` is the only enabled option.
    pub fn is_single_option(&self, option: RuleOptions) -> bool {
        self.enabled_options == option
    }

    /// Whether the permitted content type is exactly `content_type`.
    pub fn is_content_type(&self, content_type: ContentType) -> bool {
        self.permitted_content_type == content_type
    }

    /// Whether a request of type `mask` would be matched by the type modifiers.
    pub fn check_content_type_mask(&self, mask: ContentType) -> bool {
        let permitted = self.permitted_content_type == ContentType::ALL
            || self.permitted_content_type.intersects(mask);
        let not_restricted =
            self.restricted_content_type.is_empty() || !self.restricted_content_type.intersects(mask);
        permitted && not_restricted
    }

    /// Load type restriction: `Some(true)` for third-party only,
    /// `Some(false)` for first-party only.
    pub fn third_party(&self) -> Option<bool> {
        if self.enabled_options.contains(RuleOptions::THIRD_PARTY) {
            Some(true)
        } else if self.disabled_options.contains(RuleOptions::THIRD_PARTY) {
            Some(false)
        } else {
            None
        }
    }

    pub fn is_match_case(&self) -> bool {
        self.enabled_options.contains(RuleOptions::MATCH_CASE)
    }

    pub fn is_block_popups(&self) -> bool {
        self.enabled_options.contains(RuleOptions::BLOCK_POPUPS)
    }

    pub fn is_csp_rule(&self) -> bool {
        self.enabled_options.contains(RuleOptions::CSP_RULE)
    }

    pub fn is_bad_filter(&self) -> bool {
        self.bad_filter.is_some()
    }
}

/// One source line that expands into several rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeRule {
    pub rule_text: String,
    pub rules: Vec<FilterRule>,
}

/// A parsed filter rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterRule {
    Css(CssFilterRule),
    Url(UrlFilterRule),
    Script(ScriptFilterRule),
    Scriptlet(ScriptletRule),
    Composite(CompositeRule),
}

impl FilterRule {
    pub fn rule_text(&self) -> &str {
        match self {
            Self::Css(rule) => &rule.rule_text,
            Self::Url(rule) => &rule.rule_text,
            Self::Script(rule) => &rule.rule_text,
            Self::Scriptlet(rule) => &rule.rule_text,
            Self::Composite(rule) => &rule.rule_text,
        }
    }

    pub fn is_important(&self) -> bool {
        matches!(self, Self::Url(rule) if rule.is_important)
    }

    /// Tag the rule (and the parts of a composite rule) with a filter list id.
    pub fn with_filter_id(mut self, filter_id: i32) -> Self {
        match &mut self {
            Self::Css(rule) => rule.filter_id = Some(filter_id),
            Self::Url(rule) => rule.filter_id = Some(filter_id),
            Self::Script(rule) => rule.filter_id = Some(filter_id),
            Self::Scriptlet(rule) => rule.filter_id = Some(filter_id),
            Self::Composite(rule) => {
                let parts = std::mem::take(&mut rule.rules);
                rule.rules = parts.into_iter().map(|part| part.with_filter_id(filter_id)).collect();
            }
        }
        self
    }

    /// The URL rule, if this is one.
    pub fn as_url(&self) -> Option<&UrlFilterRule> {
        match self {
            Self::Url(rule) => Some(rule),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url_rule(permitted: ContentType, restricted: ContentType, enabled: RuleOptions) -> UrlFilterRule {
        UrlFilterRule {
            rule_text: "||example.org^".to_string(),
            filter_id: None,
            domains: RuleDomains::default(),
            whitelist: false,
            url_rule_text: "||example.org^".to_string(),
            permitted_content_type: permitted,
            restricted_content_type: restricted,
            enabled_options: enabled,
            disabled_options: RuleOptions::empty(),
            is_important: false,
            is_regex_rule: false,
            url_regexp_source: String::new(),
            bad_filter: None,
            csp_directive: None,
        }
    }

    #[test]
    fn content_type_mask() {
        let all = url_rule(ContentType::ALL, ContentType::empty(), RuleOptions::empty());
        assert!(all.check_content_type_mask(ContentType::IMAGE));

        let not_script = url_rule(ContentType::ALL, ContentType::SCRIPT, RuleOptions::empty());
        assert!(!not_script.check_content_type_mask(ContentType::SCRIPT));
        assert!(not_script.check_content_type_mask(ContentType::IMAGE));

        let image = url_rule(ContentType::IMAGE, ContentType::empty(), RuleOptions::empty());
        assert!(image.check_content_type_mask(ContentType::IMAGE));
        assert!(!image.check_content_type_mask(ContentType::FONT));
        assert!(image.is_content_type(ContentType::IMAGE));
    }

    #[test]
    fn option_queries() {
        let rule = url_rule(ContentType::DOCUMENT, ContentType::empty(), RuleOptions::DOCUMENT_WHITELIST);
        assert!(rule.is_document_whitelist());
        assert!(!rule.is_single_option(RuleOptions::ELEMHIDE));

        let rule = url_rule(ContentType::DOCUMENT, ContentType::empty(), RuleOptions::GENERICHIDE);
        assert!(rule.is_single_option(RuleOptions::GENERICHIDE));
        assert!(!rule.is_document_whitelist());
        assert_eq!(rule.third_party(), None);
    }

    #[test]
    fn filter_id_reaches_composite_parts() {
        let part = FilterRule::Url(url_rule(ContentType::ALL, ContentType::empty(), RuleOptions::empty()));
        let composite = FilterRule::Composite(CompositeRule {
            rule_text: "x".to_string(),
            rules: vec![part],
        })
        .with_filter_id(3);

        match composite {
            FilterRule::Composite(rule) => assert_eq!(rule.rules[0].as_url().unwrap().filter_id, Some(3)),
            other => panic!("unexpected rule {:?}", other),
        }
    }
}
