//! Safari content blocker data model
//!
//! A content blocker is a JSON array of `{ trigger, action }` objects.
//! Field names and the order in which they are declared here match the
//! format consumed by WebKit, so the serialized output can be compared
//! byte-for-byte between runs.

use serde::{Deserialize, Serialize};

// =============================================================================
// Trigger
// =============================================================================

/// Resource types a trigger applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceType {
    Image,
    StyleSheet,
    Script,
    Media,
    Raw,
    Font,
    Document,
    Popup,
}

/// Load types a trigger applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadType {
    FirstParty,
    ThirdParty,
}

/// Matching condition of a content blocker rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CbTrigger {
    #[serde(rename = "url-filter")]
    pub url_filter: String,
    #[serde(rename = "resource-type", default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<Vec<ResourceType>>,
    #[serde(rename = "load-type", default, skip_serializing_if = "Option::is_none")]
    pub load_type: Option<Vec<LoadType>>,
    #[serde(
        rename = "url-filter-is-case-sensitive",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub url_filter_is_case_sensitive: Option<bool>,
    #[serde(rename = "if-domain", default, skip_serializing_if = "Option::is_none")]
    pub if_domain: Option<Vec<String>>,
    #[serde(rename = "unless-domain", default, skip_serializing_if = "Option::is_none")]
    pub unless_domain: Option<Vec<String>>,
}

impl CbTrigger {
    /// Create a trigger with only a `url-filter`.
    pub fn new(url_filter: impl Into<String>) -> Self {
        Self {
            url_filter: url_filter.into(),
            ..Self::default()
        }
    }

    /// Domains the trigger is restricted to (empty when unrestricted).
    pub fn if_domains(&self) -> &[String] {
        self.if_domain.as_deref().unwrap_or(&[])
    }

    /// Domains the trigger is disabled on (empty when none).
    pub fn unless_domains(&self) -> &[String] {
        self.unless_domain.as_deref().unwrap_or(&[])
    }

    /// Whether both domain lists are non-empty, which Safari rejects.
    pub fn has_conflicting_domains(&self) -> bool {
        !self.if_domains().is_empty() && !self.unless_domains().is_empty()
    }

    /// Prefix every domain with `*` so that subdomains match too.
    pub fn add_domain_wildcards(&mut self) {
        for list in [self.if_domain.as_mut(), self.unless_domain.as_mut()].into_iter().flatten() {
            for domain in list.iter_mut() {
                if !domain.starts_with('*') {
                    domain.insert(0, '*');
                }
            }
        }
    }
}

// =============================================================================
// Action
// =============================================================================

/// Effect of a content blocker rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionType {
    Block,
    CssDisplayNone,
    /// Extended CSS or style injection (advanced blocking)
    Css,
    /// Script injection (advanced blocking)
    Script,
    /// Scriptlet invocation (advanced blocking)
    Scriptlet,
    IgnorePreviousRules,
}

/// Action of a content blocker rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CbAction {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scriptlet: Option<String>,
    /// JSON-encoded `{ name, args }` object, kept as a string.
    #[serde(rename = "scriptletParam", default, skip_serializing_if = "Option::is_none")]
    pub scriptlet_param: Option<String>,
}

impl CbAction {
    pub fn new(action_type: ActionType) -> Self {
        Self {
            action_type,
            selector: None,
            css: None,
            script: None,
            scriptlet: None,
            scriptlet_param: None,
        }
    }
}

// =============================================================================
// Rule
// =============================================================================

/// One trigger/action pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CbRule {
    pub trigger: CbTrigger,
    pub action: CbAction,
}

impl CbRule {
    pub fn new(trigger: CbTrigger, action: CbAction) -> Self {
        Self { trigger, action }
    }
}

/// Serialize rules as a JSON array pretty-printed with tab indentation.
pub fn to_pretty_json(rules: &[CbRule]) -> serde_json::Result<String> {
    let mut out = Vec::with_capacity(rules.len() * 128);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    rules.serialize(&mut serializer)?;
    // serde_json only ever writes valid UTF-8
    Ok(String::from_utf8_lossy(&out).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_field_names() {
        let mut trigger = CbTrigger::new(".*");
        trigger.resource_type = Some(vec![ResourceType::StyleSheet, ResourceType::Raw]);
        trigger.load_type = Some(vec![LoadType::ThirdParty]);
        trigger.url_filter_is_case_sensitive = Some(true);
        trigger.if_domain = Some(vec!["example.org".to_string()]);
        let mut action = CbAction::new(ActionType::CssDisplayNone);
        action.selector = Some(".banner".to_string());

        let value = serde_json::to_value(CbRule::new(trigger, action)).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "trigger": {
                    "url-filter": ".*",
                    "resource-type": ["style-sheet", "raw"],
                    "load-type": ["third-party"],
                    "url-filter-is-case-sensitive": true,
                    "if-domain": ["example.org"]
                },
                "action": { "type": "css-display-none", "selector": ".banner" }
            })
        );
    }

    #[test]
    fn test_pretty_json_uses_tabs() {
        let rule = CbRule::new(CbTrigger::new(".*"), CbAction::new(ActionType::IgnorePreviousRules));
        let json = to_pretty_json(&[rule]).unwrap();
        assert!(json.starts_with("[\n\t{\n\t\t\"trigger\""));
        assert!(json.contains("\"type\": \"ignore-previous-rules\""));
        assert_eq!(to_pretty_json(&[]).unwrap(), "[]");
    }

    #[test]
    fn test_domain_wildcards() {
        let mut trigger = CbTrigger::new(".*");
        trigger.if_domain = Some(vec!["a.com".to_string(), "*b.com".to_string()]);
        trigger.add_domain_wildcards();
        trigger.add_domain_wildcards();
        assert_eq!(trigger.if_domains(), ["*a.com", "*b.com"]);
        assert!(!trigger.has_conflicting_domains());
    }
}
