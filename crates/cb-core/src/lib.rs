//! Safari Content Blocker Converter Core Library
//!
//! This crate provides the leaf building blocks of the converter: the
//! rule-level bit masks, the string and domain helpers, the wildcard
//! pattern compiler and the Safari content blocker data model.
//!
//! # Modules
//!
//! - `types`: Content type / rule option bit masks and the rule marker table
//! - `strings`: Escape-aware splitting and scanning helpers
//! - `domain`: Punycode normalization and top-level-domain wildcard expansion
//! - `simple_regex`: Wildcard/anchor pattern to regular expression compiler
//! - `safari`: Trigger/action objects of the Safari content blocker format

pub mod domain;
pub mod safari;
pub mod simple_regex;
pub mod strings;
pub mod types;

// Re-export commonly used types
pub use domain::{resolve_tld_wildcards, to_punycode, TOP_LEVEL_DOMAINS};
pub use safari::{to_pretty_json, ActionType, CbAction, CbRule, CbTrigger, LoadType, ResourceType};
pub use simple_regex::create_regex_text;
pub use types::{find_rule_marker, ContentType, MarkerKind, RuleMarker, RuleOptions};
