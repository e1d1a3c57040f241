//! Safari Content Blocker Compiler
//!
//! This crate converts AdGuard-style filter rules into the Safari content
//! blocker JSON format, plus an "advanced blocking" JSON for the rules Safari
//! cannot express natively (extended CSS, scripts and scriptlets).
//!
//! # Modules
//!
//! - `rule_converter`: uBlock Origin / Adblock Plus syntax to canonical rule text
//! - `parser`: Rule text to typed [`FilterRule`] values
//! - `rules`: The typed rule model
//! - `emitter`: One parsed rule to one Safari trigger/action pair
//! - `optimizer`: Badfilter collection, exception propagation and CSS compaction
//! - `builder`: The conversion pipeline and its result
//! - `diagnostics`: Leveled messages collected during a conversion
//! - `error`: Per-rule errors

pub mod builder;
pub mod diagnostics;
pub mod emitter;
pub mod error;
pub mod optimizer;
pub mod parser;
pub mod rule_converter;
pub mod rules;

pub use builder::{
    convert_array, convert_rules, ConversionJob, ConversionResult, ConversionStats, ConvertOptions, JobProgress,
    RuleSource,
};
pub use diagnostics::{Diagnostic, Diagnostics};
pub use emitter::convert_ag_rule;
pub use error::{ErrorKind, RuleError};
pub use parser::{create_rule, parse_ag_rule};
pub use rule_converter::convert_rule;
pub use rules::FilterRule;
