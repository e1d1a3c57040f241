//! Conversion pipeline
//!
//! Rules go through three stages:
//!
//! 1. parse: text to [`FilterRule`], `$badfilter` rules registered,
//! 2. emit: each remaining rule to one Safari rule, sorted into buckets,
//! 3. aggregate: exceptions applied, CSS compacted, the two outputs
//!    assembled in their fixed order, limit enforced.
//!
//! [`ConversionJob`] runs the first two stages in bounded slices so a host
//! event loop can stay responsive; [`convert_array`] is the same job run to
//! completion.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use cb_core::safari::{to_pretty_json, ActionType, CbRule};
use cb_core::types::RuleOptions;

use crate::diagnostics::Diagnostics;
use crate::emitter::convert_ag_rule;
use crate::optimizer::{
    apply_action_exceptions, apply_domain_wildcards, collect_badfilters, compact_css_rules, ExceptionKey,
    ExceptionStats,
};
use crate::parser::parse_ag_rule;
use crate::rules::FilterRule;

pub const CONVERTER_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

// =============================================================================
// Options and Results
// =============================================================================

/// Conversion settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConvertOptions {
    /// Max number of rules in the basic output, 0 for no limit
    pub limit: usize,
    /// Drop wide CSS rules
    pub optimize: bool,
    /// Also produce the advanced blocking output
    pub advanced_blocking: bool,
    /// Rules processed per [`ConversionJob::step`], 0 for a single slice
    pub chunk_size: usize,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            limit: 0,
            optimize: false,
            advanced_blocking: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Counters collected over one conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionStats {
    pub input_rules: usize,
    pub parse_errors: usize,
    pub conversion_errors: usize,
    pub badfilter_rules: usize,
    pub badfiltered_rules: usize,
    pub exceptions_applied: usize,
    /// Rules dropped because an exception left them with both domain lists
    pub exception_conflicts: usize,
}

impl ConversionStats {
    fn add_exceptions(&mut self, stats: ExceptionStats) {
        self.exceptions_applied += stats.applied;
        self.exception_conflicts += stats.conflicts;
    }
}

/// Output of a conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResult {
    /// Basic rules before the limit was applied
    pub total_converted_count: usize,
    pub converted_count: usize,
    pub errors_count: usize,
    pub over_limit: bool,
    /// Basic content blocker JSON
    pub converted: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advanced_blocking: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advanced_blocking_converted_count: Option<usize>,
    pub errors: Vec<String>,
    pub stats: ConversionStats,
}

/// A rule to convert, either as text or already parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleSource {
    Text(String),
    Parsed(FilterRule),
}

impl From<&str> for RuleSource {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for RuleSource {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<FilterRule> for RuleSource {
    fn from(rule: FilterRule) -> Self {
        Self::Parsed(rule)
    }
}

// =============================================================================
// Buckets
// =============================================================================

/// Emitted rules grouped by category, in emission order.
#[derive(Debug, Default)]
struct Buckets {
    css_blocking: Vec<CbRule>,
    css_exceptions: Vec<CbRule>,
    extended_css_blocking: Vec<CbRule>,
    cosmetic_css_exceptions: Vec<CbRule>,
    script: Vec<CbRule>,
    script_exceptions: Vec<CbRule>,
    scriptlets: Vec<CbRule>,
    scriptlet_exceptions: Vec<CbRule>,
    css_generic_hide_exceptions: Vec<CbRule>,
    css_elemhide: Vec<CbRule>,
    script_jsinject_exceptions: Vec<CbRule>,
    url_blocking: Vec<CbRule>,
    important: Vec<CbRule>,
    important_exceptions: Vec<CbRule>,
    document_exceptions: Vec<CbRule>,
    other: Vec<CbRule>,
}

impl Buckets {
    fn push(&mut self, rule: &FilterRule, item: CbRule) {
        let url = rule.as_url();
        let single_option = |option: RuleOptions| url.is_some_and(|url| url.is_single_option(option));

        let bucket = match item.action.action_type {
            ActionType::Block if rule.is_important() => &mut self.important,
            ActionType::Block => &mut self.url_blocking,
            ActionType::CssDisplayNone => &mut self.css_blocking,
            ActionType::Css => &mut self.extended_css_blocking,
            ActionType::Script => &mut self.script,
            ActionType::Scriptlet => &mut self.scriptlets,
            ActionType::IgnorePreviousRules => match rule {
                FilterRule::Script(_) => &mut self.script_exceptions,
                FilterRule::Scriptlet(_) => &mut self.scriptlet_exceptions,
                _ if item.action.selector.as_deref().is_some_and(|s| !s.is_empty()) => &mut self.css_exceptions,
                _ if item.action.css.as_deref().is_some_and(|s| !s.is_empty()) => {
                    &mut self.cosmetic_css_exceptions
                }
                _ if single_option(RuleOptions::GENERICHIDE) => &mut self.css_generic_hide_exceptions,
                _ if single_option(RuleOptions::ELEMHIDE) => &mut self.css_elemhide,
                _ if single_option(RuleOptions::JSINJECT) => &mut self.script_jsinject_exceptions,
                _ if rule.is_important() => &mut self.important_exceptions,
                _ if url.is_some_and(|url| url.is_document_whitelist()) => &mut self.document_exceptions,
                _ => &mut self.other,
            },
        };
        bucket.push(item);
    }
}

/// Buckets after exceptions and compaction, ready for assembly.
#[derive(Debug, Default)]
struct ContentBlocker {
    css_blocking_wide: Vec<CbRule>,
    css_blocking_generic_domain_sensitive: Vec<CbRule>,
    css_blocking_domain_sensitive: Vec<CbRule>,
    extended_css_blocking_wide: Vec<CbRule>,
    extended_css_blocking_generic_domain_sensitive: Vec<CbRule>,
    extended_css_blocking_domain_sensitive: Vec<CbRule>,
    script: Vec<CbRule>,
    scriptlets: Vec<CbRule>,
}

// =============================================================================
// Conversion Job
// =============================================================================

/// Where a [`ConversionJob`] stands after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobProgress {
    Parsing { processed: usize, total: usize },
    Emitting { processed: usize, total: usize },
    Done,
}

/// Conversion work queue drained in bounded slices.
///
/// Output does not depend on the slice size.
#[derive(Debug)]
pub struct ConversionJob {
    options: ConvertOptions,
    queue: VecDeque<RuleSource>,
    input_len: usize,
    started: bool,
    parsed: Vec<FilterRule>,
    badfilters: HashSet<String>,
    emitted: usize,
    buckets: Buckets,
    errors: Vec<String>,
    stats: ConversionStats,
}

impl ConversionJob {
    pub fn new(rules: Vec<RuleSource>, options: ConvertOptions) -> Self {
        let input_len = rules.len();
        Self {
            options,
            queue: rules.into(),
            input_len,
            started: false,
            parsed: Vec::new(),
            badfilters: HashSet::new(),
            emitted: 0,
            buckets: Buckets::default(),
            errors: Vec::new(),
            stats: ConversionStats {
                input_rules: input_len,
                ..ConversionStats::default()
            },
        }
    }

    fn chunk_size(&self) -> usize {
        match self.options.chunk_size {
            0 => usize::MAX,
            size => size,
        }
    }

    pub fn is_done(&self) -> bool {
        self.queue.is_empty() && self.emitted >= self.parsed.len()
    }

    /// Process one slice of at most `chunk_size` rules.
    ///
    /// All rules are parsed before any is emitted, so that a `$badfilter`
    /// rule cancels matching rules wherever it appears in the input.
    pub fn step(&mut self, diagnostics: &mut Diagnostics) -> JobProgress {
        if !self.started {
            self.started = true;
            diagnostics.info(format!("Safari Content Blocker Converter v{}", CONVERTER_VERSION));
            diagnostics.info(format!(
                "Converting {} rules. Optimize={}",
                self.input_len, self.options.optimize
            ));
        }

        let chunk_size = self.chunk_size();
        if !self.queue.is_empty() {
            let count = chunk_size.min(self.queue.len());
            let sources: Vec<RuleSource> = self.queue.drain(..count).collect();
            self.parse_slice(sources, diagnostics);
            return JobProgress::Parsing {
                processed: self.input_len - self.queue.len(),
                total: self.input_len,
            };
        }

        if self.emitted < self.parsed.len() {
            let end = self.emitted.saturating_add(chunk_size).min(self.parsed.len());
            for idx in self.emitted..end {
                self.emit_rule(idx, diagnostics);
            }
            self.emitted = end;
            return JobProgress::Emitting {
                processed: self.emitted,
                total: self.parsed.len(),
            };
        }

        JobProgress::Done
    }

    fn parse_slice(&mut self, sources: Vec<RuleSource>, diagnostics: &mut Diagnostics) {
        let mut rules = Vec::with_capacity(sources.len());
        for source in sources {
            match source {
                RuleSource::Parsed(rule) => rules.push(rule),
                RuleSource::Text(text) => match parse_ag_rule(&text) {
                    Ok(Some(rule)) => rules.push(rule),
                    Ok(None) => {}
                    Err(err) => {
                        let message = format!("Error creating rule from: {} cause: {}", text, err);
                        diagnostics.debug(message.clone());
                        self.errors.push(message);
                        self.stats.parse_errors += 1;
                    }
                },
            }
        }

        let registered = self.badfilters.len();
        let rules = collect_badfilters(rules, &mut self.badfilters);
        self.stats.badfilter_rules += self.badfilters.len() - registered;
        self.parsed.extend(rules);
    }

    fn emit_rule(&mut self, idx: usize, diagnostics: &mut Diagnostics) {
        let rule = &self.parsed[idx];
        if self.badfilters.contains(rule.rule_text()) {
            diagnostics.info(format!("Rule {} removed with a $badfilter modifier", rule.rule_text()));
            self.stats.badfiltered_rules += 1;
            return;
        }

        match convert_ag_rule(rule, diagnostics) {
            Ok(item) => self.buckets.push(rule, item),
            Err(err) => {
                let message = format!("Error converting rule from: {} cause: {}", rule.rule_text(), err);
                diagnostics.debug(message.clone());
                self.errors.push(message);
                self.stats.conversion_errors += 1;
            }
        }
    }

    /// Run the remaining steps and assemble the result.
    ///
    /// Returns `None` when there was nothing to convert.
    pub fn finish(mut self, diagnostics: &mut Diagnostics) -> Option<ConversionResult> {
        if self.input_len == 0 {
            diagnostics.info("No rules presented for conversion");
            return None;
        }

        while self.step(diagnostics) != JobProgress::Done {}

        let content_blocker = self.aggregate(diagnostics);
        Some(self.create_result(content_blocker, diagnostics))
    }

    fn aggregate(&mut self, diagnostics: &mut Diagnostics) -> ContentBlocker {
        let buckets = &mut self.buckets;
        let mut content_blocker = ContentBlocker::default();

        let (css_blocking, stats) = apply_action_exceptions(
            std::mem::take(&mut buckets.css_blocking),
            &buckets.css_exceptions,
            ExceptionKey::Selector,
            diagnostics,
        );
        self.stats.add_exceptions(stats);

        let compacted = compact_css_rules(css_blocking, true, diagnostics);
        if !self.options.optimize {
            content_blocker.css_blocking_wide = compacted.wide;
        }
        content_blocker.css_blocking_generic_domain_sensitive = compacted.generic_domain_sensitive;
        content_blocker.css_blocking_domain_sensitive = compacted.domain_sensitive;

        if self.options.advanced_blocking {
            let css_exceptions: Vec<CbRule> = buckets
                .css_exceptions
                .iter()
                .chain(&buckets.cosmetic_css_exceptions)
                .cloned()
                .collect();
            let (extended, stats) = apply_action_exceptions(
                std::mem::take(&mut buckets.extended_css_blocking),
                &css_exceptions,
                ExceptionKey::Css,
                diagnostics,
            );
            self.stats.add_exceptions(stats);

            let compacted = compact_css_rules(extended, false, diagnostics);
            if !self.options.optimize {
                content_blocker.extended_css_blocking_wide = compacted.wide;
            }
            content_blocker.extended_css_blocking_generic_domain_sensitive = compacted.generic_domain_sensitive;
            content_blocker.extended_css_blocking_domain_sensitive = compacted.domain_sensitive;

            let (script, stats) = apply_action_exceptions(
                std::mem::take(&mut buckets.script),
                &buckets.script_exceptions,
                ExceptionKey::Script,
                diagnostics,
            );
            self.stats.add_exceptions(stats);
            content_blocker.script = script;

            let (scriptlets, stats) = apply_action_exceptions(
                std::mem::take(&mut buckets.scriptlets),
                &buckets.scriptlet_exceptions,
                ExceptionKey::Scriptlet,
                diagnostics,
            );
            self.stats.add_exceptions(stats);
            content_blocker.scriptlets = scriptlets;
        }

        let errors = self.errors.len();
        let summary = [
            ("Basic rules", buckets.url_blocking.len()),
            ("Basic important rules", buckets.important.len()),
            ("Elemhide rules (wide)", content_blocker.css_blocking_wide.len()),
            (
                "Elemhide rules (generic domain sensitive)",
                content_blocker.css_blocking_generic_domain_sensitive.len(),
            ),
            ("Exceptions Elemhide (wide)", buckets.css_generic_hide_exceptions.len()),
            ("Elemhide rules (domain-sensitive)", content_blocker.css_blocking_domain_sensitive.len()),
            ("Script rules", content_blocker.script.len()),
            ("Scriptlets rules", content_blocker.scriptlets.len()),
            ("Extended Css Elemhide rules (wide)", content_blocker.extended_css_blocking_wide.len()),
            (
                "Extended Css Elemhide rules (generic domain sensitive)",
                content_blocker.extended_css_blocking_generic_domain_sensitive.len(),
            ),
            (
                "Extended Css Elemhide rules (domain-sensitive)",
                content_blocker.extended_css_blocking_domain_sensitive.len(),
            ),
            ("Exceptions (elemhide)", buckets.css_elemhide.len()),
            ("Exceptions (important)", buckets.important_exceptions.len()),
            ("Exceptions (document)", buckets.document_exceptions.len()),
            ("Exceptions (jsinject)", buckets.script_jsinject_exceptions.len()),
            ("Exceptions (other)", buckets.other.len()),
        ];
        let mut message = format!(
            "Rules converted: {} ({} errors)",
            self.input_len.saturating_sub(errors),
            errors
        );
        for (name, count) in summary {
            message.push_str(&format!("\n{}: {}", name, count));
        }
        diagnostics.info(message);

        content_blocker
    }

    fn create_result(mut self, content_blocker: ContentBlocker, diagnostics: &mut Diagnostics) -> ConversionResult {
        let buckets = &self.buckets;

        let mut converted: Vec<CbRule> = [
            &content_blocker.css_blocking_wide,
            &content_blocker.css_blocking_generic_domain_sensitive,
            &buckets.css_generic_hide_exceptions,
            &content_blocker.css_blocking_domain_sensitive,
            &buckets.css_elemhide,
            &buckets.url_blocking,
            &buckets.other,
            &buckets.important,
            &buckets.important_exceptions,
            &buckets.document_exceptions,
        ]
        .into_iter()
        .flatten()
        .cloned()
        .collect();

        let total_converted_count = converted.len();
        let limit = self.options.limit;
        let over_limit = limit > 0 && converted.len() > limit;
        if over_limit {
            let message = format!("{} limit is achieved. Next rules will be ignored.", limit);
            diagnostics.error(message.clone());
            self.errors.push(message);
            converted.truncate(limit);
        }

        apply_domain_wildcards(&mut converted);
        diagnostics.info(format!("Content blocker length: {}", converted.len()));

        let mut advanced_blocking = None;
        let mut advanced_blocking_converted_count = None;
        if self.options.advanced_blocking {
            let mut advanced: Vec<CbRule> = [
                &content_blocker.script,
                &content_blocker.scriptlets,
                &buckets.script_jsinject_exceptions,
                &content_blocker.extended_css_blocking_wide,
                &content_blocker.extended_css_blocking_generic_domain_sensitive,
                &buckets.css_generic_hide_exceptions,
                &content_blocker.extended_css_blocking_domain_sensitive,
                &buckets.css_elemhide,
                &buckets.other,
                &buckets.important_exceptions,
                &buckets.document_exceptions,
            ]
            .into_iter()
            .flatten()
            .cloned()
            .collect();

            apply_domain_wildcards(&mut advanced);
            diagnostics.info(format!("Advanced Blocking length: {}", advanced.len()));

            advanced_blocking_converted_count = Some(advanced.len());
            advanced_blocking = Some(serialize_rules(&advanced, diagnostics));
        }

        ConversionResult {
            total_converted_count,
            converted_count: converted.len(),
            errors_count: self.errors.len(),
            over_limit,
            converted: serialize_rules(&converted, diagnostics),
            advanced_blocking,
            advanced_blocking_converted_count,
            errors: self.errors,
            stats: self.stats,
        }
    }
}

fn serialize_rules(rules: &[CbRule], diagnostics: &mut Diagnostics) -> String {
    match to_pretty_json(rules) {
        Ok(json) => json,
        Err(err) => {
            diagnostics.error(format!("Unable to serialize content blocker: {}", err));
            "[]".to_string()
        }
    }
}

// =============================================================================
// Entry Points
// =============================================================================

/// Convert rule texts into Safari content blocker JSON.
///
/// Returns `None` for an empty rule list.
pub fn convert_array<S: AsRef<str>>(
    rules: &[S],
    options: &ConvertOptions,
    diagnostics: &mut Diagnostics,
) -> Option<ConversionResult> {
    let sources = rules.iter().map(|rule| RuleSource::from(rule.as_ref())).collect();
    convert_rules(sources, options, diagnostics)
}

/// Convert a mix of rule texts and parsed rules.
pub fn convert_rules(
    rules: Vec<RuleSource>,
    options: &ConvertOptions,
    diagnostics: &mut Diagnostics,
) -> Option<ConversionResult> {
    ConversionJob::new(rules, options.clone()).finish(diagnostics)
}
