//! Ordered rule chains with first-match-wins extraction
//!
//! A [`SelectorChain`] is compiled once from configuration. The [`Extractor`]
//! evaluates a chain against a scope element, stops at the first rule with a
//! non-empty result, and keeps an audit of which rule fired per context so
//! markup drift shows up as rules lower in the chain taking over.

use regex::Regex;
use scraper::{ElementRef, Selector};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

use super::error::{ParsingError, ParsingResult};

/// One candidate extraction rule
#[derive(Debug)]
pub enum Rule {
    /// Every element matching a CSS selector
    Css { source: String, selector: Selector },
    /// Elements whose attribute value matches a regex
    AttributePattern {
        source: String,
        selector: Selector,
        attribute: String,
        pattern: Regex,
    },
}

impl Rule {
    /// Compile `css` or `[css]@attribute=~regex`
    pub fn compile(source: &str) -> ParsingResult<Self> {
        let source = source.trim();
        let attribute_rule = source
            .split_once("=~")
            .and_then(|(target, pattern)| target.rsplit_once('@').map(|(css, attr)| (css, attr, pattern)));
        if let Some((css, attribute, pattern)) = attribute_rule {
            let attribute = attribute.trim();
            if attribute.is_empty() {
                return Err(ParsingError::InvalidPattern {
                    rule: source.to_string(),
                    reason: "missing attribute name".to_string(),
                });
            }
            let css = css.trim();
            let scope = if css.is_empty() { "*" } else { css };
            let selector = parse_selector(&format!("{scope}[{attribute}]"))?;
            let pattern = Regex::new(pattern).map_err(|e| ParsingError::InvalidPattern {
                rule: source.to_string(),
                reason: e.to_string(),
            })?;
            return Ok(Self::AttributePattern {
                source: source.to_string(),
                selector,
                attribute: attribute.to_string(),
                pattern,
            });
        }

        Ok(Self::Css {
            source: source.to_string(),
            selector: parse_selector(source)?,
        })
    }

    pub fn source(&self) -> &str {
        match self {
            Self::Css { source, .. } | Self::AttributePattern { source, .. } => source,
        }
    }

    /// Matching descendants of `scope`, in document order
    pub fn select<'a>(&self, scope: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        match self {
            Self::Css { selector, .. } => scope.select(selector).collect(),
            Self::AttributePattern {
                selector,
                attribute,
                pattern,
                ..
            } => scope
                .select(selector)
                .filter(|el| el.value().attr(attribute).is_some_and(|v| pattern.is_match(v)))
                .collect(),
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source())
    }
}

fn parse_selector(source: &str) -> ParsingResult<Selector> {
    Selector::parse(source).map_err(|e| ParsingError::InvalidSelector {
        selector: source.to_string(),
        reason: e.to_string(),
    })
}

/// Named, ordered list of rules
#[derive(Debug)]
pub struct SelectorChain {
    context: String,
    rules: Vec<Rule>,
}

impl SelectorChain {
    /// Compile a chain, skipping invalid rules with a warning. A chain left
    /// with no valid rule is an error.
    pub fn compile(context: &str, sources: &[String]) -> ParsingResult<Self> {
        let mut rules = Vec::with_capacity(sources.len());
        for source in sources {
            match Rule::compile(source) {
                Ok(rule) => rules.push(rule),
                Err(e) => warn!("Skipping selector rule for '{}': {}", context, e),
            }
        }

        if rules.is_empty() {
            return Err(ParsingError::EmptyChain {
                context: context.to_string(),
                tried: sources.to_vec(),
            });
        }
        Ok(Self {
            context: context.to_string(),
            rules,
        })
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

/// Which rules fired, per context
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SelectorAudit {
    /// Cumulative hit counts keyed `"{context}:{rule}"`
    pub hits: BTreeMap<String, u64>,
    /// Last rule that fired for each context
    pub last_fired: BTreeMap<String, String>,
    /// Evaluations where no rule matched
    pub misses: BTreeMap<String, u64>,
}

impl SelectorAudit {
    /// Most frequent hits, highest first
    pub fn top_hits(&self, limit: usize) -> Vec<(String, u64)> {
        let mut hits: Vec<(String, u64)> = self.hits.iter().map(|(k, v)| (k.clone(), *v)).collect();
        hits.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        hits.truncate(limit);
        hits
    }
}

/// Evaluates chains and records the audit
#[derive(Debug, Default)]
pub struct Extractor {
    audit: Mutex<SelectorAudit>,
}

impl Extractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// All matches of the first rule that matches anything
    pub fn extract_list<'a>(&self, scope: ElementRef<'a>, chain: &SelectorChain) -> Vec<ElementRef<'a>> {
        for rule in chain.rules() {
            let matches = rule.select(scope);
            if !matches.is_empty() {
                debug!("Selector '{}' fired for {} ({} matches)", rule, chain.context(), matches.len());
                self.record_hit(chain.context(), rule.source());
                return matches;
            }
        }
        self.record_miss(chain.context());
        Vec::new()
    }

    /// First match of the first rule that matches anything
    pub fn extract_one<'a>(&self, scope: ElementRef<'a>, chain: &SelectorChain) -> Option<ElementRef<'a>> {
        for rule in chain.rules() {
            if let Some(first) = rule.select(scope).into_iter().next() {
                self.record_hit(chain.context(), rule.source());
                return Some(first);
            }
        }
        self.record_miss(chain.context());
        None
    }

    pub fn audit(&self) -> SelectorAudit {
        self.audit.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn record_hit(&self, context: &str, rule: &str) {
        let mut audit = self.audit.lock().unwrap_or_else(PoisonError::into_inner);
        *audit.hits.entry(format!("{context}:{rule}")).or_insert(0) += 1;
        audit.last_fired.insert(context.to_string(), rule.to_string());
    }

    fn record_miss(&self, context: &str) {
        let mut audit = self.audit.lock().unwrap_or_else(PoisonError::into_inner);
        *audit.misses.entry(context.to_string()).or_insert(0) += 1;
    }
}

/// Visible text of an element, whitespace-normalized
pub fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
