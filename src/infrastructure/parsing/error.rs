//! Parsing error types
//!
//! Raised only while compiling selector configuration. Extraction itself never
//! fails: a page that matches nothing yields empty results.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParsingError {
    #[error("Invalid CSS selector: {selector} - {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Invalid attribute pattern in rule '{rule}': {reason}")]
    InvalidPattern { rule: String, reason: String },

    #[error("Selector chain '{context}' has no valid rule (tried: {tried:?})")]
    EmptyChain { context: String, tried: Vec<String> },
}

pub type ParsingResult<T> = Result<T, ParsingError>;
