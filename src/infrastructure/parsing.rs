//! HTML extraction for catalog pages
//!
//! Selector chains compiled from [`SelectorConfig`], a shared [`Extractor`]
//! that audits which rules fired, and parsers for listing and detail pages.
//! Parsing is synchronous over owned strings so no DOM is held across an
//! await point.

pub mod config;
pub mod detail_parser;
pub mod error;
pub mod listing_parser;
pub mod patterns;
pub mod selector_chain;

pub use config::SelectorConfig;
pub use detail_parser::DetailParser;
pub use error::{ParsingError, ParsingResult};
pub use listing_parser::ListingParser;
pub use selector_chain::{Extractor, Rule, SelectorAudit, SelectorChain};

use crate::domain::item::{DetailPage, ExternalId, ItemSummary};

/// Listing and detail parsers sharing one extractor audit
pub struct CatalogPageParser {
    listing: ListingParser,
    detail: DetailParser,
    extractor: Extractor,
}

impl CatalogPageParser {
    pub fn new(config: &SelectorConfig) -> ParsingResult<Self> {
        Ok(Self {
            listing: ListingParser::new(config)?,
            detail: DetailParser::new(config)?,
            extractor: Extractor::new(),
        })
    }

    pub fn parse_listing(&self, html: &str, series_name: &str) -> Vec<ItemSummary> {
        self.listing.parse(html, series_name, &self.extractor)
    }

    pub fn parse_detail(&self, html: &str, external_id: ExternalId) -> DetailPage {
        self.detail.parse(html, external_id, &self.extractor)
    }

    pub fn audit(&self) -> SelectorAudit {
        self.extractor.audit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn misconfigured_chain_is_rejected() {
        let config = SelectorConfig {
            title: vec!["h1[".to_string()],
            ..SelectorConfig::default()
        };
        assert!(matches!(
            CatalogPageParser::new(&config),
            Err(ParsingError::EmptyChain { ref context, .. }) if context == "title"
        ));
    }

    #[test]
    fn audit_spans_listing_and_detail() {
        let parser = CatalogPageParser::new(&SelectorConfig::default()).unwrap();
        parser.parse_listing(r#"<div class="coin-row" data-coin-id="3"></div>"#, "S");
        parser.parse_detail("<h1>Title</h1>", 3);

        let audit = parser.audit();
        assert!(audit.last_fired.contains_key("rows"));
        assert_eq!(audit.last_fired.get("title").map(String::as_str), Some("h1"));
    }
}
