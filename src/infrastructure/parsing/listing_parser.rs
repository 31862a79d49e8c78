//! Series listing page parser
//!
//! Turns a listing page into [`ItemSummary`] rows. Rows without a
//! recoverable external id are dropped; duplicate ids keep the first row.

use scraper::{ElementRef, Html};
use std::collections::HashSet;
use tracing::{debug, warn};

use super::config::SelectorConfig;
use super::error::ParsingResult;
use super::patterns::{external_id_from_href, parse_id_attribute, parse_mint_mark, parse_year};
use super::selector_chain::{Extractor, SelectorChain, element_text};
use crate::domain::item::{ExternalId, ItemSummary, placeholder_name};

const ID_ATTRIBUTES: [&str; 2] = ["data-pcgs-number", "data-coin-id"];

pub struct ListingParser {
    rows: SelectorChain,
    link: SelectorChain,
    name: SelectorChain,
}

impl ListingParser {
    pub fn new(config: &SelectorConfig) -> ParsingResult<Self> {
        Ok(Self {
            rows: SelectorChain::compile("rows", &config.rows)?,
            link: SelectorChain::compile("link", &config.link)?,
            name: SelectorChain::compile("name", &config.name)?,
        })
    }

    /// Parse every item row of a listing page, in page order
    pub fn parse(&self, html: &str, series_name: &str, extractor: &Extractor) -> Vec<ItemSummary> {
        let document = Html::parse_document(html);
        let rows = extractor.extract_list(document.root_element(), &self.rows);
        if rows.is_empty() {
            warn!("No item rows found on listing page for {}", series_name);
            return Vec::new();
        }

        let mut seen = HashSet::new();
        let mut items = Vec::with_capacity(rows.len());
        let mut dropped = 0_usize;
        for row in rows {
            match self.parse_row(row, series_name, extractor) {
                Some(item) if seen.insert(item.external_id) => items.push(item),
                Some(item) => debug!("Duplicate item {} in {}, keeping first row", item.external_id, series_name),
                None => dropped += 1,
            }
        }

        if dropped > 0 {
            warn!("Dropped {} rows without an item id in {}", dropped, series_name);
        }
        debug!("Parsed {} items from {} listing", items.len(), series_name);
        items
    }

    fn parse_row(&self, row: ElementRef<'_>, series_name: &str, extractor: &Extractor) -> Option<ItemSummary> {
        let link = extractor.extract_one(row, &self.link);
        let external_id = Self::row_external_id(row, link)?;

        let display_name = extractor
            .extract_one(row, &self.name)
            .map(element_text)
            .filter(|text| !text.is_empty())
            .or_else(|| link.map(element_text).filter(|text| !text.is_empty()))
            .unwrap_or_else(|| placeholder_name(external_id));

        Some(ItemSummary {
            external_id,
            year: parse_year(&display_name),
            mint_mark: parse_mint_mark(&display_name),
            series_name: series_name.to_string(),
            display_name,
        })
    }

    fn row_external_id(row: ElementRef<'_>, link: Option<ElementRef<'_>>) -> Option<ExternalId> {
        ID_ATTRIBUTES
            .iter()
            .find_map(|attr| row.value().attr(attr).and_then(parse_id_attribute))
            .or_else(|| {
                link.and_then(|a| a.value().attr("href"))
                    .and_then(external_id_from_href)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><body>
          <table class="pcgs-table"><tbody>
            <tr data-pcgs-number="7172"><td><a href="/coin/detail/7172">1881-S $1</a></td><td>MS</td></tr>
            <tr><td><a href="/coinfacts/coin/detail/7130">1878 8TF $1</a></td></tr>
            <tr><td><span class="coin-name">1893-CC $1</span><a class="coin-link" href="/x?pcgs_num=7226">view</a></td></tr>
            <tr><td>Header row without link</td></tr>
            <tr data-pcgs-number="7172"><td>1881-S duplicate</td></tr>
          </tbody></table>
        </body></html>"#;

    fn parser() -> ListingParser {
        ListingParser::new(&SelectorConfig::default()).unwrap()
    }

    #[test]
    fn parses_rows_in_page_order() {
        let extractor = Extractor::new();
        let items = parser().parse(LISTING, "Morgan Dollars", &extractor);

        let ids: Vec<ExternalId> = items.iter().map(|i| i.external_id).collect();
        assert_eq!(ids, vec![7172, 7130, 7226]);

        assert_eq!(items[0].display_name, "1881-S $1");
        assert_eq!(items[0].year, Some(1881));
        assert_eq!(items[0].mint_mark.as_deref(), Some("S"));
        assert_eq!(items[0].series_name, "Morgan Dollars");

        assert_eq!(items[2].display_name, "1893-CC $1");
        assert_eq!(items[2].mint_mark.as_deref(), Some("CC"));
    }

    #[test]
    fn parsing_is_deterministic() {
        let extractor = Extractor::new();
        let first = parser().parse(LISTING, "Morgan Dollars", &extractor);
        let second = parser().parse(LISTING, "Morgan Dollars", &extractor);
        assert_eq!(first, second);
        assert_eq!(extractor.audit().hits.get("rows:.pcgs-table tbody tr"), Some(&2));
    }

    #[test]
    fn falls_back_to_placeholder_name() {
        let html = r#"<div class="coin-row" data-coin-id="101"></div>"#;
        let items = parser().parse(html, "Test Series", &Extractor::new());
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].display_name, "#101");
        assert_eq!(items[0].year, None);
    }

    #[test]
    fn page_without_rows_is_empty() {
        let extractor = Extractor::new();
        let items = parser().parse("<html><body><p>Maintenance</p></body></html>", "X", &extractor);
        assert!(items.is_empty());
        assert_eq!(extractor.audit().misses.get("rows"), Some(&1));
    }
}
