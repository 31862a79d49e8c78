//! Item detail page parser

use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use tracing::debug;

use super::config::SelectorConfig;
use super::error::{ParsingError, ParsingResult};
use super::patterns::{parse_first_number, parse_grade, parse_grouped_number, parse_price};
use super::selector_chain::{Extractor, SelectorChain, element_text};
use crate::domain::item::{DetailPage, ExternalId, GradeCode, Price};

pub struct DetailParser {
    title: SelectorChain,
    denomination: SelectorChain,
    variety: SelectorChain,
    mintage: SelectorChain,
    cross_reference: SelectorChain,
    price_table: SelectorChain,
    table_row: Selector,
    table_cell: Selector,
}

impl DetailParser {
    pub fn new(config: &SelectorConfig) -> ParsingResult<Self> {
        Ok(Self {
            title: SelectorChain::compile("title", &config.title)?,
            denomination: SelectorChain::compile("denomination", &config.denomination)?,
            variety: SelectorChain::compile("variety", &config.variety)?,
            mintage: SelectorChain::compile("mintage", &config.mintage)?,
            cross_reference: SelectorChain::compile("cross_reference", &config.cross_reference)?,
            price_table: SelectorChain::compile("price_table", &config.price_table)?,
            table_row: fixed_selector("tr")?,
            table_cell: fixed_selector("td, th")?,
        })
    }

    /// Every field is optional; a page matching nothing yields an empty record
    pub fn parse(&self, html: &str, external_id: ExternalId, extractor: &Extractor) -> DetailPage {
        let document = Html::parse_document(html);
        let root = document.root_element();
        let text_of = |chain: &SelectorChain| {
            extractor
                .extract_one(root, chain)
                .map(element_text)
                .filter(|text| !text.is_empty())
        };

        let prices = extractor
            .extract_one(root, &self.price_table)
            .map(|table| self.parse_price_table(table))
            .unwrap_or_default();
        debug!("Item {}: {} grade prices", external_id, prices.len());

        DetailPage {
            external_id,
            title: text_of(&self.title),
            denomination: text_of(&self.denomination),
            variety: text_of(&self.variety),
            mintage: text_of(&self.mintage).and_then(|t| parse_grouped_number(&t)),
            cross_reference_id: text_of(&self.cross_reference).and_then(|t| parse_first_number(&t)),
            prices,
        }
    }

    fn parse_price_table(&self, table: ElementRef<'_>) -> BTreeMap<GradeCode, Price> {
        let mut prices = BTreeMap::new();
        for row in table.select(&self.table_row) {
            let cells: Vec<String> = row.select(&self.table_cell).map(element_text).collect();
            if cells.len() < 2 {
                continue;
            }
            if let (Some(grade), Some(price)) = (parse_grade(&cells[0]), parse_price(&cells[1])) {
                prices.insert(grade, price);
            }
        }
        prices
    }
}

fn fixed_selector(source: &str) -> ParsingResult<Selector> {
    Selector::parse(source).map_err(|e| ParsingError::InvalidSelector {
        selector: source.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAIL: &str = r#"
        <html><body>
          <h1 class="coin-title">1881-S Morgan Dollar</h1>
          <div class="denomination">$1</div>
          <div class="mintage">Mintage: 12,760,000</div>
          <span class="ngc-number">NGC 84952</span>
          <table class="price-guide-table">
            <tr><th>Grade</th><th>Price</th></tr>
            <tr><td>MS65</td><td>$1,250.00</td></tr>
            <tr><td>ms66</td><td>$ 400</td></tr>
            <tr><td>Details</td><td>$99</td></tr>
            <tr><td>PR70</td></tr>
          </table>
        </body></html>"#;

    #[test]
    fn parses_fields_and_price_table() {
        let parser = DetailParser::new(&SelectorConfig::default()).unwrap();
        let page = parser.parse(DETAIL, 7172, &Extractor::new());

        assert_eq!(page.external_id, 7172);
        assert_eq!(page.title.as_deref(), Some("1881-S Morgan Dollar"));
        assert_eq!(page.denomination.as_deref(), Some("$1"));
        assert_eq!(page.variety, None);
        assert_eq!(page.mintage, Some(12_760_000));
        assert_eq!(page.cross_reference_id, Some(84_952));
        assert_eq!(page.prices.len(), 2);
        assert_eq!(page.prices.get(&GradeCode::new("MS65")), Some(&Price::from_cents(125_000)));
        assert_eq!(page.prices.get(&GradeCode::new("MS66")), Some(&Price::from_cents(40_000)));
    }

    #[test]
    fn generic_table_is_last_resort() {
        let html = "<h1>Proof</h1><table><tr><td>PR69</td><td>$80</td></tr></table>";
        let extractor = Extractor::new();
        let page = DetailParser::new(&SelectorConfig::default())
            .unwrap()
            .parse(html, 9001, &extractor);

        assert_eq!(page.prices.get(&GradeCode::new("PR69")), Some(&Price::from_cents(8_000)));
        assert_eq!(extractor.audit().last_fired.get("price_table").map(String::as_str), Some("table"));
    }

    #[test]
    fn empty_page_yields_empty_record() {
        let page = DetailParser::new(&SelectorConfig::default())
            .unwrap()
            .parse("<html></html>", 5, &Extractor::new());
        assert_eq!(page, DetailPage { external_id: 5, ..DetailPage::default() });
    }
}
