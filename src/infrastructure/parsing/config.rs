//! Selector chain configuration
//!
//! Each field is an ordered rule list; the first rule that matches wins. A rule
//! is either a CSS selector or an attribute pattern written
//! `[css]@attribute=~regex` (elements under `css`, default any element, whose
//! attribute matches the regex).

use serde::{Deserialize, Serialize};

/// Ordered extraction rules for listing and detail pages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Item rows on a series listing page
    pub rows: Vec<String>,
    /// Detail link inside a row
    pub link: Vec<String>,
    /// Display name inside a row
    pub name: Vec<String>,

    pub title: Vec<String>,
    pub denomination: Vec<String>,
    pub variety: Vec<String>,
    pub mintage: Vec<String>,
    pub cross_reference: Vec<String>,
    pub price_table: Vec<String>,
}

fn rules(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            rows: rules(&[
                ".pcgs-table tbody tr",
                ".coin-list-item",
                "[data-pcgs-number]",
                ".coinfacts-list tr",
                "table.coins tbody tr",
                ".coin-row",
                "div[data-coin-id]",
            ]),
            link: rules(&[
                r#"a[href*="/coin/detail/"]"#,
                r#"a[href*="/coinfacts/coin/"]"#,
                "a.coin-link",
                "a[data-pcgs]",
                r"a@href=~(?i)pcgs[_-]?(?:number|num|id)[=:]\d+",
            ]),
            name: rules(&[
                ".coin-name",
                ".description",
                "td:first-child a",
                ".coin-title",
                ".coin-description",
                "[data-name]",
            ]),
            title: rules(&["h1.coin-title", "h1", ".coin-title", ".coin-name", ".page-title"]),
            denomination: rules(&["[data-denomination]", ".denomination", ".coin-denomination", ".denom"]),
            variety: rules(&[".variety", ".coin-variety", ".variety-name", "[data-variety]"]),
            mintage: rules(&["[data-mintage]", ".mintage", ".coin-mintage", ".mint-info"]),
            cross_reference: rules(&["[data-ngc-number]", ".ngc-number", ".ngc-cert", "span.ngc"]),
            price_table: rules(&[
                ".price-guide-table",
                ".pcgs-price-guide",
                "table.prices",
                "table.price-guide",
                "#price-guide table",
                "table",
            ]),
        }
    }
}
