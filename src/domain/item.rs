//! Item records for each pipeline stage
//!
//! `ItemSummary` comes out of a listing page, `DetailPage` out of a detail page,
//! and `ItemDetail` is the merged record handed to persistence.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Catalog-site identifier of an item
pub type ExternalId = i64;

/// Exact money amount in minor units (cents)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Price(i64);

impl Price {
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Parse a decimal amount such as `1,234.50`, `$75` or `12.5`.
    ///
    /// Currency symbol and thousands separators are ignored. Digits past the
    /// second decimal place are truncated.
    pub fn parse(text: &str) -> Option<Self> {
        let cleaned: String = text
            .trim()
            .trim_start_matches('$')
            .chars()
            .filter(|c| *c != ',' && !c.is_whitespace())
            .collect();
        if cleaned.is_empty() {
            return None;
        }

        let (whole, fraction) = match cleaned.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (cleaned.as_str(), ""),
        };
        if whole.is_empty() && fraction.is_empty() {
            return None;
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }

        let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
        let cents: i64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().ok()? * 10,
            _ => fraction[..2].parse().ok()?,
        };
        whole.checked_mul(100)?.checked_add(cents).map(Self)
    }

    /// Convert a JSON number from the price API
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        Self::parse(&format!("{value:.2}"))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// Normalized grade code such as `MS65` or `PR70`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GradeCode(String);

impl GradeCode {
    pub fn new(code: &str) -> Self {
        Self(code.trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GradeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A row recovered from a series listing page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub external_id: ExternalId,
    pub year: Option<i32>,
    pub mint_mark: Option<String>,
    pub series_name: String,
    pub display_name: String,
}

/// Fields recovered from an item's detail page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailPage {
    pub external_id: ExternalId,
    pub title: Option<String>,
    pub denomination: Option<String>,
    pub variety: Option<String>,
    pub mintage: Option<i64>,
    pub cross_reference_id: Option<i64>,
    pub prices: BTreeMap<GradeCode, Price>,
}

/// Listing and detail data merged into one persistable record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDetail {
    pub external_id: ExternalId,
    pub year: Option<i32>,
    pub mint_mark: Option<String>,
    pub series_name: String,
    pub display_name: String,
    pub denomination: Option<String>,
    pub variety: Option<String>,
    pub mintage: Option<i64>,
    pub cross_reference_id: Option<i64>,
    pub prices: BTreeMap<GradeCode, Price>,
}

impl ItemDetail {
    /// Merge a detail page into its listing summary. A non-empty detail title
    /// replaces the listing's display name.
    pub fn merge(summary: ItemSummary, page: DetailPage) -> Self {
        let display_name = page
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(summary.display_name);

        Self {
            external_id: summary.external_id,
            year: summary.year,
            mint_mark: summary.mint_mark,
            series_name: summary.series_name,
            display_name,
            denomination: page.denomination,
            variety: page.variety,
            mintage: page.mintage,
            cross_reference_id: page.cross_reference_id,
            prices: page.prices,
        }
    }

    /// Space separated search text built from the non-empty descriptive fields
    pub fn search_tokens(&self) -> String {
        let year = self.year.map(|y| y.to_string());
        [
            year.as_deref(),
            self.mint_mark.as_deref(),
            self.denomination.as_deref(),
            Some(self.series_name.as_str()),
            self.variety.as_deref(),
            Some(self.display_name.as_str()),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }
}

/// Fallback display name for rows without a readable name
pub fn placeholder_name(external_id: ExternalId) -> String {
    format!("#{external_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("$1,234.50", Some(123_450))]
    #[case("75", Some(7_500))]
    #[case("12.5", Some(1_250))]
    #[case(" $ 3,000 ", Some(300_000))]
    #[case("0.99", Some(99))]
    #[case("N/A", None)]
    #[case("", None)]
    #[case("$", None)]
    fn price_parsing(#[case] input: &str, #[case] expected: Option<i64>) {
        assert_eq!(Price::parse(input).map(Price::cents), expected);
    }

    #[test]
    fn price_from_api_number() {
        assert_eq!(Price::from_f64(1250.0), Some(Price::from_cents(125_000)));
        assert_eq!(Price::from_f64(-1.0), None);
        assert_eq!(Price::from_cents(123_405).to_string(), "1234.05");
    }

    fn summary() -> ItemSummary {
        ItemSummary {
            external_id: 7172,
            year: Some(1881),
            mint_mark: Some("S".to_string()),
            series_name: "Morgan Dollars".to_string(),
            display_name: "1881-S $1".to_string(),
        }
    }

    #[test]
    fn merge_prefers_detail_title() {
        let page = DetailPage {
            external_id: 7172,
            title: Some("1881-S Morgan Dollar".to_string()),
            denomination: Some("$1".to_string()),
            ..DetailPage::default()
        };
        let detail = ItemDetail::merge(summary(), page);
        assert_eq!(detail.display_name, "1881-S Morgan Dollar");
        assert_eq!(detail.denomination.as_deref(), Some("$1"));
        assert_eq!(detail.year, Some(1881));
    }

    #[test]
    fn merge_keeps_listing_name_when_title_blank() {
        let page = DetailPage {
            external_id: 7172,
            title: Some("   ".to_string()),
            ..DetailPage::default()
        };
        assert_eq!(ItemDetail::merge(summary(), page).display_name, "1881-S $1");
    }

    #[test]
    fn search_tokens_skip_missing_fields() {
        let detail = ItemDetail::merge(summary(), DetailPage::default());
        assert_eq!(detail.search_tokens(), "1881 S Morgan Dollars 1881-S $1");
    }
}
