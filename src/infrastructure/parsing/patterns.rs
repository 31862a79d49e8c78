//! Text patterns applied to extracted markup

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::item::{ExternalId, GradeCode, Price};

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in pattern must compile")
}

static DETAIL_HREF_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)/coin/detail/(\d+)",
        r"(?i)/coinfacts/coin/(\d+)",
        r"(?i)pcgs[_-]?(?:number|num|id)[=:](\d+)",
        r"/(\d{4,8})(?:\?|$|/)",
    ]
    .into_iter()
    .map(compile)
    .collect()
});

static YEAR_PATTERNS: Lazy<Vec<Regex>> =
    Lazy::new(|| [r"\b(1[789]\d{2}|20[012]\d)\b", r"^(\d{4})"].into_iter().map(compile).collect());

static MINT_MARK_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"-([DSWOPC]+)\s", r"\s([DSWOPC])\s", r"\(([DSWOPC]+)\)"]
        .into_iter()
        .map(compile)
        .collect()
});

static GRADE: Lazy<Regex> =
    Lazy::new(|| compile(r"(?i)^(?:MS|PR|PF|AU|EF|XF|VF|F|VG|G|AG|FR|PO|SP|BN|RB|RD)\d+"));

static PRICE: Lazy<Regex> = Lazy::new(|| compile(r"\$?\s*([\d,]+(?:\.\d{2})?)"));

static GROUPED_DIGITS: Lazy<Regex> = Lazy::new(|| compile(r"[\d,]+"));

static DIGITS: Lazy<Regex> = Lazy::new(|| compile(r"\d+"));

/// Positive integer from a data attribute value
pub fn parse_id_attribute(value: &str) -> Option<ExternalId> {
    value.trim().parse::<ExternalId>().ok().filter(|id| *id > 0)
}

/// External id from a detail link, trying the known URL shapes in order
pub fn external_id_from_href(href: &str) -> Option<ExternalId> {
    DETAIL_HREF_PATTERNS.iter().find_map(|re| {
        re.captures(href)
            .and_then(|caps| caps.get(1))
            .and_then(|m| parse_id_attribute(m.as_str()))
    })
}

pub fn parse_year(name: &str) -> Option<i32> {
    YEAR_PATTERNS.iter().find_map(|re| {
        re.captures(name)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    })
}

pub fn parse_mint_mark(name: &str) -> Option<String> {
    MINT_MARK_PATTERNS.iter().find_map(|re| {
        re.captures(name)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    })
}

/// Grade code at the start of a price table cell
pub fn parse_grade(cell: &str) -> Option<GradeCode> {
    GRADE.find(cell.trim()).map(|m| GradeCode::new(m.as_str()))
}

/// First price-like amount in a price table cell
pub fn parse_price(cell: &str) -> Option<Price> {
    PRICE
        .captures(cell)
        .and_then(|caps| caps.get(1))
        .and_then(|m| Price::parse(m.as_str()))
}

/// First digit group, thousands separators removed (`"Mintage: 9,163,975"`)
pub fn parse_grouped_number(text: &str) -> Option<i64> {
    GROUPED_DIGITS
        .find_iter(text)
        .map(|m| m.as_str().replace(',', ""))
        .find(|digits| !digits.is_empty())
        .and_then(|digits| digits.parse().ok())
}

/// First run of digits
pub fn parse_first_number(text: &str) -> Option<i64> {
    DIGITS.find(text).and_then(|m| m.as_str().parse().ok())
}
