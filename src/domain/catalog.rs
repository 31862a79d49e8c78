//! Series catalog entries
//!
//! A catalog entry names one listing page on the catalog site. The catalog is
//! static configuration: it is built once at startup and never mutated.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Scraping priority tier, `P0` first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PriorityTier {
    P0,
    P1,
    P2,
    P3,
}

impl PriorityTier {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::P0 => "P0",
            Self::P1 => "P1",
            Self::P2 => "P2",
            Self::P3 => "P3",
        }
    }
}

impl fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriorityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "P0" => Ok(Self::P0),
            "P1" => Ok(Self::P1),
            "P2" => Ok(Self::P2),
            "P3" => Ok(Self::P3),
            other => Err(format!("unknown priority tier: {other}")),
        }
    }
}

/// One series listing on the catalog site
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Human readable series name, also stored on every item of the series
    pub name: String,
    /// URL slug, the natural key for series progress
    pub slug: String,
    /// Numeric category id used in the listing URL
    pub category_id: u32,
    pub priority: PriorityTier,
    /// Rough item count, informational only
    #[serde(default)]
    pub estimated_items: u32,
}

impl CatalogEntry {
    pub fn new(name: &str, slug: &str, category_id: u32, priority: PriorityTier, estimated_items: u32) -> Self {
        Self {
            name: name.to_string(),
            slug: slug.to_string(),
            category_id,
            priority,
            estimated_items,
        }
    }
}

/// Look up an entry by slug
pub fn find_by_slug<'a>(catalog: &'a [CatalogEntry], slug: &str) -> Option<&'a CatalogEntry> {
    catalog.iter().find(|entry| entry.slug == slug)
}

/// Look up an entry by series name
pub fn find_by_name<'a>(catalog: &'a [CatalogEntry], name: &str) -> Option<&'a CatalogEntry> {
    catalog.iter().find(|entry| entry.name == name)
}

/// Entries of one tier, or all entries, in catalog order
pub fn filter_by_priority(catalog: &[CatalogEntry], priority: Option<PriorityTier>) -> Vec<&CatalogEntry> {
    catalog
        .iter()
        .filter(|entry| priority.is_none_or(|p| entry.priority == p))
        .collect()
}

/// The built-in series catalog, ordered by priority tier.
pub fn default_catalog() -> Vec<CatalogEntry> {
    use PriorityTier::{P0, P1, P2, P3};

    let rows: &[(&str, &str, u32, PriorityTier, u32)] = &[
        // Modern bullion and key classics
        ("Silver Eagles", "silver-eagles", 833, P0, 45),
        ("Gold Eagles", "gold-eagles", 835, P0, 160),
        ("Platinum Eagles", "platinum-eagles", 838, P0, 120),
        ("American Gold Buffalo", "gold-buffalo", 836, P0, 40),
        ("Morgan Dollars", "morgan-dollars", 53, P0, 150),
        ("Peace Dollars", "peace-dollars", 54, P0, 30),
        ("Lincoln Cents Wheat Reverse", "lincoln-cents-wheat-reverse", 37, P0, 145),
        ("Mercury Dimes", "mercury-dimes", 45, P0, 80),
        ("Walking Liberty Halves", "walking-liberty-half-dollars", 58, P0, 65),
        // Popular collector series
        ("Jefferson Nickels", "jefferson-nickels", 39, P1, 250),
        ("Buffalo Nickels", "buffalo-nickels", 40, P1, 75),
        ("Roosevelt Dimes", "roosevelt-dimes", 44, P1, 200),
        ("Washington Quarters", "washington-quarters", 49, P1, 180),
        ("Standing Liberty Quarters", "standing-liberty-quarters", 50, P1, 40),
        ("Franklin Halves", "franklin-half-dollars", 57, P1, 35),
        ("Kennedy Half Dollars", "kennedy-half-dollars", 56, P1, 140),
        ("Eisenhower Dollars", "eisenhower-dollars", 62, P1, 35),
        ("Susan B. Anthony Dollars", "susan-b-anthony-dollars", 63, P1, 18),
        ("Sacagawea Dollars", "sacagawea-dollars", 64, P1, 55),
        ("Presidential Dollars", "presidential-dollars", 1041, P1, 80),
        ("State Quarters", "state-quarters", 850, P1, 112),
        ("America the Beautiful Quarters", "america-beautiful-quarters", 1040, P1, 120),
        // Complete 20th century
        ("Barber Dimes", "barber-dimes", 46, P2, 75),
        ("Barber Quarters", "barber-quarters", 51, P2, 75),
        ("Barber Half Dollars", "barber-half-dollars", 59, P2, 75),
        ("Indian Head Cents", "indian-head-cents", 36, P2, 70),
        ("Flying Eagle Cents", "flying-eagle-cents", 35, P2, 8),
        ("Lincoln Cents Memorial Reverse", "lincoln-cents-memorial", 38, P2, 200),
        ("Lincoln Cents Shield Reverse", "lincoln-cents-shield", 1038, P2, 35),
        ("Liberty Nickels", "liberty-nickels", 41, P2, 40),
        ("Shield Nickels", "shield-nickels", 42, P2, 30),
        ("Seated Liberty Dimes", "seated-liberty-dimes", 47, P2, 150),
        ("Seated Liberty Quarters", "seated-liberty-quarters", 52, P2, 140),
        ("Seated Liberty Half Dollars", "seated-liberty-half-dollars", 60, P2, 150),
        ("Seated Liberty Dollars", "seated-liberty-dollars", 66, P2, 45),
        ("Trade Dollars", "trade-dollars", 65, P2, 20),
        ("American Women Quarters", "american-women-quarters", 1050, P2, 25),
        ("American Innovation Dollars", "american-innovation-dollars", 1052, P2, 60),
        ("Palladium Eagles", "palladium-eagles", 840, P2, 12),
        // Early US, gold and commemoratives
        ("Large Cents", "large-cents", 33, P3, 200),
        ("Half Cents", "half-cents", 32, P3, 80),
        ("Bust Dimes", "bust-dimes", 48, P3, 50),
        ("Bust Quarters", "bust-quarters", 55, P3, 45),
        ("Bust Half Dollars", "bust-half-dollars", 61, P3, 180),
        ("Bust Dollars", "bust-dollars", 67, P3, 25),
        ("Three Cent Nickels", "three-cent-nickels", 43, P3, 25),
        ("Three Cent Silver", "three-cent-silver", 91, P3, 35),
        ("Two Cent Pieces", "two-cent-pieces", 92, P3, 15),
        ("Twenty Cent Pieces", "twenty-cent-pieces", 90, P3, 10),
        ("Half Dimes Seated", "half-dimes-seated", 93, P3, 80),
        ("Half Dimes Early", "half-dimes-early", 94, P3, 40),
        ("Gold Dollars", "gold-dollars", 70, P3, 60),
        ("$2.50 Liberty Quarter Eagles", "quarter-eagles-liberty", 71, P3, 100),
        ("$2.50 Indian Quarter Eagles", "quarter-eagles-indian", 72, P3, 25),
        ("$3 Gold Pieces", "three-dollar-gold", 73, P3, 45),
        ("$5 Liberty Half Eagles", "half-eagles-liberty", 74, P3, 160),
        ("$5 Indian Half Eagles", "half-eagles-indian", 75, P3, 25),
        ("$10 Liberty Eagles", "eagles-liberty", 76, P3, 130),
        ("$10 Indian Eagles", "eagles-indian", 77, P3, 35),
        ("$20 Liberty Double Eagles", "double-eagles-liberty", 78, P3, 120),
        ("$20 Saint-Gaudens Double Eagles", "double-eagles-saint-gaudens", 79, P3, 55),
        ("Early Gold $2.50-$10", "early-gold", 80, P3, 150),
        ("Classic Commemoratives", "classic-commemoratives", 100, P3, 180),
        ("Modern Commemoratives Silver", "modern-commemoratives-silver", 101, P3, 350),
        ("Modern Commemoratives Gold", "modern-commemoratives-gold", 102, P3, 120),
        ("Modern Commemoratives Clad", "modern-commemoratives-clad", 103, P3, 60),
        ("First Spouse Gold", "first-spouse-gold", 104, P3, 45),
    ];

    rows.iter()
        .map(|&(name, slug, category_id, priority, estimated)| {
            CatalogEntry::new(name, slug, category_id, priority, estimated)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn default_catalog_has_unique_slugs() {
        let catalog = default_catalog();
        let slugs: HashSet<_> = catalog.iter().map(|e| e.slug.as_str()).collect();
        assert_eq!(slugs.len(), catalog.len());
        assert_eq!(catalog.len(), 67);
    }

    #[test]
    fn default_catalog_is_ordered_by_tier() {
        let catalog = default_catalog();
        assert!(catalog.windows(2).all(|w| w[0].priority <= w[1].priority));
    }

    #[test]
    fn priority_filter_keeps_catalog_order() {
        let catalog = default_catalog();
        let p0 = filter_by_priority(&catalog, Some(PriorityTier::P0));
        assert_eq!(p0.len(), 9);
        assert_eq!(p0[0].slug, "silver-eagles");
        assert_eq!(filter_by_priority(&catalog, None).len(), catalog.len());
    }

    #[test]
    fn priority_tier_parses_case_insensitively() {
        assert_eq!("p2".parse::<PriorityTier>(), Ok(PriorityTier::P2));
        assert!("P9".parse::<PriorityTier>().is_err());
    }
}
