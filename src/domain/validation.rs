//! Record validation before persistence
//!
//! Pure checks over [`ItemDetail`]. Hard errors reject a record; soft findings
//! are warnings unless the validator runs in strict mode.

use chrono::{Datelike, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;

use super::item::{ExternalId, ItemDetail};

pub const MIN_YEAR: i32 = 1793;
pub const MAX_EXTERNAL_ID: ExternalId = 999_999_999;

/// Known denomination labels
pub const VALID_DENOMINATIONS: &[&str] = &[
    "1C", "1¢", "One Cent", "Cent", "Half Cent", "1/2C",
    "5C", "5¢", "Five Cent", "Nickel", "Three Cent", "3C", "3CN", "3CS",
    "10C", "10¢", "Dime", "Ten Cent", "Half Dime", "H10C",
    "25C", "25¢", "Quarter", "Twenty Cent", "20C",
    "50C", "50¢", "Half Dollar", "Half",
    "$1", "Dollar", "Trade Dollar", "T$1",
    "$2.50", "Quarter Eagle", "$3", "Three Dollar",
    "$5", "Half Eagle", "$10", "Eagle",
    "$20", "Double Eagle", "$50",
    "1 oz", "1/2 oz", "1/4 oz", "1/10 oz",
    "1 oz Silver", "1 oz Gold", "1 oz Platinum", "1 oz Palladium",
];

/// Substrings that make an unknown denomination acceptable
pub const DENOMINATION_HINTS: &[&str] = &[
    "CENT", "DOLLAR", "OZ", "EAGLE", "DIME", "QUARTER", "HALF", "NICKEL",
];

pub const VALID_MINT_MARKS: &[&str] = &["P", "D", "S", "O", "CC", "W", "C", "D/S", "S/D"];

/// One problem found on one field of one record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFinding {
    pub field: String,
    pub message: String,
    pub value: Option<String>,
    pub subject_id: Option<ExternalId>,
}

impl ValidationFinding {
    fn new(field: &str, message: impl Into<String>, value: Option<String>, subject_id: ExternalId) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
            value,
            subject_id: (subject_id != 0).then_some(subject_id),
        }
    }
}

/// Result of validating a single record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub errors: Vec<ValidationFinding>,
    pub warnings: Vec<ValidationFinding>,
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// First error message, for progress bookkeeping
    pub fn first_error(&self) -> Option<String> {
        self.errors.first().map(|e| format!("{}: {}", e.field, e.message))
    }
}

/// Aggregate over a batch of records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub errors: Vec<ValidationFinding>,
    pub warnings: Vec<ValidationFinding>,
}

impl ValidationReport {
    /// Errors grouped by field name, in field order
    pub fn errors_by_field(&self) -> BTreeMap<&str, Vec<&ValidationFinding>> {
        let mut grouped: BTreeMap<&str, Vec<&ValidationFinding>> = BTreeMap::new();
        for finding in &self.errors {
            grouped.entry(finding.field.as_str()).or_default().push(finding);
        }
        grouped
    }

    /// Plain-text summary: counts, up to 3 errors per field, up to 5 warnings
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Validation Report");
        let _ = writeln!(out, "Total records: {}", self.total);
        let _ = writeln!(out, "Valid: {}", self.valid);
        let _ = writeln!(out, "Invalid: {}", self.invalid);
        let _ = writeln!(out, "Errors: {}", self.errors.len());
        let _ = writeln!(out, "Warnings: {}", self.warnings.len());

        if !self.errors.is_empty() {
            let _ = writeln!(out, "\nErrors by field:");
            for (field, findings) in self.errors_by_field() {
                let _ = writeln!(out, "  {field}: {} errors", findings.len());
                for finding in findings.iter().take(3) {
                    let id = finding.subject_id.map_or_else(|| "?".to_string(), |id| id.to_string());
                    let _ = writeln!(out, "    - #{id}: {}", finding.message);
                }
            }
        }

        if !self.warnings.is_empty() {
            let _ = writeln!(out, "\nWarnings (first 5):");
            for finding in self.warnings.iter().take(5) {
                let id = finding.subject_id.map_or_else(|| "?".to_string(), |id| id.to_string());
                let _ = writeln!(out, "  - #{id} {}: {}", finding.field, finding.message);
            }
        }
        out
    }
}

/// Validates records before they reach persistence
#[derive(Debug, Clone)]
pub struct RecordValidator {
    strict: bool,
    max_year: i32,
}

impl Default for RecordValidator {
    fn default() -> Self {
        Self::new(false)
    }
}

impl RecordValidator {
    /// Validator whose year ceiling is next calendar year
    pub fn new(strict: bool) -> Self {
        Self::with_current_year(strict, Local::now().year())
    }

    pub const fn with_current_year(strict: bool, current_year: i32) -> Self {
        Self {
            strict,
            max_year: current_year + 1,
        }
    }

    pub const fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn validate(&self, record: &ItemDetail) -> ValidationOutcome {
        let id = record.external_id;
        let mut outcome = ValidationOutcome::default();

        if id == 0 {
            outcome.errors.push(ValidationFinding::new("external_id", "identifier is required", None, id));
        }
        if id <= 0 {
            outcome.errors.push(ValidationFinding::new(
                "external_id",
                "identifier must be positive",
                Some(id.to_string()),
                id,
            ));
        } else if id > MAX_EXTERNAL_ID {
            outcome.errors.push(ValidationFinding::new(
                "external_id",
                "identifier is unrealistically large",
                Some(id.to_string()),
                id,
            ));
        }

        if record.series_name.trim().is_empty() {
            outcome.errors.push(ValidationFinding::new("series", "series name is required", None, id));
        }
        if record.display_name.trim().is_empty() {
            outcome.errors.push(ValidationFinding::new("display_name", "display name is required", None, id));
        }

        if let Some(year) = record.year {
            if !(MIN_YEAR..=self.max_year).contains(&year) {
                outcome.errors.push(ValidationFinding::new(
                    "year",
                    format!("year must be between {MIN_YEAR} and {}", self.max_year),
                    Some(year.to_string()),
                    id,
                ));
            }
        }

        let mut soft = Vec::new();
        if let Some(denomination) = record.denomination.as_deref().filter(|d| !d.trim().is_empty()) {
            if !is_known_denomination(denomination) {
                soft.push(ValidationFinding::new(
                    "denomination",
                    "denomination not recognized",
                    Some(denomination.to_string()),
                    id,
                ));
            }
        }
        if let Some(mint) = record.mint_mark.as_deref().filter(|m| !m.trim().is_empty()) {
            if !VALID_MINT_MARKS.contains(&mint.trim()) {
                soft.push(ValidationFinding::new("mint_mark", "unknown mint mark", Some(mint.to_string()), id));
            }
        }

        if self.strict {
            outcome.errors.extend(soft);
        } else {
            outcome.warnings.extend(soft);
        }
        outcome
    }

    pub fn validate_batch<'a, I>(&self, records: I) -> ValidationReport
    where
        I: IntoIterator<Item = &'a ItemDetail>,
    {
        let mut report = ValidationReport::default();
        for record in records {
            let outcome = self.validate(record);
            report.total += 1;
            if outcome.is_valid() {
                report.valid += 1;
            } else {
                report.invalid += 1;
            }
            report.errors.extend(outcome.errors);
            report.warnings.extend(outcome.warnings);
        }
        report
    }
}

fn is_known_denomination(denomination: &str) -> bool {
    let trimmed = denomination.trim();
    if VALID_DENOMINATIONS.contains(&trimmed) {
        return true;
    }
    let upper = trimmed.to_uppercase();
    DENOMINATION_HINTS.iter().any(|hint| upper.contains(hint))
}
