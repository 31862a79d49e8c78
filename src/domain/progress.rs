//! Scrape progress records
//!
//! Series and item status values, the run audit record, and the read models
//! returned by the progress store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, Type};
use std::fmt;

use super::catalog::PriorityTier;
use super::item::ExternalId;

/// Series status. `Completed` is terminal until an explicit reset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SeriesStatus {
    Pending,
    InProgress,
    Completed,
}

impl SeriesStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for SeriesStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Type<sqlx::Sqlite> for SeriesStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <String as Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'q> Encode<'q, sqlx::Sqlite> for SeriesStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as Encode<sqlx::Sqlite>>::encode(self.as_str().to_string(), buf)
    }
}

impl<'r> Decode<'r, sqlx::Sqlite> for SeriesStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as Decode<sqlx::Sqlite>>::decode(value)?;
        Self::parse(&s).ok_or_else(|| format!("Invalid SeriesStatus: {s}").into())
    }
}

/// Item status. `Completed` is frozen; `Failed` may be retried.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Completed,
    Failed,
}

impl ItemStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Type<sqlx::Sqlite> for ItemStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <String as Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'q> Encode<'q, sqlx::Sqlite> for ItemStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as Encode<sqlx::Sqlite>>::encode(self.as_str().to_string(), buf)
    }
}

impl<'r> Decode<'r, sqlx::Sqlite> for ItemStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as Decode<sqlx::Sqlite>>::decode(value)?;
        Self::parse(&s).ok_or_else(|| format!("Invalid ItemStatus: {s}").into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesProgressRecord {
    pub slug: String,
    pub status: SeriesStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub items_found: i64,
    pub items_completed: i64,
    pub items_failed: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemProgressRecord {
    pub external_id: ExternalId,
    pub series_slug: String,
    pub status: ItemStatus,
    pub attempted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: i64,
    pub last_error: Option<String>,
}

/// Filters a run was started with, stored on the run record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFilters {
    pub priority: Option<PriorityTier>,
    /// Series slug or name
    pub series: Option<String>,
    /// Start with the series an interrupted run left in progress
    #[serde(default)]
    pub resume: bool,
}

/// Append-only audit entry for one orchestrator run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub filters: RunFilters,
    pub items_scraped: i64,
    pub items_failed: i64,
}

/// Where an interrupted run left off
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumePoint {
    pub series_slug: String,
    pub items_found: i64,
    pub items_completed: i64,
    pub items_failed: i64,
    pub last_completed_external_id: Option<ExternalId>,
}

/// Aggregate counters over the whole progress store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressStats {
    pub series_completed: i64,
    pub series_in_progress: i64,
    pub items_completed: i64,
    pub items_failed: i64,
    pub total_runs: i64,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Progress stats joined with the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub stats: ProgressStats,
    pub catalog_series: usize,
    pub pending_series: usize,
    pub resume_point: Option<ResumePoint>,
}

impl fmt::Display for ProgressSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Series: {} completed, {} in progress, {} pending (of {})",
            self.stats.series_completed,
            self.stats.series_in_progress,
            self.pending_series,
            self.catalog_series
        )?;
        writeln!(
            f,
            "Items: {} completed, {} failed",
            self.stats.items_completed, self.stats.items_failed
        )?;
        writeln!(f, "Runs: {}", self.stats.total_runs)?;
        if let Some(last) = self.stats.last_activity {
            writeln!(f, "Last activity: {}", last.format("%Y-%m-%d %H:%M:%S"))?;
        }
        if let Some(resume) = &self.resume_point {
            write!(
                f,
                "Resume at: {} ({} found, {} completed, {} failed",
                resume.series_slug, resume.items_found, resume.items_completed, resume.items_failed
            )?;
            if let Some(id) = resume.last_completed_external_id {
                write!(f, ", last completed #{id}")?;
            }
            writeln!(f, ")")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_round_trip() {
        for status in [SeriesStatus::Pending, SeriesStatus::InProgress, SeriesStatus::Completed] {
            assert_eq!(SeriesStatus::parse(status.as_str()), Some(status));
        }
        for status in [ItemStatus::Pending, ItemStatus::Completed, ItemStatus::Failed] {
            assert_eq!(ItemStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SeriesStatus::parse("done"), None);
    }

    #[test]
    fn summary_mentions_resume_point() {
        let summary = ProgressSummary {
            stats: ProgressStats::default(),
            catalog_series: 3,
            pending_series: 2,
            resume_point: Some(ResumePoint {
                series_slug: "morgan-dollars".to_string(),
                items_found: 10,
                items_completed: 4,
                items_failed: 1,
                last_completed_external_id: Some(7172),
            }),
        };
        let text = summary.to_string();
        assert!(text.contains("2 pending (of 3)"));
        assert!(text.contains("Resume at: morgan-dollars"));
        assert!(text.contains("last completed #7172"));
    }
}
