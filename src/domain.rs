//! Domain module - core records and pure rules
//!
//! Catalog entries, item records for each pipeline stage, progress records,
//! quota budgeting and record validation. Nothing here performs I/O.

pub mod catalog;
pub mod item;
pub mod progress;
pub mod quota;
pub mod validation;

pub use catalog::{CatalogEntry, PriorityTier};
pub use item::{DetailPage, ExternalId, GradeCode, ItemDetail, ItemSummary, Price};
pub use progress::{
    ItemProgressRecord, ItemStatus, ProgressStats, ProgressSummary, ResumePoint, RunFilters,
    RunRecord, SeriesProgressRecord, SeriesStatus,
};
pub use quota::{BudgetPolicy, QuotaState, QuotaStatus};
pub use validation::{RecordValidator, ValidationFinding, ValidationOutcome, ValidationReport};
