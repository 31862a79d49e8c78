//! Persistent daily API quota
//!
//! The counter lives in a small JSON file next to the progress store. The
//! file is rewritten atomically (temp file + rename) after every change. Each
//! read or write first rolls the state over when the calendar day changed.

use chrono::Datelike;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::quota::{BudgetPolicy, QuotaState, QuotaStatus, daily_budget, days_until_weekly_reset};
use crate::infrastructure::clock::Clock;

#[derive(Error, Debug)]
pub enum QuotaError {
    #[error("Quota file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode quota state: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type QuotaResult<T> = Result<T, QuotaError>;

pub struct QuotaBudget {
    path: PathBuf,
    policy: BudgetPolicy,
    clock: Arc<dyn Clock>,
    state: Mutex<QuotaState>,
}

impl QuotaBudget {
    /// Load the quota file, creating it on first use. An unreadable file is
    /// replaced with a fresh state. The configured limit always wins over the
    /// stored one.
    pub async fn open(
        path: impl AsRef<Path>,
        daily_limit: u32,
        policy: BudgetPolicy,
        clock: Arc<dyn Clock>,
    ) -> QuotaResult<Self> {
        let path = path.as_ref().to_path_buf();
        let today = clock.today();

        let mut state = match fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<QuotaState>(&content) {
                Ok(state) => state,
                Err(e) => {
                    warn!("⚠️ Quota file {:?} is unreadable ({}), starting fresh", path, e);
                    QuotaState::fresh(today, daily_limit)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => QuotaState::fresh(today, daily_limit),
            Err(e) => return Err(e.into()),
        };
        state.daily_limit = daily_limit;
        state.roll_over(today);

        let budget = Self {
            path,
            policy,
            clock,
            state: Mutex::new(state.clone()),
        };
        budget.save(&state).await?;
        info!(
            "📊 API quota: {}/{} calls used on {}",
            state.calls_made, state.daily_limit, state.date
        );
        Ok(budget)
    }

    /// True while calls remain today
    pub async fn check_quota(&self) -> QuotaResult<bool> {
        let mut state = self.state.lock().await;
        self.roll_over(&mut state).await?;
        Ok(state.has_quota())
    }

    /// Count one call and return what remains
    pub async fn record_call(&self) -> QuotaResult<u32> {
        let mut state = self.state.lock().await;
        self.roll_over(&mut state).await?;
        state.calls_made = state.calls_made.saturating_add(1);
        state.last_call_at = Some(self.clock.now());
        self.save(&state).await?;

        let remaining = state.remaining();
        debug!("API call recorded, {} remaining today", remaining);
        if remaining == 0 {
            warn!("⛔ Daily API quota of {} exhausted", state.daily_limit);
        }
        Ok(remaining)
    }

    pub async fn remaining(&self) -> QuotaResult<u32> {
        let mut state = self.state.lock().await;
        self.roll_over(&mut state).await?;
        Ok(state.remaining())
    }

    pub async fn status(&self) -> QuotaResult<QuotaStatus> {
        let mut state = self.state.lock().await;
        self.roll_over(&mut state).await?;
        Ok(QuotaStatus::from(&*state))
    }

    /// Calls a run may spend today, spreading what remains until the weekly reset
    pub async fn calculate_daily_budget(&self) -> QuotaResult<u32> {
        let remaining = self.remaining().await?;
        let days = days_until_weekly_reset(self.clock.today().weekday());
        let budget = daily_budget(remaining, days, &self.policy);
        debug!("Daily budget {} ({} remaining, {} days to reset)", budget, remaining, days);
        Ok(budget)
    }

    /// Zero today's counter
    pub async fn reset(&self) -> QuotaResult<()> {
        let mut state = self.state.lock().await;
        *state = QuotaState::fresh(self.clock.today(), state.daily_limit);
        self.save(&state).await?;
        warn!("🔄 API quota counter reset");
        Ok(())
    }

    async fn roll_over(&self, state: &mut QuotaState) -> QuotaResult<()> {
        let previous = state.date;
        if state.roll_over(self.clock.today()) {
            info!("📅 New quota day {} (was {})", state.date, previous);
            self.save(state).await?;
        }
        Ok(())
    }

    async fn save(&self, state: &QuotaState) -> QuotaResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(state)?;
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, content).await?;
        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}
