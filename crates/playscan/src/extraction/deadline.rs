use std::time::{Duration, Instant};

use crate::error::ImportError;

/// Cumulative soft deadline for one run, checked between pages, files and steps.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    /// `budget_ms == 0` never expires.
    pub fn start(budget_ms: u64) -> Self {
        Self {
            started: Instant::now(),
            budget: (budget_ms > 0).then(|| Duration::from_millis(budget_ms)),
        }
    }

    pub fn unlimited() -> Self {
        Self::start(0)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Fails with [`ImportError::Timeout`] once the budget is spent.
    pub fn check(&self, activity: &str) -> Result<(), ImportError> {
        match self.budget {
            Some(budget) if self.elapsed() >= budget => Err(ImportError::Timeout(format!(
                "Processing exceeded {} s while {}",
                budget.as_secs_f64().round(),
                activity
            ))),
            _ => Ok(()),
        }
    }
}
