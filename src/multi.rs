use tracing::info;

use crate::error::{BenchError, Result};
use crate::output::Sinks;
use crate::process::{AbortHandle, Launcher};
use crate::run::{RunConfig, SingleRunResult, run_single};
use crate::stats::{DirectionalStats, SpeedRange, StatsError};
use crate::summary::{DirectionSummary, Summary, banner};

/// Cumulative figures for one direction across completed runs.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunTotals {
    /// wide enough for any number of u64 readings
    pub transferred: u128,
    /// sum of each run's final speed
    pub speed: u128,
    pub runs: usize,
    /// widened with each run's own min/max, not individual intervals
    pub range: SpeedRange,
}

impl RunTotals {
    fn fold(&mut self, stats: &DirectionalStats) -> std::result::Result<(), StatsError> {
        let transferred = stats.last_transferred()?;
        let speed = stats.last_speed()?;
        let SpeedRange::Value { min, max } = stats.range() else {
            return Err(StatsError::EmptyState);
        };
        self.transferred += u128::from(transferred);
        self.speed += u128::from(speed);
        self.runs += 1;
        self.range.merge(min, max);
        Ok(())
    }

    pub fn average_speed(&self) -> Option<f64> {
        (self.runs > 0).then(|| self.speed as f64 / self.runs as f64)
    }

    pub fn jitter_percent(&self) -> std::result::Result<f64, StatsError> {
        let avg = self.average_speed().ok_or(StatsError::EmptyState)?;
        self.range.spread_percent(avg)
    }

    pub fn summary(&self) -> DirectionSummary {
        if self.runs == 0 {
            return DirectionSummary::default();
        }
        DirectionSummary {
            transferred: Some(self.transferred as f64),
            speed: self.average_speed(),
            min: self.range.min().map(|v| v as f64),
            max: self.range.max().map(|v| v as f64),
            jitter: self.jitter_percent().ok(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MultiRunResult {
    pub description: String,
    pub runs: Vec<SingleRunResult>,
    pub upload: RunTotals,
    pub download: RunTotals,
}

impl MultiRunResult {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    /// Fold a finished run. Both directions must have data, otherwise the
    /// totals are left untouched.
    pub fn push(&mut self, run: SingleRunResult) -> std::result::Result<(), StatsError> {
        if run.upload.is_empty() || run.download.is_empty() {
            return Err(StatsError::EmptyState);
        }
        self.upload.fold(&run.upload)?;
        self.download.fold(&run.download)?;
        self.runs.push(run);
        Ok(())
    }

    pub fn completed(&self) -> usize {
        self.runs.len()
    }

    pub fn header(&self) -> String {
        banner(&self.description, "Summary")
    }

    pub fn summary(&self) -> Summary {
        Summary {
            upload: self.upload.summary(),
            download: self.download.summary(),
        }
    }
}

/// Run `num_tests` tests one after another, numbering them from 1.
///
/// Stops at the first failing run; runs that completed before it stay
/// folded into `session`.
pub fn run_session(
    launcher: &dyn Launcher,
    base: &RunConfig,
    num_tests: u32,
    sinks: &mut Sinks,
    abort: &AbortHandle,
    session: &mut MultiRunResult,
    mut report: impl FnMut(&SingleRunResult),
) -> Result<()> {
    for id in 1..=num_tests {
        if abort.is_aborted() {
            return Err(BenchError::Interrupted);
        }
        let config = RunConfig {
            id,
            ..base.clone()
        };
        let run = run_single(launcher, config, sinks, abort)?;
        report(&run);
        session.push(run)?;
        info!("{}/{} runs complete", session.completed(), num_tests);
    }
    Ok(())
}
