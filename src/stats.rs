use thiserror::Error;

use crate::record::MeasurementRecord;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StatsError {
    #[error("no measurements captured yet")]
    EmptyState,
    #[error("final speed is zero, jitter undefined")]
    ZeroSpeed,
}

/// Running speed bounds. `Unset` until the first reading arrives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SpeedRange {
    #[default]
    Unset,
    Value { min: u64, max: u64 },
}

impl SpeedRange {
    pub fn observe(&mut self, speed: u64) {
        self.merge(speed, speed);
    }

    /// Widen the range to cover `[min, max]`.
    pub fn merge(&mut self, min: u64, max: u64) {
        *self = match *self {
            SpeedRange::Unset => SpeedRange::Value { min, max },
            SpeedRange::Value { min: lo, max: hi } => SpeedRange::Value {
                min: lo.min(min),
                max: hi.max(max),
            },
        };
    }

    pub fn min(&self) -> Option<u64> {
        match self {
            SpeedRange::Unset => None,
            SpeedRange::Value { min, .. } => Some(*min),
        }
    }

    pub fn max(&self) -> Option<u64> {
        match self {
            SpeedRange::Unset => None,
            SpeedRange::Value { max, .. } => Some(*max),
        }
    }

    /// Spread between max and min relative to `reference`, in percent.
    pub fn spread_percent(&self, reference: f64) -> Result<f64, StatsError> {
        let SpeedRange::Value { min, max } = *self else {
            return Err(StatsError::EmptyState);
        };
        if reference == 0.0 {
            return Err(StatsError::ZeroSpeed);
        }
        Ok((max - min) as f64 / reference * 100.0)
    }
}

/// Records seen for one direction of a run.
#[derive(Debug, Clone, Default)]
pub struct DirectionalStats {
    records: Vec<MeasurementRecord>,
    range: SpeedRange,
}

impl DirectionalStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, m: MeasurementRecord) {
        self.range.observe(m.speed);
        self.records.push(m);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
    pub fn range(&self) -> SpeedRange {
        self.range
    }

    fn last(&self) -> Result<&MeasurementRecord, StatsError> {
        self.records.last().ok_or(StatsError::EmptyState)
    }

    /// iperf closes each phase with a cumulative line, so the last record
    /// carries the phase totals.
    pub fn last_transferred(&self) -> Result<u64, StatsError> {
        self.last().map(|m| m.transferred)
    }
    pub fn last_speed(&self) -> Result<u64, StatsError> {
        self.last().map(|m| m.speed)
    }
    pub fn min_speed(&self) -> Option<u64> {
        self.range.min()
    }
    pub fn max_speed(&self) -> Option<u64> {
        self.range.max()
    }

    pub fn jitter_percent(&self) -> Result<f64, StatsError> {
        let last = self.last_speed()?;
        self.range.spread_percent(last as f64)
    }
}
