pub mod periodic_job;

use chrono::TimeDelta;

use crate::data::types::DayIndex;

pub use periodic_job::PeriodicJob;

/// Days of data a single report aggregates over.
pub const LARGEST_AGGREGATION_WINDOW: DayIndex = 1;

/// Extra days aggregates are kept past the aggregation window before
/// cleanup drops them.
pub const RETENTION_MARGIN_DAYS: DayIndex = 4;

/// Oldest day, relative to today, a cycle will still send.
pub const MAX_BACKFILL_DAYS: DayIndex = 4;

/// Logging disabled for longer than this loses its backfill on re-enable.
pub const DISABLED_RESET_TIME: TimeDelta = TimeDelta::days(2);

/// What a call to [`PeriodicJob::run_cycle`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Logging is disabled; nothing was read or uploaded.
    Disabled,

    /// Every envelope was delivered and the processed days committed.
    Uploaded {
        envelopes: usize,
        observations: usize,
    },

    /// Encryption or upload failed; no state was advanced.
    UploadFailed,
}
