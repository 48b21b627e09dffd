use chrono::{DateTime, Utc};

use super::types::{AggregateRow, DayIndex, ReportKey};

/// Durable table of locally aggregated values, plus the per-report and global
/// bookkeeping the periodic cycle needs.
///
/// Groups of calls that must commit together run inside
/// [`AggregateStore::in_transaction`]. Implementations must make that either
/// apply every mutation done by the closure or none of them.
pub trait AggregateStore {
    type Error: Into<anyhow::Error>;

    /// All (profile, event vector, value) rows for the report and day, in a
    /// stable order.
    fn read_aggregates(
        &self,
        report: &ReportKey,
        day_index: DayIndex,
    ) -> Result<Vec<AggregateRow>, Self::Error>;

    /// Delete every row for the report and day.
    fn delete_aggregates(
        &mut self,
        report: &ReportKey,
        day_index: DayIndex,
    ) -> Result<(), Self::Error>;

    /// Delete every row for the report whose day is `<= day_index`.
    fn delete_aggregates_through(
        &mut self,
        report: &ReportKey,
        day_index: DayIndex,
    ) -> Result<(), Self::Error>;

    /// Last day whose data was delivered for the report, if the report is
    /// known.
    fn last_sent_day_index(
        &self,
        report: &ReportKey,
    ) -> Result<Option<DayIndex>, Self::Error>;

    fn set_last_sent_day_index(
        &mut self,
        report: &ReportKey,
        day_index: DayIndex,
    ) -> Result<(), Self::Error>;

    /// Every report with stored rows or a last-sent day index.
    fn report_keys(&self) -> Result<Vec<ReportKey>, Self::Error>;

    /// Forget everything stored for the report.
    fn delete_report(&mut self, report: &ReportKey) -> Result<(), Self::Error>;

    /// Time logging was enabled, as last recorded.
    fn enabled_since(&self) -> Result<Option<DateTime<Utc>>, Self::Error>;

    fn set_enabled_since(
        &mut self,
        time: DateTime<Utc>,
    ) -> Result<(), Self::Error>;

    /// First time logging was observed disabled since it was last enabled.
    fn disabled_since(&self) -> Result<Option<DateTime<Utc>>, Self::Error>;

    fn set_disabled_since(
        &mut self,
        time: Option<DateTime<Utc>>,
    ) -> Result<(), Self::Error>;

    /// Runs `f` atomically: if it returns an error, none of its mutations
    /// are visible afterwards.
    fn in_transaction<R, F>(&mut self, f: F) -> Result<R, Self::Error>
    where
        F: FnOnce(&mut Self) -> Result<R, Self::Error>;

    /// Raise the report's last-sent day index to at least `day_index`.
    fn advance_last_sent_day_index(
        &mut self,
        report: &ReportKey,
        day_index: DayIndex,
    ) -> Result<(), Self::Error> {
        match self.last_sent_day_index(report)? {
            Some(current) if current >= day_index => Ok(()),
            _ => self.set_last_sent_day_index(report, day_index),
        }
    }
}
