use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use log::{debug, warn};

use super::{
    traits::AggregateStore,
    types::{
        string_fingerprint, AggregateRow, AggregateValue, DayIndex, EventVector,
        ReportKey,
    },
};
use crate::system::SystemProfile;

#[derive(Debug, Default, Clone)]
struct StoreState {
    aggregates: HashMap<(ReportKey, DayIndex), Vec<AggregateRow>>,

    /// Distinct string fingerprints seen per report/day, in arrival order.
    string_hashes: HashMap<(ReportKey, DayIndex), Vec<u64>>,

    last_sent: HashMap<ReportKey, DayIndex>,
    enabled_since: Option<DateTime<Utc>>,
    disabled_since: Option<DateTime<Utc>>,
}

/// Simple in-memory implementation of AggregateStore using HashMaps.
/// Transactions snapshot the whole state and restore it on failure.
#[derive(Debug, Default, Clone)]
pub struct HashMapAggregateStore {
    state: StoreState,
}

impl HashMapAggregateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `count` to the row for (report, day, profile, event vector),
    /// creating it if needed. Returns whether a row was written: a new event
    /// vector is dropped once the profile already holds
    /// `event_vector_buffer_max` of them (0 means unlimited).
    pub fn aggregate_count(
        &mut self,
        report: &ReportKey,
        day_index: DayIndex,
        system_profile: &SystemProfile,
        event_vector: &EventVector,
        event_vector_buffer_max: u64,
        count: u64,
    ) -> anyhow::Result<bool> {
        self.aggregate_value(
            report,
            day_index,
            system_profile,
            event_vector,
            event_vector_buffer_max,
            AggregateValue::Integer(count),
        )
    }

    /// Records one occurrence of `value`. A new string is dropped once the
    /// report/day already holds `string_buffer_max` distinct strings (0
    /// means unlimited).
    #[allow(clippy::too_many_arguments)]
    pub fn aggregate_string(
        &mut self,
        report: &ReportKey,
        day_index: DayIndex,
        system_profile: &SystemProfile,
        event_vector: &EventVector,
        event_vector_buffer_max: u64,
        string_buffer_max: u64,
        value: &str,
    ) -> anyhow::Result<bool> {
        let hash = string_fingerprint(value);
        let known = self
            .state
            .string_hashes
            .get(&(*report, day_index))
            .is_some_and(|hashes| hashes.contains(&hash));
        if !known {
            let num_strings = self
                .state
                .string_hashes
                .get(&(*report, day_index))
                .map_or(0, Vec::len) as u64;
            if string_buffer_max != 0 && num_strings >= string_buffer_max {
                warn!(
                    "Dropping string for report {report}, due to exceeding string_buffer_max {string_buffer_max}"
                );
                return Ok(false);
            }
        }

        let written = self.aggregate_value(
            report,
            day_index,
            system_profile,
            event_vector,
            event_vector_buffer_max,
            AggregateValue::string_occurrence(hash),
        )?;
        if written && !known {
            self.state
                .string_hashes
                .entry((*report, day_index))
                .or_default()
                .push(hash);
        }
        Ok(written)
    }

    fn aggregate_value(
        &mut self,
        report: &ReportKey,
        day_index: DayIndex,
        system_profile: &SystemProfile,
        event_vector: &EventVector,
        event_vector_buffer_max: u64,
        value: AggregateValue,
    ) -> anyhow::Result<bool> {
        // A report seen for the first time has nothing older to send.
        self.state
            .last_sent
            .entry(*report)
            .or_insert(day_index - 1);

        let rows = self
            .state
            .aggregates
            .entry((*report, day_index))
            .or_default();

        if let Some(row) = rows.iter_mut().find(|row| {
            &row.system_profile == system_profile
                && &row.event_vector == event_vector
        }) {
            row.value.merge(&value)?;
            return Ok(true);
        }

        if event_vector_buffer_max != 0 {
            let num_event_vectors = rows
                .iter()
                .filter(|row| &row.system_profile == system_profile)
                .count() as u64;
            if num_event_vectors >= event_vector_buffer_max {
                warn!(
                    "Dropping event vector for report {report}, due to exceeding event_vector_buffer_max {event_vector_buffer_max}"
                );
                return Ok(false);
            }
        }

        debug!("New aggregate row for report {report} day {day_index}");
        rows.push(AggregateRow {
            system_profile: system_profile.clone(),
            event_vector: event_vector.clone(),
            value,
        });
        Ok(true)
    }

    /// Days with stored rows for the report, ascending.
    pub fn day_indices(&self, report: &ReportKey) -> Vec<DayIndex> {
        let days: BTreeSet<DayIndex> = self
            .state
            .aggregates
            .iter()
            .filter(|((key, _), rows)| key == report && !rows.is_empty())
            .map(|((_, day), _)| *day)
            .collect();
        days.into_iter().collect()
    }

    /// Total number of stored rows, across all reports and days.
    pub fn num_rows(&self) -> usize {
        self.state.aggregates.values().map(Vec::len).sum()
    }
}

impl AggregateStore for HashMapAggregateStore {
    type Error = anyhow::Error;

    fn read_aggregates(
        &self,
        report: &ReportKey,
        day_index: DayIndex,
    ) -> Result<Vec<AggregateRow>, Self::Error> {
        Ok(self
            .state
            .aggregates
            .get(&(*report, day_index))
            .cloned()
            .unwrap_or_default())
    }

    fn delete_aggregates(
        &mut self,
        report: &ReportKey,
        day_index: DayIndex,
    ) -> Result<(), Self::Error> {
        self.state.aggregates.remove(&(*report, day_index));
        self.state.string_hashes.remove(&(*report, day_index));
        Ok(())
    }

    fn delete_aggregates_through(
        &mut self,
        report: &ReportKey,
        day_index: DayIndex,
    ) -> Result<(), Self::Error> {
        let keep = |(key, day): &(ReportKey, DayIndex)| {
            key != report || *day > day_index
        };
        self.state.aggregates.retain(|k, _| keep(k));
        self.state.string_hashes.retain(|k, _| keep(k));
        Ok(())
    }

    fn last_sent_day_index(
        &self,
        report: &ReportKey,
    ) -> Result<Option<DayIndex>, Self::Error> {
        Ok(self.state.last_sent.get(report).copied())
    }

    fn set_last_sent_day_index(
        &mut self,
        report: &ReportKey,
        day_index: DayIndex,
    ) -> Result<(), Self::Error> {
        self.state.last_sent.insert(*report, day_index);
        Ok(())
    }

    fn report_keys(&self) -> Result<Vec<ReportKey>, Self::Error> {
        let keys: BTreeSet<ReportKey> = self
            .state
            .last_sent
            .keys()
            .copied()
            .chain(self.state.aggregates.keys().map(|(key, _)| *key))
            .collect();
        Ok(keys.into_iter().collect())
    }

    fn delete_report(&mut self, report: &ReportKey) -> Result<(), Self::Error> {
        self.state.aggregates.retain(|(key, _), _| key != report);
        self.state.string_hashes.retain(|(key, _), _| key != report);
        self.state.last_sent.remove(report);
        Ok(())
    }

    fn enabled_since(&self) -> Result<Option<DateTime<Utc>>, Self::Error> {
        Ok(self.state.enabled_since)
    }

    fn set_enabled_since(
        &mut self,
        time: DateTime<Utc>,
    ) -> Result<(), Self::Error> {
        self.state.enabled_since = Some(time);
        Ok(())
    }

    fn disabled_since(&self) -> Result<Option<DateTime<Utc>>, Self::Error> {
        Ok(self.state.disabled_since)
    }

    fn set_disabled_since(
        &mut self,
        time: Option<DateTime<Utc>>,
    ) -> Result<(), Self::Error> {
        self.state.disabled_since = time;
        Ok(())
    }

    fn in_transaction<R, F>(&mut self, f: F) -> Result<R, Self::Error>
    where
        F: FnOnce(&mut Self) -> Result<R, Self::Error>,
    {
        let snapshot = self.state.clone();
        let result = f(self);
        if result.is_err() {
            self.state = snapshot;
        }
        result
    }
}
