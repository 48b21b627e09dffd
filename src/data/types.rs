use std::{collections::BTreeMap, fmt};

use anyhow::bail;
use serde::{Deserialize, Serialize};

use crate::system::SystemProfile;

/// Day count since the Unix epoch in a metric-specific time zone.
pub type DayIndex = i32;

/// Unique identity of a report definition.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
pub struct ReportKey {
    pub customer_id: u32,
    pub project_id: u32,
    pub metric_id: u32,
    pub report_id: u32,
}

impl ReportKey {
    pub fn new(
        customer_id: u32,
        project_id: u32,
        metric_id: u32,
        report_id: u32,
    ) -> Self {
        Self {
            customer_id,
            project_id,
            metric_id,
            report_id,
        }
    }
}

impl fmt::Display for ReportKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.customer_id, self.project_id, self.metric_id, self.report_id
        )
    }
}

/// Ordered event codes identifying one dimension combination. Equality is
/// element-wise and order-sensitive; the empty vector is valid.
#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
pub struct EventVector(pub Vec<u32>);

impl EventVector {
    pub fn new(codes: impl Into<Vec<u32>>) -> Self {
        Self(codes.into())
    }

    pub fn codes(&self) -> &[u32] {
        &self.0
    }
}

impl<const N: usize> From<[u32; N]> for EventVector {
    fn from(codes: [u32; N]) -> Self {
        Self(codes.to_vec())
    }
}

/// Locally aggregated value for one (report, day, profile, event vector).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateValue {
    Integer(u64),

    /// String fingerprint -> occurrence count.
    StringHistogram(BTreeMap<u64, u64>),
}

impl AggregateValue {
    pub fn string_occurrence(hash: u64) -> Self {
        Self::StringHistogram(BTreeMap::from([(hash, 1)]))
    }

    /// Folds `other` into `self`. Integers add, histograms union by key and
    /// add counts, so accumulation is order-independent.
    pub fn merge(&mut self, other: &AggregateValue) -> anyhow::Result<()> {
        match (self, other) {
            (AggregateValue::Integer(a), AggregateValue::Integer(b)) => {
                *a = a.saturating_add(*b);
            }
            (
                AggregateValue::StringHistogram(a),
                AggregateValue::StringHistogram(b),
            ) => {
                for (hash, count) in b {
                    let entry = a.entry(*hash).or_default();
                    *entry = entry.saturating_add(*count);
                }
            }
            (a, b) => bail!("cannot merge {a:?} with {b:?}"),
        }
        Ok(())
    }
}

/// Fingerprint under which string values are aggregated and reported.
pub fn string_fingerprint(value: &str) -> u64 {
    farmhash::fingerprint64(value.as_bytes())
}

/// One row read back from the aggregate store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateRow {
    pub system_profile: SystemProfile,
    pub event_vector: EventVector,
    pub value: AggregateValue,
}
