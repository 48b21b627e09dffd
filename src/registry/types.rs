use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data::types::ReportKey;

/// Ordered maturity gate. A metric or report is collected only on builds
/// whose running stage is at or below its maximum stage.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
)]
pub enum ReleaseStage {
    Debug = 1,
    Fishfood = 10,
    Dogfood = 20,
    OpenBeta = 30,
    #[default]
    Ga = 99,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
pub enum MetricType {
    #[default]
    Occurrence,
    Integer,
    String,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
pub enum ReportType {
    #[default]
    FleetwideOccurrenceCounts,
    StringCounts,
    FleetwideMeans,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
pub enum PrivacyMechanism {
    #[default]
    DeIdentification,
    ShuffledDifferentialPrivacy,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeZonePolicy {
    #[default]
    Utc,
    /// Device-local time zone.
    Local,
    /// A fixed IANA zone, e.g. "America/Los_Angeles".
    Other(String),
}

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
pub enum SystemProfileField {
    Os,
    Arch,
    BoardName,
    SystemVersion,
    AppVersion,
    Channel,
}

/// One dimension of a metric's event vectors.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricDimension {
    pub event_codes: BTreeMap<u32, String>,

    /// When non-zero the dimension covers every code in `0..=max_event_code`
    /// and `event_codes` only names some of them.
    pub max_event_code: u32,
}

impl MetricDimension {
    pub fn with_codes<'a>(codes: impl IntoIterator<Item = (u32, &'a str)>) -> Self {
        Self {
            event_codes: codes
                .into_iter()
                .map(|(code, name)| (code, name.to_string()))
                .collect(),
            max_event_code: 0,
        }
    }

    pub fn with_max_event_code(max_event_code: u32) -> Self {
        Self {
            event_codes: BTreeMap::new(),
            max_event_code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ShuffledDpConfig {
    /// Mean of the Poisson distribution used to fabricate observations at
    /// each index point.
    pub poisson_mean: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportDefinition {
    pub id: u32,
    pub report_type: ReportType,
    pub privacy_mechanism: PrivacyMechanism,
    pub system_profile_fields: Vec<SystemProfileField>,

    /// Maximum event vectors stored per report/day/profile, 0 for no limit.
    pub event_vector_buffer_max: u64,

    /// Maximum distinct strings stored per report/day, 0 for no limit.
    pub string_buffer_max: u64,

    pub min_value: i64,
    pub max_value: i64,
    pub num_index_points: u32,
    pub shuffled_dp: Option<ShuffledDpConfig>,
    pub max_release_stage: Option<ReleaseStage>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricDefinition {
    pub id: u32,
    pub metric_type: MetricType,
    pub dimensions: Vec<MetricDimension>,
    pub time_zone_policy: TimeZonePolicy,
    pub max_release_stage: Option<ReleaseStage>,
    pub reports: Vec<ReportDefinition>,
}

impl MetricDefinition {
    /// Whether this report is collected on a build at `running_stage`.
    pub fn is_collected(
        &self,
        report: &ReportDefinition,
        running_stage: ReleaseStage,
    ) -> bool {
        let metric_ok = self
            .max_release_stage
            .map_or(true, |stage| stage >= running_stage);
        let report_ok = report
            .max_release_stage
            .map_or(true, |stage| stage >= running_stage);
        metric_ok && report_ok
    }
}

/// The registry of metrics for one customer project.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Project {
    pub customer_id: u32,
    pub project_id: u32,
    pub metrics: Vec<MetricDefinition>,
}

impl Project {
    pub fn new(
        customer_id: u32,
        project_id: u32,
        metrics: Vec<MetricDefinition>,
    ) -> Self {
        Self {
            customer_id,
            project_id,
            metrics,
        }
    }

    pub fn report_key(
        &self,
        metric: &MetricDefinition,
        report: &ReportDefinition,
    ) -> ReportKey {
        ReportKey::new(self.customer_id, self.project_id, metric.id, report.id)
    }

    /// Every (metric, report, key) triple in registry order.
    pub fn reports(
        &self,
    ) -> impl Iterator<Item = (&MetricDefinition, &ReportDefinition, ReportKey)>
    {
        self.metrics.iter().flat_map(move |metric| {
            metric
                .reports
                .iter()
                .map(move |report| (metric, report, self.report_key(metric, report)))
        })
    }

    pub fn find_metric(&self, metric_id: u32) -> Option<&MetricDefinition> {
        self.metrics.iter().find(|metric| metric.id == metric_id)
    }

    pub fn contains(&self, key: &ReportKey) -> bool {
        self.reports().any(|(_, _, k)| k == *key)
    }
}
