use std::collections::BTreeMap;

use super::{
    observation::{
        HistogramBucket, Observation, ObservationKind, ObservationToEncrypt,
    },
    random::RandomSource,
};
use crate::{
    data::types::{AggregateRow, AggregateValue, EventVector, ReportKey},
    error::CobaltError,
    registry::{
        types::{MetricDefinition, ReportDefinition},
        RegistryValidator,
    },
};

/// Turns aggregated values of one report into observation payloads.
#[derive(Debug, Clone, Copy)]
pub struct ObservationBuilder<'a> {
    pub metric: &'a MetricDefinition,
    pub report: &'a ReportDefinition,
    pub report_key: ReportKey,
}

impl<'a> ObservationBuilder<'a> {
    /// Fails if the metric type cannot feed the report type, or the report
    /// type does not support the privacy mechanism.
    pub fn new(
        metric: &'a MetricDefinition,
        report: &'a ReportDefinition,
        report_key: ReportKey,
    ) -> Result<Self, CobaltError> {
        if !RegistryValidator::report_type_allowed(
            metric.metric_type,
            report.report_type,
        ) {
            return Err(CobaltError::validation(
                report_key,
                format!(
                    "metric type {:?} cannot produce report type {:?}",
                    metric.metric_type, report.report_type
                ),
            ));
        }
        if !RegistryValidator::privacy_mechanism_allowed(
            report.report_type,
            report.privacy_mechanism,
        ) {
            return Err(CobaltError::validation(
                report_key,
                format!(
                    "report type {:?} does not support {:?}",
                    report.report_type, report.privacy_mechanism
                ),
            ));
        }
        Ok(Self {
            metric,
            report,
            report_key,
        })
    }

    /// Observation carrying the row's value as is.
    pub fn build<R: RandomSource + ?Sized>(
        &self,
        row: &AggregateRow,
        source: &mut R,
    ) -> Observation {
        match &row.value {
            AggregateValue::Integer(count) => {
                self.integer(&row.event_vector, *count, source)
            }
            AggregateValue::StringHistogram(histogram) => {
                self.string_histogram(&row.event_vector, histogram, source)
            }
        }
    }

    pub fn integer<R: RandomSource + ?Sized>(
        &self,
        event_vector: &EventVector,
        value: u64,
        source: &mut R,
    ) -> Observation {
        Observation {
            kind: ObservationKind::Integer {
                event_codes: event_vector.codes().to_vec(),
                value,
            },
            random_id: source.random_id(),
        }
    }

    /// Histogram over the strings seen with one event vector. Bucket indices
    /// are positions in this observation's own hash list.
    pub fn string_histogram<R: RandomSource + ?Sized>(
        &self,
        event_vector: &EventVector,
        histogram: &BTreeMap<u64, u64>,
        source: &mut R,
    ) -> Observation {
        let (string_hashes, buckets): (Vec<u64>, Vec<HistogramBucket>) = histogram
            .iter()
            .enumerate()
            .map(|(index, (hash, count))| {
                (
                    *hash,
                    HistogramBucket {
                        index: index as u32,
                        count: *count,
                    },
                )
            })
            .unzip();
        Observation {
            kind: ObservationKind::StringHistogram {
                string_hashes,
                event_codes: event_vector.codes().to_vec(),
                buckets,
            },
            random_id: source.random_id(),
        }
    }

    pub fn private_index<R: RandomSource + ?Sized>(
        &self,
        index: u64,
        source: &mut R,
    ) -> Observation {
        Observation {
            kind: ObservationKind::PrivateIndex { index },
            random_id: source.random_id(),
        }
    }

    pub fn participation<R: RandomSource + ?Sized>(
        &self,
        source: &mut R,
    ) -> Observation {
        Observation {
            kind: ObservationKind::ReportParticipation,
            random_id: source.random_id(),
        }
    }

    /// Wraps an observation derived from real data.
    pub fn real<R: RandomSource + ?Sized>(
        observation: Observation,
        source: &mut R,
    ) -> ObservationToEncrypt {
        ObservationToEncrypt {
            observation,
            contribution_id: Some(source.random_id()),
        }
    }

    /// Wraps a fabricated or participation observation.
    pub fn synthetic(observation: Observation) -> ObservationToEncrypt {
        ObservationToEncrypt {
            observation,
            contribution_id: None,
        }
    }
}
