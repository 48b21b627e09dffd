use std::collections::BTreeSet;

use log::debug;

use super::{
    builder::ObservationBuilder,
    observation::ObservationToEncrypt,
    private_index::{
        event_vector_index, num_private_indices, private_index, value_index,
    },
    random::{sample_poisson, RandomSource},
};
use crate::{
    data::types::{AggregateRow, AggregateValue},
    error::CobaltError,
    registry::{types::PrivacyMechanism, validator::num_event_vectors},
};

/// Expands the real aggregates of one (report, day, device profile) into
/// every observation the report's privacy mechanism requires.
#[derive(Debug)]
pub struct PrivacyNoiseGenerator<R> {
    source: R,
}

impl<R: RandomSource> PrivacyNoiseGenerator<R> {
    pub fn new(source: R) -> Self {
        Self { source }
    }

    pub fn source_mut(&mut self) -> &mut R {
        &mut self.source
    }

    /// Observations for `rows`, which must all share one device profile.
    ///
    /// De-identification emits one real observation per row. Shuffled
    /// differential privacy emits one real private index per row (index 0 if
    /// there are no rows), Poisson-distributed fabricated indices over the
    /// rest of the domain, then a single participation observation.
    pub fn generate(
        &mut self,
        builder: &ObservationBuilder<'_>,
        rows: &[AggregateRow],
    ) -> Result<Vec<ObservationToEncrypt>, CobaltError> {
        match builder.report.privacy_mechanism {
            PrivacyMechanism::DeIdentification => Ok(rows
                .iter()
                .map(|row| {
                    let observation = builder.build(row, &mut self.source);
                    ObservationBuilder::real(observation, &mut self.source)
                })
                .collect()),
            PrivacyMechanism::ShuffledDifferentialPrivacy => {
                self.generate_shuffled_dp(builder, rows)
            }
        }
    }

    fn generate_shuffled_dp(
        &mut self,
        builder: &ObservationBuilder<'_>,
        rows: &[AggregateRow],
    ) -> Result<Vec<ObservationToEncrypt>, CobaltError> {
        let report = builder.report;
        let dimensions = &builder.metric.dimensions;
        let invalid =
            |reason: String| CobaltError::validation(builder.report_key, reason);

        let poisson_mean = report
            .shuffled_dp
            .as_ref()
            .map(|config| config.poisson_mean)
            .ok_or_else(|| invalid("missing shuffled_dp config".to_string()))?;
        let num_event_vectors = num_event_vectors(dimensions)
            .ok_or_else(|| invalid("event vector space overflows".to_string()))?;
        let num_indices = num_private_indices(dimensions, report.num_index_points)
            .ok_or_else(|| invalid("private index space overflows".to_string()))?;

        let mut real_indices = Vec::with_capacity(rows.len().max(1));
        for row in rows {
            let AggregateValue::Integer(count) = row.value else {
                return Err(invalid(
                    "shuffled differential privacy requires integer aggregates"
                        .to_string(),
                ));
            };
            let ev_index = event_vector_index(&row.event_vector, dimensions)
                .map_err(&invalid)?;
            let value = i64::try_from(count).unwrap_or(i64::MAX);
            let v_index = value_index(
                value,
                report.min_value,
                report.max_value,
                report.num_index_points,
                &mut self.source,
            );
            real_indices.push(private_index(v_index, ev_index, num_event_vectors));
        }
        if real_indices.is_empty() {
            real_indices.push(0);
        }

        let mut observations = Vec::new();
        for index in &real_indices {
            let observation = builder.private_index(*index, &mut self.source);
            observations.push(ObservationBuilder::real(observation, &mut self.source));
        }

        let used: BTreeSet<u64> = real_indices.into_iter().collect();
        let mut num_fabricated = 0u64;
        for index in (0..num_indices).filter(|index| !used.contains(index)) {
            let count = sample_poisson(&mut self.source, poisson_mean);
            for _ in 0..count {
                let observation = builder.private_index(index, &mut self.source);
                observations.push(ObservationBuilder::synthetic(observation));
            }
            num_fabricated += count;
        }
        debug!(
            "Report {}: {} real, {num_fabricated} fabricated observations",
            builder.report_key,
            used.len()
        );

        let participation = builder.participation(&mut self.source);
        observations.push(ObservationBuilder::synthetic(participation));
        Ok(observations)
    }
}
