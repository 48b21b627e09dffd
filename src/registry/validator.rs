use log::warn;

use crate::observations::random::MAX_POISSON_MEAN;

use super::types::{
    MetricDefinition, MetricDimension, MetricType, PrivacyMechanism,
    ReportDefinition, ReportType, SystemProfileField, TimeZonePolicy,
};

/// Checks that a metric and report combination is supported by the pipeline.
pub struct RegistryValidator;

impl RegistryValidator {
    /// Returns the first reason the combination is unsupported, if any.
    pub fn validate(
        metric: &MetricDefinition,
        report: &ReportDefinition,
    ) -> Result<(), String> {
        if !Self::report_type_allowed(metric.metric_type, report.report_type) {
            return Err(format!(
                "metric type ({:?}) and report type ({:?}) are incompatible",
                metric.metric_type, report.report_type
            ));
        }

        if !Self::privacy_mechanism_allowed(
            report.report_type,
            report.privacy_mechanism,
        ) {
            return Err(format!(
                "report type ({:?}) does not support privacy mechanism ({:?})",
                report.report_type, report.privacy_mechanism
            ));
        }

        if let Some(field) = report
            .system_profile_fields
            .iter()
            .find(|field| !Self::system_profile_field_allowed(**field))
        {
            return Err(format!("system profile field {field:?} is unsupported"));
        }

        Self::validate_time_zone(&metric.time_zone_policy)?;
        Self::validate_release_stages(metric, report)?;

        match report.privacy_mechanism {
            PrivacyMechanism::DeIdentification => {
                if report.min_value != 0 || report.max_value != 0 {
                    return Err(
                        "min/max values are only used with shuffled differential privacy"
                            .to_string(),
                    );
                }
            }
            PrivacyMechanism::ShuffledDifferentialPrivacy => {
                Self::validate_shuffled_dp(metric, report)?;
            }
        }

        Ok(())
    }

    /// Like [`RegistryValidator::validate`], logging the failure reason.
    pub fn is_valid(metric: &MetricDefinition, report: &ReportDefinition) -> bool {
        match Self::validate(metric, report) {
            Ok(()) => true,
            Err(reason) => {
                warn!(
                    "Metric {} report {} failed validation: {reason}",
                    metric.id, report.id
                );
                false
            }
        }
    }

    pub fn report_type_allowed(
        metric_type: MetricType,
        report_type: ReportType,
    ) -> bool {
        matches!(
            (metric_type, report_type),
            (MetricType::Occurrence, ReportType::FleetwideOccurrenceCounts)
                | (MetricType::String, ReportType::StringCounts)
        )
    }

    pub fn privacy_mechanism_allowed(
        report_type: ReportType,
        mechanism: PrivacyMechanism,
    ) -> bool {
        match report_type {
            ReportType::FleetwideOccurrenceCounts => true,
            ReportType::StringCounts => {
                mechanism == PrivacyMechanism::DeIdentification
            }
            ReportType::FleetwideMeans => false,
        }
    }

    fn system_profile_field_allowed(field: SystemProfileField) -> bool {
        !matches!(field, SystemProfileField::Channel)
    }

    fn validate_time_zone(policy: &TimeZonePolicy) -> Result<(), String> {
        if let TimeZonePolicy::Other(name) = policy {
            name.parse::<chrono_tz::Tz>()
                .map_err(|_| format!("unknown time zone {name:?}"))?;
        }
        Ok(())
    }

    fn validate_release_stages(
        metric: &MetricDefinition,
        report: &ReportDefinition,
    ) -> Result<(), String> {
        match (metric.max_release_stage, report.max_release_stage) {
            (Some(metric_stage), Some(report_stage))
                if report_stage > metric_stage =>
            {
                Err(format!(
                    "report max release stage ({report_stage:?}) exceeds metric max release stage ({metric_stage:?})"
                ))
            }
            _ => Ok(()),
        }
    }

    fn validate_shuffled_dp(
        metric: &MetricDefinition,
        report: &ReportDefinition,
    ) -> Result<(), String> {
        if report.num_index_points == 0 {
            return Err("num_index_points must be positive".to_string());
        }
        if report.min_value < 0 || report.max_value < report.min_value {
            return Err(format!(
                "invalid value range [{}, {}]",
                report.min_value, report.max_value
            ));
        }
        match &report.shuffled_dp {
            Some(config)
                if config.poisson_mean > 0.0
                    && config.poisson_mean <= MAX_POISSON_MEAN => {}
            Some(config) => {
                return Err(format!(
                    "poisson_mean {} must be in (0, {MAX_POISSON_MEAN}]",
                    config.poisson_mean
                ))
            }
            None => return Err("missing shuffled_dp config".to_string()),
        }

        // Each (event vector, value) pair maps to one private index, so the
        // index space is num_event_vectors * num_index_points.
        let num_private_indices = num_event_vectors(&metric.dimensions)
            .and_then(|n| n.checked_mul(u64::from(report.num_index_points)));
        match num_private_indices {
            Some(n) if n < i32::MAX as u64 => Ok(()),
            _ => Err("private index space is too large".to_string()),
        }
    }
}

/// Number of distinct event vectors described by `dimensions`, or `None` on
/// overflow.
pub fn num_event_vectors(dimensions: &[MetricDimension]) -> Option<u64> {
    dimensions.iter().try_fold(1u64, |acc, dimension| {
        let size = if dimension.max_event_code != 0 {
            u64::from(dimension.max_event_code) + 1
        } else {
            dimension.event_codes.len() as u64
        };
        acc.checked_mul(size)
    })
}
