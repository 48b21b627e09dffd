use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use super::{
    CycleOutcome, DISABLED_RESET_TIME, LARGEST_AGGREGATION_WINDOW,
    MAX_BACKFILL_DAYS, RETENTION_MARGIN_DAYS,
};
use crate::{
    config::CycleConfig,
    data::{
        traits::AggregateStore,
        types::{AggregateRow, DayIndex, ReportKey},
    },
    error::CobaltError,
    observations::{
        ObservationBatch, ObservationBuilder, ObservationMetadata,
        ObservationToEncrypt, PrivacyNoiseGenerator, RandomSource,
    },
    registry::{types::PrivacyMechanism, types::Project, RegistryValidator},
    system::{time::day_index, SystemData, SystemProfile},
    upload::{Encrypter, EnvelopeBatcher, OperationLogger, Uploader},
};

type ObservationMap = BTreeMap<ObservationMetadata, Vec<ObservationToEncrypt>>;

/// Days of one report read during a cycle. They are deleted and the report's
/// last sent day advanced only if the whole cycle uploads.
#[derive(Debug)]
struct ProcessedReport {
    key: ReportKey,
    days: Vec<DayIndex>,
}

/// Everything a cycle read from the store before uploading.
#[derive(Debug, Default)]
struct CyclePlan {
    observations: ObservationMap,
    processed: Vec<ProcessedReport>,

    /// Reports seen for the first time, with the day they start after.
    /// Written in the cleanup transaction, never by an aborted cycle.
    new_reports: Vec<(ReportKey, DayIndex)>,
}

fn storage_error<E: Into<anyhow::Error>>(error: E) -> CobaltError {
    CobaltError::Storage(error.into())
}

/// Drives the periodic cycle: turns stored aggregates into observations,
/// uploads them, then commits or leaves state as it was.
///
/// Cycles must not overlap; `run_cycle` takes `&mut self` so a single job
/// cannot run two at once.
pub struct PeriodicJob<S, E, U, L, R>
where
    S: AggregateStore,
    E: Encrypter,
    U: Uploader,
    L: OperationLogger,
    R: RandomSource,
{
    project: Project,
    config: CycleConfig,
    system_data: SystemData,
    privacy: PrivacyNoiseGenerator<R>,

    /// Aggregate storage interface.
    pub store: S,
    pub encrypter: E,
    pub uploader: U,
    pub operation_logger: L,
}

impl<S, E, U, L, R> PeriodicJob<S, E, U, L, R>
where
    S: AggregateStore,
    E: Encrypter,
    U: Uploader,
    L: OperationLogger,
    R: RandomSource,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        project: Project,
        config: CycleConfig,
        system_data: SystemData,
        store: S,
        encrypter: E,
        uploader: U,
        operation_logger: L,
        source: R,
    ) -> Self {
        Self {
            project,
            config,
            system_data,
            privacy: PrivacyNoiseGenerator::new(source),
            store,
            encrypter,
            uploader,
            operation_logger,
        }
    }

    pub fn config(&self) -> &CycleConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: CycleConfig) {
        self.config = config;
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    /// Runs one cycle as of `now`.
    ///
    /// Upload failures are reported through the outcome and the operation
    /// logger. Storage errors abort the cycle without committing anything;
    /// once envelopes were uploaded the uploader is still notified.
    pub fn run_cycle(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<CycleOutcome, CobaltError> {
        if !self.config.enabled {
            self.record_disabled(now)?;
            debug!("Logging disabled, skipping upload cycle");
            return Ok(CycleOutcome::Disabled);
        }
        let enabled_since = self.record_enabled(now)?;

        let CyclePlan {
            observations,
            processed,
            new_reports,
        } = self.generate_observations(now, enabled_since)?;

        let outcome = match self.upload(observations) {
            Ok((envelopes, observations)) => {
                // Notified even if the commit fails.
                let committed = self.commit(&processed);
                self.uploader.notify_upload_finished();
                committed?;
                self.operation_logger.record_upload_success();
                info!(
                    "Uploaded {observations} observations in {envelopes} envelopes for {} reports",
                    processed.len()
                );
                CycleOutcome::Uploaded {
                    envelopes,
                    observations,
                }
            }
            Err(e) if e.is_upload_failure() => {
                warn!("Upload cycle failed, will retry next cycle: {e}");
                self.uploader.notify_upload_finished();
                self.operation_logger.record_upload_failure();
                CycleOutcome::UploadFailed
            }
            Err(e) => return Err(e),
        };

        self.cleanup(now, &new_reports)?;
        Ok(outcome)
    }

    /// Records the first time logging was seen disabled.
    fn record_disabled(&mut self, now: DateTime<Utc>) -> Result<(), CobaltError> {
        self.store
            .in_transaction(|store| {
                if store.disabled_since()?.is_none() {
                    store.set_disabled_since(Some(now))?;
                }
                Ok(())
            })
            .map_err(storage_error)
    }

    /// Clears the disabled marker and returns the time logging has been
    /// continuously enabled since. A long enough disabled period restarts
    /// that time at `now`.
    fn record_enabled(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, CobaltError> {
        self.store
            .in_transaction(|store| {
                let mut enabled_since = store.enabled_since()?;
                if let Some(disabled_since) = store.disabled_since()? {
                    if now.signed_duration_since(disabled_since)
                        > DISABLED_RESET_TIME
                    {
                        info!("Logging was disabled since {disabled_since}, not backfilling");
                        enabled_since = None;
                    }
                    store.set_disabled_since(None)?;
                }
                match enabled_since {
                    Some(time) => Ok(time),
                    None => {
                        store.set_enabled_since(now)?;
                        Ok(now)
                    }
                }
            })
            .map_err(storage_error)
    }

    fn generate_observations(
        &mut self,
        now: DateTime<Utc>,
        enabled_since: DateTime<Utc>,
    ) -> Result<CyclePlan, CobaltError> {
        let Self {
            project,
            config,
            system_data,
            privacy,
            store,
            ..
        } = self;

        let mut plan = CyclePlan::default();

        for (metric, report, key) in project.reports() {
            if !metric.is_collected(report, config.release_stage) {
                debug!("Report {key} is not collected at {:?}", config.release_stage);
                continue;
            }
            if config.is_ignored(&key) {
                debug!("Report {key} is ignored");
                continue;
            }
            let builder = match RegistryValidator::validate(metric, report)
                .map_err(|reason| CobaltError::validation(key, reason))
                .and_then(|()| ObservationBuilder::new(metric, report, key))
            {
                Ok(builder) => builder,
                Err(e) => {
                    warn!("Skipping report: {e}");
                    continue;
                }
            };

            let today = day_index(now, &metric.time_zone_policy)?;
            let Some(last_sent) =
                store.last_sent_day_index(&key).map_err(storage_error)?
            else {
                debug!("Report {key} seen for the first time");
                plan.new_reports.push((key, today - 1));
                continue;
            };
            let enabled_day = day_index(enabled_since, &metric.time_zone_policy)?;
            let days = days_to_send(last_sent, today, enabled_day);
            if days.is_empty() {
                continue;
            }

            match generate_report(&*store, privacy, system_data, &builder, &days) {
                Ok(generated) => {
                    for (metadata, report_observations) in generated {
                        plan.observations
                            .entry(metadata)
                            .or_default()
                            .extend(report_observations);
                    }
                    plan.processed.push(ProcessedReport { key, days });
                }
                Err(e @ CobaltError::Validation { .. }) => {
                    warn!("Skipping report: {e}");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(plan)
    }

    /// Encrypts everything, then uploads. Returns the number of envelopes
    /// and observations sent.
    fn upload(
        &mut self,
        observations: ObservationMap,
    ) -> Result<(usize, usize), CobaltError> {
        let num_observations = observations.values().map(Vec::len).sum();

        let mut batches = Vec::with_capacity(observations.len());
        for (metadata, to_encrypt) in observations {
            let encrypted_observations = to_encrypt
                .iter()
                .map(|observation| self.encrypter.encrypt_observation(observation))
                .collect::<Result<Vec<_>, _>>()?;
            batches.push(ObservationBatch {
                metadata,
                encrypted_observations,
            });
        }

        let batcher = EnvelopeBatcher::new(
            self.config.api_key.clone(),
            self.config.max_envelope_bytes,
        );
        let envelopes = batcher.batch(batches)?;
        let encrypted_envelopes = envelopes
            .iter()
            .map(|envelope| self.encrypter.encrypt_envelope(envelope))
            .collect::<Result<Vec<_>, _>>()?;

        let timeout = self.config.upload_timeout();
        for envelope in &encrypted_envelopes {
            self.uploader.upload(envelope, timeout)?;
        }
        Ok((envelopes.len(), num_observations))
    }

    /// Deletes the sent days and advances each report past them, atomically.
    fn commit(&mut self, processed: &[ProcessedReport]) -> Result<(), CobaltError> {
        self.store
            .in_transaction(|store| {
                for report in processed {
                    for day in &report.days {
                        store.delete_aggregates(&report.key, *day)?;
                    }
                    if let Some(last_day) = report.days.last() {
                        store.advance_last_sent_day_index(&report.key, *last_day)?;
                    }
                }
                Ok(())
            })
            .map_err(storage_error)
    }

    /// Starts tracking new reports, drops aggregates past the retention
    /// horizon or already sent, and forgets reports that left the registry.
    fn cleanup(
        &mut self,
        now: DateTime<Utc>,
        new_reports: &[(ReportKey, DayIndex)],
    ) -> Result<(), CobaltError> {
        let mut boundaries = Vec::new();
        for key in self.store.report_keys().map_err(storage_error)? {
            let metric = self
                .project
                .find_metric(key.metric_id)
                .filter(|_| self.project.contains(&key));
            let boundary = match metric {
                None => None,
                Some(metric) => match day_index(now, &metric.time_zone_policy) {
                    Ok(today) => Some(
                        today - LARGEST_AGGREGATION_WINDOW - RETENTION_MARGIN_DAYS,
                    ),
                    Err(e) => {
                        warn!("Not cleaning up report {key}: {e}");
                        continue;
                    }
                },
            };
            boundaries.push((key, boundary));
        }

        self.store
            .in_transaction(|store| {
                for (key, day) in new_reports {
                    store.advance_last_sent_day_index(key, *day)?;
                }
                for (key, boundary) in &boundaries {
                    match boundary {
                        None => {
                            info!("Deleting report {key}, no longer in the registry");
                            store.delete_report(key)?;
                        }
                        Some(boundary) => {
                            // Days up to last sent can never be sent again.
                            let through = store
                                .last_sent_day_index(key)?
                                .map_or(*boundary, |last_sent| last_sent.max(*boundary));
                            store.delete_aggregates_through(key, through)?;
                            store.advance_last_sent_day_index(key, *boundary)?;
                        }
                    }
                }
                Ok(())
            })
            .map_err(storage_error)
    }
}

/// Days strictly after `last_sent` and strictly before `today`, no older
/// than the backfill limit and not before logging was enabled.
fn days_to_send(
    last_sent: DayIndex,
    today: DayIndex,
    enabled_day: DayIndex,
) -> Vec<DayIndex> {
    let first_day = (last_sent + 1)
        .max(today - MAX_BACKFILL_DAYS)
        .max(enabled_day);
    (first_day..today).collect()
}

fn generate_report<S: AggregateStore, R: RandomSource>(
    store: &S,
    privacy: &mut PrivacyNoiseGenerator<R>,
    system_data: &SystemData,
    builder: &ObservationBuilder<'_>,
    days: &[DayIndex],
) -> Result<Vec<(ObservationMetadata, Vec<ObservationToEncrypt>)>, CobaltError> {
    let mut generated = Vec::new();
    for &day in days {
        let rows = store
            .read_aggregates(&builder.report_key, day)
            .map_err(storage_error)?;
        let mut groups = group_by_profile(rows);

        // Private reports always emit participation, even on empty days.
        if groups.is_empty()
            && builder.report.privacy_mechanism
                == PrivacyMechanism::ShuffledDifferentialPrivacy
        {
            groups.push((
                system_data.filtered_system_profile(builder.report),
                Vec::new(),
            ));
        }

        for (profile, rows) in groups {
            let observations = privacy.generate(builder, &rows)?;
            if !observations.is_empty() {
                generated.push((
                    ObservationMetadata::new(&builder.report_key, day, profile),
                    observations,
                ));
            }
        }
    }
    Ok(generated)
}

/// Splits rows by device profile, keeping first-seen order.
fn group_by_profile(
    rows: Vec<AggregateRow>,
) -> Vec<(SystemProfile, Vec<AggregateRow>)> {
    let mut groups: Vec<(SystemProfile, Vec<AggregateRow>)> = Vec::new();
    for row in rows {
        match groups
            .iter_mut()
            .find(|(profile, _)| *profile == row.system_profile)
        {
            Some((_, group)) => group.push(row),
            None => groups.push((row.system_profile.clone(), vec![row])),
        }
    }
    groups
}
