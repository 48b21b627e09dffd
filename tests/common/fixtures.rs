#![allow(unused)] // each test binary uses a different subset

use chrono::{DateTime, TimeDelta, Utc};
use cobaltlib::{
    config::CycleConfig,
    data::{AggregateStore, DayIndex, EventVector, HashMapAggregateStore, ReportKey},
    observations::{ObservationMetadata, RandomSource},
    periodic::PeriodicJob,
    registry::{
        MetricDefinition, MetricType, PrivacyMechanism, Project, ReleaseStage,
        ReportDefinition, ReportType, SystemProfileField, TimeZonePolicy,
    },
    system::{SystemData, SystemProfile},
    testing::{ConstantRandomSource, FakeEncrypter, FakeOperationLogger, RecordingUploader},
};

pub type TestJob<S = HashMapAggregateStore, R = ConstantRandomSource> =
    PeriodicJob<S, FakeEncrypter, RecordingUploader, FakeOperationLogger, R>;

pub const API_KEY: &str = "12345678";
pub const APP_VERSION: &str = "0.1.2";
pub const LOG_TIME_DAY: DayIndex = 19201;

pub const REPORT_1: ReportKey = ReportKey {
    customer_id: 1,
    project_id: 1,
    metric_id: 1,
    report_id: 1,
};
pub const REPORT_2: ReportKey = ReportKey {
    customer_id: 1,
    project_id: 1,
    metric_id: 2,
    report_id: 2,
};
pub const REPORT_3: ReportKey = ReportKey {
    customer_id: 1,
    project_id: 1,
    metric_id: 2,
    report_id: 3,
};
pub const REPORT_4: ReportKey = ReportKey {
    customer_id: 1,
    project_id: 1,
    metric_id: 2,
    report_id: 4,
};
pub const ALL_REPORTS: [ReportKey; 4] = [REPORT_1, REPORT_2, REPORT_3, REPORT_4];

pub fn log_time() -> DateTime<Utc> {
    "2022-07-28T14:15:30Z".parse().expect("valid timestamp")
}

pub fn enabled_time() -> DateTime<Utc> {
    log_time() - TimeDelta::days(32)
}

/// One day after the logged data, so LOG_TIME_DAY is the day to send.
pub fn upload_time() -> DateTime<Utc> {
    "2022-07-29T14:15:30Z".parse().expect("valid timestamp")
}

pub fn system_profile_1() -> SystemProfile {
    SystemProfile {
        system_version: Some("1.2.3".into()),
        ..Default::default()
    }
}

pub fn system_profile_2() -> SystemProfile {
    SystemProfile {
        system_version: Some("2.4.8".into()),
        ..Default::default()
    }
}

pub fn event_vector_1() -> EventVector {
    EventVector::from([1, 5])
}

pub fn event_vector_2() -> EventVector {
    EventVector::from([2, 6])
}

pub fn event_vector_3() -> EventVector {
    EventVector::from([3, 7])
}

pub fn metadata(
    report: &ReportKey,
    day_index: DayIndex,
    profile: SystemProfile,
) -> ObservationMetadata {
    ObservationMetadata::new(report, day_index, profile)
}

fn all_profile_fields() -> Vec<SystemProfileField> {
    vec![
        SystemProfileField::Os,
        SystemProfileField::Arch,
        SystemProfileField::BoardName,
        SystemProfileField::SystemVersion,
        SystemProfileField::AppVersion,
    ]
}

pub fn count_report(id: u32) -> ReportDefinition {
    ReportDefinition {
        id,
        report_type: ReportType::FleetwideOccurrenceCounts,
        privacy_mechanism: PrivacyMechanism::DeIdentification,
        system_profile_fields: all_profile_fields(),
        ..Default::default()
    }
}

pub fn metric_1() -> MetricDefinition {
    MetricDefinition {
        id: REPORT_1.metric_id,
        metric_type: MetricType::Occurrence,
        time_zone_policy: TimeZonePolicy::Other("America/Los_Angeles".into()),
        max_release_stage: Some(ReleaseStage::Dogfood),
        reports: vec![count_report(REPORT_1.report_id)],
        ..Default::default()
    }
}

pub fn metric_2() -> MetricDefinition {
    MetricDefinition {
        id: REPORT_2.metric_id,
        metric_type: MetricType::Occurrence,
        max_release_stage: Some(ReleaseStage::Dogfood),
        reports: vec![
            count_report(REPORT_2.report_id),
            count_report(REPORT_3.report_id),
            ReportDefinition {
                system_profile_fields: vec![],
                ..count_report(REPORT_4.report_id)
            },
        ],
        ..Default::default()
    }
}

/// A metric whose type no report supports; it has no reports.
pub fn metric_3() -> MetricDefinition {
    MetricDefinition {
        id: 3,
        metric_type: MetricType::Integer,
        max_release_stage: Some(ReleaseStage::Dogfood),
        ..Default::default()
    }
}

pub fn project(metrics: Vec<MetricDefinition>) -> Project {
    Project::new(REPORT_1.customer_id, REPORT_1.project_id, metrics)
}

pub fn default_project() -> Project {
    project(vec![metric_1(), metric_2(), metric_3()])
}

/// A job whose store has logging enabled well before the test days and
/// every registry report sent up to the day before LOG_TIME_DAY.
pub fn setup_with<R: RandomSource>(
    project: Project,
    config: CycleConfig,
    source: R,
) -> TestJob<HashMapAggregateStore, R> {
    let mut store = HashMapAggregateStore::new();
    store
        .set_enabled_since(enabled_time())
        .expect("in-memory store");
    for (_, _, key) in project.reports() {
        store
            .set_last_sent_day_index(&key, LOG_TIME_DAY - 1)
            .expect("in-memory store");
    }
    PeriodicJob::new(
        project,
        config,
        SystemData::with_app_version(APP_VERSION),
        store,
        FakeEncrypter::new(),
        RecordingUploader::new(),
        FakeOperationLogger::default(),
        source,
    )
}

pub fn setup(project: Project) -> TestJob {
    setup_with(project, CycleConfig::mock(), ConstantRandomSource::default())
}

pub fn last_sent<S, R>(job: &TestJob<S, R>, report: &ReportKey) -> Option<DayIndex>
where
    S: AggregateStore<Error = anyhow::Error>,
    R: RandomSource,
{
    job.store
        .last_sent_day_index(report)
        .expect("readable store")
}
