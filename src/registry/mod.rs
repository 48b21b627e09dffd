pub mod types;
pub mod validator;

pub use types::{
    MetricDefinition, MetricDimension, MetricType, PrivacyMechanism, Project,
    ReleaseStage, ReportDefinition, ReportType, ShuffledDpConfig,
    SystemProfileField, TimeZonePolicy,
};
pub use validator::RegistryValidator;
