use serde::{Deserialize, Serialize};

use crate::registry::types::{ReportDefinition, SystemProfileField};

/// Device attributes attached to every observation. Which fields are kept
/// depends on the report's `system_profile_fields`.
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
#[serde(default)]
pub struct SystemProfile {
    pub os: Option<String>,
    pub arch: Option<String>,
    pub board_name: Option<String>,
    pub system_version: Option<String>,
    pub app_version: Option<String>,
    pub channel: Option<String>,
}

impl SystemProfile {
    /// Copy of `self` keeping only the selected fields.
    pub fn filtered(&self, fields: &[SystemProfileField]) -> SystemProfile {
        let mut profile = SystemProfile::default();
        for field in fields {
            match field {
                SystemProfileField::Os => profile.os = self.os.clone(),
                SystemProfileField::Arch => profile.arch = self.arch.clone(),
                SystemProfileField::BoardName => {
                    profile.board_name = self.board_name.clone()
                }
                SystemProfileField::SystemVersion => {
                    profile.system_version = self.system_version.clone()
                }
                SystemProfileField::AppVersion => {
                    profile.app_version = self.app_version.clone()
                }
                SystemProfileField::Channel => {
                    profile.channel = self.channel.clone()
                }
            }
        }
        profile
    }
}

/// The current device's attributes.
#[derive(Debug, Clone, Default)]
pub struct SystemData {
    profile: SystemProfile,
}

impl SystemData {
    pub fn new(profile: SystemProfile) -> Self {
        Self { profile }
    }

    /// Device data that only knows the app version.
    pub fn with_app_version(app_version: impl Into<String>) -> Self {
        Self::new(SystemProfile {
            app_version: Some(app_version.into()),
            ..Default::default()
        })
    }

    pub fn current_profile(&self) -> &SystemProfile {
        &self.profile
    }

    pub fn filtered_system_profile(
        &self,
        report: &ReportDefinition,
    ) -> SystemProfile {
        self.profile.filtered(&report.system_profile_fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filtered_system_profile() {
        let data = SystemData::new(SystemProfile {
            os: Some("Android".into()),
            system_version: Some("14".into()),
            app_version: Some("0.1.2".into()),
            ..Default::default()
        });

        let report = ReportDefinition {
            system_profile_fields: vec![SystemProfileField::AppVersion],
            ..Default::default()
        };
        assert_eq!(
            data.filtered_system_profile(&report),
            SystemProfile {
                app_version: Some("0.1.2".into()),
                ..Default::default()
            }
        );

        // No fields selected keeps nothing.
        assert_eq!(
            data.filtered_system_profile(&ReportDefinition::default()),
            SystemProfile::default()
        );
    }
}
