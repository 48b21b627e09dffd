use serde::{Deserialize, Serialize};

use crate::{
    data::types::{DayIndex, ReportKey},
    system::SystemProfile,
};

/// Size of observation random ids and contribution ids, in bytes.
pub const RANDOM_ID_BYTES: usize = 8;

pub type RandomId = [u8; RANDOM_ID_BYTES];

/// One histogram bucket. `index` points into the observation's own
/// `string_hashes` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramBucket {
    pub index: u32,
    pub count: u64,
}

/// Payload of an observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObservationKind {
    Integer {
        event_codes: Vec<u32>,
        value: u64,
    },
    StringHistogram {
        /// Ascending, distinct.
        string_hashes: Vec<u64>,
        event_codes: Vec<u32>,
        buckets: Vec<HistogramBucket>,
    },
    PrivateIndex {
        index: u64,
    },
    ReportParticipation,
}

/// One privacy-protected unit of data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub kind: ObservationKind,
    pub random_id: RandomId,
}

/// An observation waiting for encryption. Only real observations carry a
/// contribution id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationToEncrypt {
    pub observation: Observation,
    pub contribution_id: Option<RandomId>,
}

impl ObservationToEncrypt {
    pub fn is_real(&self) -> bool {
        self.contribution_id.is_some()
    }
}

/// Opaque output of the encrypter. The contribution id travels in the
/// clear so it can be counted downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedMessage {
    pub ciphertext: Vec<u8>,
    pub contribution_id: Option<RandomId>,
}

/// Identifies the report, day and device profile a batch belongs to.
/// Ordered so a cycle emits batches in a deterministic order.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
pub struct ObservationMetadata {
    pub customer_id: u32,
    pub project_id: u32,
    pub metric_id: u32,
    pub report_id: u32,
    pub day_index: DayIndex,
    pub system_profile: SystemProfile,
}

impl ObservationMetadata {
    pub fn new(
        report: &ReportKey,
        day_index: DayIndex,
        system_profile: SystemProfile,
    ) -> Self {
        Self {
            customer_id: report.customer_id,
            project_id: report.project_id,
            metric_id: report.metric_id,
            report_id: report.report_id,
            day_index,
            system_profile,
        }
    }

    pub fn report_key(&self) -> ReportKey {
        ReportKey::new(
            self.customer_id,
            self.project_id,
            self.metric_id,
            self.report_id,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationBatch {
    pub metadata: ObservationMetadata,
    pub encrypted_observations: Vec<EncryptedMessage>,
}

/// Unit of upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub api_key: String,
    pub batches: Vec<ObservationBatch>,
}
