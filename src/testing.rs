//! Deterministic stand-ins for the injected collaborators, plus sample
//! values to reduce boilerplate in tests.

use std::{collections::BTreeMap, time::Duration};

use crate::{
    config::CycleConfig,
    error::{EncryptionError, UploadError},
    observations::{
        observation::RANDOM_ID_BYTES, EncryptedMessage, Envelope, Observation,
        ObservationMetadata, ObservationToEncrypt, RandomSource,
    },
    registry::types::ReleaseStage,
    upload::{Encrypter, OperationLogger, Uploader},
};

/// Always returns the same uniform and fills bytes with the same value.
/// The default (0.0, 1) rounds every value down and makes every Poisson
/// draw zero.
#[derive(Debug, Clone)]
pub struct ConstantRandomSource {
    uniform: f64,
    byte: u8,
}

impl ConstantRandomSource {
    pub fn new(uniform: f64) -> Self {
        Self { uniform, byte: 1 }
    }
}

impl Default for ConstantRandomSource {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl RandomSource for ConstantRandomSource {
    fn next_f64(&mut self) -> f64 {
        self.uniform
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        dest.fill(self.byte);
    }
}

/// Cycles through a fixed list of uniforms. Bytes count up from 0.
#[derive(Debug, Clone)]
pub struct SequenceRandomSource {
    uniforms: Vec<f64>,
    position: usize,
    next_byte: u8,
}

impl SequenceRandomSource {
    pub fn new(uniforms: Vec<f64>) -> Self {
        Self {
            uniforms,
            position: 0,
            next_byte: 0,
        }
    }
}

impl RandomSource for SequenceRandomSource {
    fn next_f64(&mut self) -> f64 {
        if self.uniforms.is_empty() {
            return 0.0;
        }
        let value = self.uniforms[self.position % self.uniforms.len()];
        self.position += 1;
        value
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for byte in dest {
            *byte = self.next_byte;
            self.next_byte = self.next_byte.wrapping_add(1);
        }
    }
}

/// "Encrypts" by serializing with bincode, so tests can read everything
/// back. Can be told to fail.
#[derive(Debug, Default)]
pub struct FakeEncrypter {
    pub fail_observations: bool,
    pub fail_envelopes: bool,
}

impl FakeEncrypter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Encrypter for FakeEncrypter {
    fn encrypt_observation(
        &mut self,
        observation: &ObservationToEncrypt,
    ) -> Result<EncryptedMessage, EncryptionError> {
        if self.fail_observations {
            return Err(EncryptionError::Observation("forced failure".into()));
        }
        let ciphertext = bincode::serialize(&observation.observation)
            .map_err(|e| EncryptionError::Observation(e.to_string()))?;
        Ok(EncryptedMessage {
            ciphertext,
            contribution_id: observation.contribution_id,
        })
    }

    fn encrypt_envelope(
        &mut self,
        envelope: &Envelope,
    ) -> Result<EncryptedMessage, EncryptionError> {
        if self.fail_envelopes {
            return Err(EncryptionError::Envelope("forced failure".into()));
        }
        let ciphertext = bincode::serialize(envelope)
            .map_err(|e| EncryptionError::Envelope(e.to_string()))?;
        Ok(EncryptedMessage {
            ciphertext,
            contribution_id: None,
        })
    }
}

/// Keeps every uploaded envelope.
#[derive(Debug, Default)]
pub struct RecordingUploader {
    pub sent: Vec<EncryptedMessage>,
    pub upload_done_count: usize,

    /// Fail every upload with this error instead of recording it.
    pub fail_with: Option<UploadError>,

    pub last_timeout: Option<Duration>,
}

impl RecordingUploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Envelopes sent so far, decoded from [`FakeEncrypter`] output.
    pub fn sent_envelopes(&self) -> anyhow::Result<Vec<Envelope>> {
        self.sent
            .iter()
            .map(|message| -> anyhow::Result<Envelope> {
                Ok(bincode::deserialize(&message.ciphertext)?)
            })
            .collect()
    }
}

impl Uploader for RecordingUploader {
    fn upload(
        &mut self,
        envelope: &EncryptedMessage,
        timeout: Duration,
    ) -> Result<(), UploadError> {
        self.last_timeout = Some(timeout);
        if let Some(error) = &self.fail_with {
            return Err(error.clone());
        }
        self.sent.push(envelope.clone());
        Ok(())
    }

    fn notify_upload_finished(&mut self) {
        self.upload_done_count += 1;
    }
}

#[derive(Debug, Default)]
pub struct FakeOperationLogger {
    pub upload_successes: usize,
    pub upload_failures: usize,
}

impl OperationLogger for FakeOperationLogger {
    fn record_upload_success(&mut self) {
        self.upload_successes += 1;
    }

    fn record_upload_failure(&mut self) {
        self.upload_failures += 1;
    }
}

/// Observations of a [`FakeEncrypter`]-encrypted envelope, per batch.
pub fn observations_in(
    envelope: &Envelope,
) -> anyhow::Result<BTreeMap<ObservationMetadata, Vec<ObservationToEncrypt>>> {
    let mut observations = BTreeMap::new();
    for batch in &envelope.batches {
        let decoded = batch
            .encrypted_observations
            .iter()
            .map(|message| -> anyhow::Result<ObservationToEncrypt> {
                let observation: Observation =
                    bincode::deserialize(&message.ciphertext)?;
                Ok(ObservationToEncrypt {
                    observation,
                    contribution_id: message.contribution_id,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        observations.insert(batch.metadata.clone(), decoded);
    }
    Ok(observations)
}

/// Random id produced by [`ConstantRandomSource`].
pub const CONSTANT_RANDOM_ID: [u8; RANDOM_ID_BYTES] = [1; RANDOM_ID_BYTES];

impl CycleConfig {
    /// Sample config for testing.
    pub fn mock() -> Self {
        Self {
            api_key: "12345678".to_string(),
            release_stage: ReleaseStage::Dogfood,
            upload_timeout_ms: 10,
            ..Default::default()
        }
    }
}
