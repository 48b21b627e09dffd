use std::time::Duration;

use crate::{
    error::{EncryptionError, UploadError},
    observations::{EncryptedMessage, Envelope, ObservationToEncrypt},
};

/// Encrypts observations for the analyzer and envelopes for the shuffler.
pub trait Encrypter {
    fn encrypt_observation(
        &mut self,
        observation: &ObservationToEncrypt,
    ) -> Result<EncryptedMessage, EncryptionError>;

    fn encrypt_envelope(
        &mut self,
        envelope: &Envelope,
    ) -> Result<EncryptedMessage, EncryptionError>;
}

/// Network transport for encrypted envelopes.
pub trait Uploader {
    /// Sends one envelope, giving up after `timeout`.
    fn upload(
        &mut self,
        envelope: &EncryptedMessage,
        timeout: Duration,
    ) -> Result<(), UploadError>;

    /// Called once per cycle that reaches the upload phase, whatever the
    /// outcome.
    fn notify_upload_finished(&mut self);
}

/// Records the outcome of each cycle that reaches the upload decision.
pub trait OperationLogger {
    fn record_upload_success(&mut self);

    fn record_upload_failure(&mut self);
}
