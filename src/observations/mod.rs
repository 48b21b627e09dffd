pub mod builder;
pub mod observation;
pub mod privacy;
pub mod private_index;
pub mod random;

pub use builder::ObservationBuilder;
pub use observation::{
    EncryptedMessage, Envelope, Observation, ObservationBatch, ObservationKind,
    ObservationMetadata, ObservationToEncrypt,
};
pub use privacy::PrivacyNoiseGenerator;
pub use random::{RandomSource, SecureRandomSource};
