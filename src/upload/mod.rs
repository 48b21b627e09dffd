pub mod envelope_batcher;
pub mod traits;

pub use envelope_batcher::{EnvelopeBatcher, ENVELOPE_MAX_OBSERVATION_BYTES};
pub use traits::{Encrypter, OperationLogger, Uploader};
