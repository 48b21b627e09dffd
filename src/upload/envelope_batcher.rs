use log::{debug, warn};

use crate::{
    error::CobaltError,
    observations::{Envelope, ObservationBatch},
};

/// Default ceiling on the serialized size of an envelope.
pub const ENVELOPE_MAX_OBSERVATION_BYTES: u64 = 100_000;

/// Packs observation batches into envelopes of bounded size, greedily and
/// in input order.
#[derive(Debug, Clone)]
pub struct EnvelopeBatcher {
    api_key: String,
    max_bytes: u64,
}

impl EnvelopeBatcher {
    pub fn new(api_key: impl Into<String>, max_bytes: u64) -> Self {
        Self {
            api_key: api_key.into(),
            max_bytes,
        }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Every batch lands in exactly one envelope and no envelope is empty.
    /// Sizes count the whole serialized envelope, api key included. A batch
    /// that cannot fit even in an empty envelope gets one to itself rather
    /// than being dropped.
    pub fn batch(
        &self,
        batches: impl IntoIterator<Item = ObservationBatch>,
    ) -> Result<Vec<Envelope>, CobaltError> {
        let mut envelopes = Vec::new();
        let mut current = self.empty_envelope();
        let envelope_overhead = bincode::serialized_size(&current)?;
        let mut current_size = envelope_overhead;

        for batch in batches {
            let size = bincode::serialized_size(&batch)?;

            if envelope_overhead + size > self.max_bytes {
                warn!(
                    "Observation batch for report {} is {size} bytes, over the {} byte limit; sending it alone",
                    batch.metadata.report_key(),
                    self.max_bytes
                );
                if !current.batches.is_empty() {
                    envelopes.push(std::mem::replace(
                        &mut current,
                        self.empty_envelope(),
                    ));
                    current_size = envelope_overhead;
                }
                envelopes.push(Envelope {
                    api_key: self.api_key.clone(),
                    batches: vec![batch],
                });
                continue;
            }

            if current_size + size > self.max_bytes {
                envelopes.push(std::mem::replace(
                    &mut current,
                    self.empty_envelope(),
                ));
                current_size = envelope_overhead;
            }
            current.batches.push(batch);
            current_size += size;
        }

        if !current.batches.is_empty() {
            envelopes.push(current);
        }
        debug!("Packed observations into {} envelopes", envelopes.len());
        Ok(envelopes)
    }

    fn empty_envelope(&self) -> Envelope {
        Envelope {
            api_key: self.api_key.clone(),
            batches: Vec::new(),
        }
    }
}
