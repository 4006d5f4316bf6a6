use std::sync::Arc;

use crate::bucket::Bucket;

/// One accepted line, tagged with the symbol it came from and its bucket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngestMessage {
    pub symbol: Arc<str>,
    pub payload: Vec<u8>,
    pub bucket: Bucket,
}

impl IngestMessage {
    pub fn new(symbol: Arc<str>, payload: &[u8], bucket: Bucket) -> Self {
        Self {
            symbol,
            payload: payload.to_vec(),
            bucket,
        }
    }

    /// Payload as text, replacing invalid UTF-8.
    pub fn payload_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}
