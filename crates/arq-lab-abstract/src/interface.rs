use crate::frame::Delivery;
use thiserror::Error;

/// Observer of in-order deliveries at the receiver.
///
/// Called exactly once per payload index, in increasing index order.
pub trait DeliverySink {
    fn deliver(&mut self, payload_index: u64, payload: &[u8]);
}

impl DeliverySink for Vec<Delivery> {
    fn deliver(&mut self, payload_index: u64, payload: &[u8]) {
        self.push(Delivery {
            payload_index,
            payload: payload.to_vec(),
        });
    }
}

impl DeliverySink for Vec<u64> {
    fn deliver(&mut self, payload_index: u64, _payload: &[u8]) {
        self.push(payload_index);
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("codeword block {index} has invalid value {value:#04x}")]
    InvalidCodeword { index: usize, value: u8 },
    #[error("codeword of {len} blocks does not decode to whole bytes")]
    TruncatedCodeword { len: usize },
}

/// Result of decoding a codeword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub data: Vec<u8>,
    /// At least one block needed repair.
    pub corrected: bool,
}

/// Frame-integrity codec applied to payloads around the channel.
pub trait FrameCodec: Send {
    fn name(&self) -> &'static str;

    fn encode(&self, data: &[u8]) -> Vec<u8>;

    fn decode(&self, codeword: &[u8]) -> Result<Decoded, CodecError>;
}
