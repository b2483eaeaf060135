use serde::{Deserialize, Serialize};

/// A data frame on the forward link.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Frame {
    /// Wire sequence number, already reduced modulo the sequence space.
    pub seq_num: u32,
    /// Position of this frame in the unbounded logical stream.
    pub payload_index: u64,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(seq_num: u32, payload_index: u64, payload: Vec<u8>) -> Self {
        Self {
            seq_num,
            payload_index,
            payload,
        }
    }

    /// Frame whose payload is the big-endian encoding of its own index.
    pub fn indexed(seq_num: u32, payload_index: u64) -> Self {
        Self::new(seq_num, payload_index, payload_index.to_be_bytes().to_vec())
    }
}

/// Cumulative acknowledgment: everything before `ack_num` has arrived,
/// `ack_num` is the next sequence number the receiver wants.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Acknowledgment {
    pub ack_num: u32,
}

impl Acknowledgment {
    pub fn new(ack_num: u32) -> Self {
        Self { ack_num }
    }
}

/// One accepted frame as seen by the delivery observer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Delivery {
    pub payload_index: u64,
    pub payload: Vec<u8>,
}
