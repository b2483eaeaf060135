use arq_lab_abstract::{Acknowledgment, DeliverySink, Frame, LinkConfig};
use tracing::debug;

/// Expected-sequence counter owned exclusively by the receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverState {
    /// Absolute index of the next in-order frame.
    pub expected: u64,
    pub sequence_space: u32,
}

impl ReceiverState {
    pub fn new(config: &LinkConfig) -> Self {
        Self {
            expected: 0,
            sequence_space: config.sequence_space,
        }
    }

    pub fn expected_seq(&self) -> u32 {
        (self.expected % u64::from(self.sequence_space)) as u32
    }
}

/// What the receiver did with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDisposition {
    Accepted,
    Discarded,
}

#[derive(Debug, Clone)]
pub struct Receiver {
    state: ReceiverState,
    out_of_order_discards: u64,
    last_disposition: Option<FrameDisposition>,
}

impl Receiver {
    pub fn new(config: &LinkConfig) -> Self {
        Self {
            state: ReceiverState::new(config),
            out_of_order_discards: 0,
            last_disposition: None,
        }
    }

    pub fn state(&self) -> &ReceiverState {
        &self.state
    }

    pub fn expected(&self) -> u64 {
        self.state.expected
    }

    pub fn out_of_order_discards(&self) -> u64 {
        self.out_of_order_discards
    }

    pub fn last_disposition(&self) -> Option<FrameDisposition> {
        self.last_disposition
    }

    /// Accept the frame if it is the next in order and report it to `sink`.
    /// Either way, answer with the cumulative ack for what is expected next.
    pub fn on_frame(&mut self, frame: &Frame, sink: &mut dyn DeliverySink) -> Acknowledgment {
        if frame.seq_num == self.state.expected_seq() {
            if frame.payload_index != self.state.expected {
                debug!(
                    "seq {} carries frame {} but frame {} is expected",
                    frame.seq_num, frame.payload_index, self.state.expected
                );
            }
            sink.deliver(self.state.expected, &frame.payload);
            self.state.expected += 1;
            self.last_disposition = Some(FrameDisposition::Accepted);
            debug!(
                "accepted frame {} (seq {}), expecting seq {}",
                frame.payload_index,
                frame.seq_num,
                self.state.expected_seq()
            );
        } else {
            self.out_of_order_discards += 1;
            self.last_disposition = Some(FrameDisposition::Discarded);
            debug!(
                "discarded out-of-order seq {} (expecting seq {})",
                frame.seq_num,
                self.state.expected_seq()
            );
        }
        Acknowledgment::new(self.state.expected_seq())
    }
}
