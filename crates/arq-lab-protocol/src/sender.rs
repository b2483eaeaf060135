//! Go-Back-N send side.
//!
//! Window bookkeeping uses absolute (unbounded) frame counters; sequence
//! numbers are reduced modulo the sequence space only when a frame or
//! acknowledgment crosses the wire.
//!
//! ```text
//!      base            next_to_send      base + window_size
//!  ─────┼──────────────────┼──────────────────┼───────▶ frame index
//!       │ <── in flight ──▶│ <── sendable ───▶│
//! ```

use arq_lab_abstract::{Acknowledgment, Frame, LinkConfig};
use tracing::debug;

use crate::error::ProtocolError;
use crate::timer::RetransmitTimer;

/// Window owned exclusively by the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderState {
    /// Oldest unacknowledged frame index. Only ever increases.
    pub base: u64,
    /// Index of the next frame to put on the wire.
    pub next_to_send: u64,
    pub window_size: u32,
    pub sequence_space: u32,
    pub total_frames: u64,
}

impl SenderState {
    pub fn new(config: &LinkConfig) -> Self {
        Self {
            base: 0,
            next_to_send: 0,
            window_size: config.window_size,
            sequence_space: config.sequence_space,
            total_frames: config.total_frames,
        }
    }

    pub fn in_flight(&self) -> u64 {
        self.next_to_send - self.base
    }

    fn wire_seq(&self, absolute: u64) -> u32 {
        (absolute % u64::from(self.sequence_space)) as u32
    }
}

/// How the sender classified an incoming acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// The window slid forward by `frames`.
    Advanced { frames: u64 },
    /// Acknowledges nothing new (`advance == 0`).
    Duplicate,
    /// Claims more than is outstanding.
    OutOfWindow { advance: u64 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SenderStats {
    pub frames_sent: u64,
    pub retransmissions: u64,
    pub timeouts: u64,
    pub acks_accepted: u64,
    pub duplicate_acks: u64,
    pub out_of_window_acks: u64,
}

#[derive(Debug, Clone)]
pub struct Sender {
    state: SenderState,
    timer: RetransmitTimer,
    /// Highest `next_to_send` ever reached; frames below it are resends.
    high_water: u64,
    stats: SenderStats,
}

impl Sender {
    pub fn new(config: &LinkConfig) -> Self {
        Self {
            state: SenderState::new(config),
            timer: RetransmitTimer::new(config.timeout),
            high_water: 0,
            stats: SenderStats::default(),
        }
    }

    pub fn state(&self) -> &SenderState {
        &self.state
    }

    pub fn timer(&self) -> &RetransmitTimer {
        &self.timer
    }

    pub fn stats(&self) -> &SenderStats {
        &self.stats
    }

    pub fn base(&self) -> u64 {
        self.state.base
    }

    pub fn next_to_send(&self) -> u64 {
        self.state.next_to_send
    }

    /// Room in the window for one more frame.
    pub fn can_send(&self) -> bool {
        self.state.in_flight() < u64::from(self.state.window_size)
    }

    /// Room in the window and frames left in the stream.
    pub fn has_sendable(&self) -> bool {
        self.can_send() && self.state.next_to_send < self.state.total_frames
    }

    /// Every frame of the stream has been acknowledged.
    pub fn is_done(&self) -> bool {
        self.state.base >= self.state.total_frames
    }

    pub fn send_next(&mut self, now: u64) -> Result<Frame, ProtocolError> {
        if !self.can_send() {
            return Err(ProtocolError::WindowFull {
                in_flight: self.state.in_flight(),
                window_size: self.state.window_size,
            });
        }
        if self.state.next_to_send >= self.state.total_frames {
            return Err(ProtocolError::StreamExhausted {
                total_frames: self.state.total_frames,
            });
        }

        let index = self.state.next_to_send;
        let frame = Frame::indexed(self.state.wire_seq(index), index);
        self.state.next_to_send += 1;
        self.timer.arm(now);

        self.stats.frames_sent += 1;
        if index < self.high_water {
            self.stats.retransmissions += 1;
        }
        self.high_water = self.high_water.max(self.state.next_to_send);

        debug!(
            "send frame {} (seq {}), window [{}, {})",
            index,
            frame.seq_num,
            self.state.base,
            self.state.next_to_send
        );
        Ok(frame)
    }

    pub fn on_acknowledgment(&mut self, ack: Acknowledgment, now: u64) -> AckOutcome {
        let space = u64::from(self.state.sequence_space);
        let base_seq = self.state.base % space;
        let advance = (u64::from(ack.ack_num) + space - base_seq) % space;

        if advance == 0 {
            self.stats.duplicate_acks += 1;
            debug!("duplicate ack {} at base {}", ack.ack_num, self.state.base);
            return AckOutcome::Duplicate;
        }
        if advance > self.state.in_flight() {
            self.stats.out_of_window_acks += 1;
            debug!(
                "out-of-window ack {} (advance {}, {} outstanding)",
                ack.ack_num,
                advance,
                self.state.in_flight()
            );
            return AckOutcome::OutOfWindow { advance };
        }

        self.state.base += advance;
        self.stats.acks_accepted += 1;
        if self.state.base == self.state.next_to_send {
            self.timer.disarm();
        } else {
            self.timer.restart(now);
        }
        debug!(
            "ack {} slides window by {} to base {}",
            ack.ack_num, advance, self.state.base
        );
        AckOutcome::Advanced { frames: advance }
    }

    /// Go back to `base`; the caller resends from there.
    pub fn on_timeout(&mut self, now: u64) {
        self.stats.timeouts += 1;
        debug!(
            "timeout at {}: rewinding next_to_send {} -> {}",
            now, self.state.next_to_send, self.state.base
        );
        self.state.next_to_send = self.state.base;
        self.timer.restart(now);
    }
}
