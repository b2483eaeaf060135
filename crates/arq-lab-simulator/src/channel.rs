//! Lossy link model shared by both directions.
//!
//! The channel owns no protocol state, only the loss policy, a
//! one-shot fault plan and the injected random source. Items are never
//! reordered or duplicated.

use arq_lab_abstract::{Acknowledgment, Frame, LinkConfig, TestAction};
use rand::Rng;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Sender to receiver.
    Forward,
    /// Receiver to sender.
    Reverse,
}

/// Anything the channel can carry.
pub trait Transmit {
    const DIRECTION: Direction;

    /// Sequence or ack number, used to match one-shot faults.
    fn wire_number(&self) -> u32;

    /// Payload bytes open to corruption, if any.
    fn payload_mut(&mut self) -> Option<&mut Vec<u8>> {
        None
    }
}

impl Transmit for Frame {
    const DIRECTION: Direction = Direction::Forward;

    fn wire_number(&self) -> u32 {
        self.seq_num
    }

    fn payload_mut(&mut self) -> Option<&mut Vec<u8>> {
        Some(&mut self.payload)
    }
}

impl Transmit for Acknowledgment {
    const DIRECTION: Direction = Direction::Reverse;

    fn wire_number(&self) -> u32 {
        self.ack_num
    }
}

/// What happened to an item handed to the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transit<T> {
    Delivered(T),
    /// Delivered with payload bit `bit` flipped.
    Corrupted(T, usize),
    Dropped(DropCause),
}

impl<T> Transit<T> {
    pub fn into_item(self) -> Option<T> {
        match self {
            Transit::Delivered(item) | Transit::Corrupted(item, _) => Some(item),
            Transit::Dropped(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropCause {
    RandomLoss,
    Injected,
}

/// Deterministic one-shot faults. Each entry fires at most once.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    frame_transmissions: Vec<u64>,
    frame_seqs: Vec<u32>,
    ack_transmissions: Vec<u64>,
    ack_numbers: Vec<u32>,
}

impl FaultPlan {
    pub fn apply(&mut self, action: &TestAction) {
        match action {
            TestAction::DropFrameTransmission { nth } => self.frame_transmissions.push(*nth),
            TestAction::DropNextFrameSeq { seq } => self.frame_seqs.push(*seq),
            TestAction::DropAckTransmission { nth } => self.ack_transmissions.push(*nth),
            TestAction::DropNextAck { ack } => self.ack_numbers.push(*ack),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frame_transmissions.is_empty()
            && self.frame_seqs.is_empty()
            && self.ack_transmissions.is_empty()
            && self.ack_numbers.is_empty()
    }

    /// Consume a matching fault for transmission `nth` of `number`.
    fn fire(&mut self, direction: Direction, nth: u64, number: u32) -> bool {
        let (by_count, by_number) = match direction {
            Direction::Forward => (&mut self.frame_transmissions, &mut self.frame_seqs),
            Direction::Reverse => (&mut self.ack_transmissions, &mut self.ack_numbers),
        };
        if let Some(pos) = by_count.iter().position(|n| *n == nth) {
            by_count.remove(pos);
            return true;
        }
        if let Some(pos) = by_number.iter().position(|n| *n == number) {
            by_number.remove(pos);
            return true;
        }
        false
    }
}

pub struct Channel<R: Rng> {
    frame_loss_probability: f64,
    ack_loss_probability: f64,
    corruption_probability: f64,
    transmission_delay: u64,
    rng: R,
    faults: FaultPlan,
    frame_transmissions: u64,
    ack_transmissions: u64,
}

impl<R: Rng> Channel<R> {
    pub fn new(config: &LinkConfig, rng: R) -> Self {
        Self {
            frame_loss_probability: config.frame_loss_probability,
            ack_loss_probability: config.ack_loss_probability,
            corruption_probability: config.corruption_probability,
            transmission_delay: config.transmission_delay,
            rng,
            faults: FaultPlan::default(),
            frame_transmissions: 0,
            ack_transmissions: 0,
        }
    }

    pub fn with_faults(mut self, faults: FaultPlan) -> Self {
        self.faults = faults;
        self
    }

    pub fn faults_mut(&mut self) -> &mut FaultPlan {
        &mut self.faults
    }

    pub fn transmission_delay(&self) -> u64 {
        self.transmission_delay
    }

    pub fn frame_transmissions(&self) -> u64 {
        self.frame_transmissions
    }

    pub fn ack_transmissions(&self) -> u64 {
        self.ack_transmissions
    }

    /// Pass one item through the link. Loss is sampled independently per
    /// call, with the probability of the item's direction.
    pub fn transmit<T: Transmit>(&mut self, mut item: T) -> Transit<T> {
        let (nth, loss_probability) = match T::DIRECTION {
            Direction::Forward => {
                self.frame_transmissions += 1;
                (self.frame_transmissions, self.frame_loss_probability)
            }
            Direction::Reverse => {
                self.ack_transmissions += 1;
                (self.ack_transmissions, self.ack_loss_probability)
            }
        };

        if self.faults.fire(T::DIRECTION, nth, item.wire_number()) {
            debug!(
                "{:?} transmission #{} ({}) dropped by fault plan",
                T::DIRECTION,
                nth,
                item.wire_number()
            );
            return Transit::Dropped(DropCause::Injected);
        }

        if self.rng.random::<f64>() < loss_probability {
            debug!(
                "{:?} transmission #{} ({}) lost in transit",
                T::DIRECTION,
                nth,
                item.wire_number()
            );
            return Transit::Dropped(DropCause::RandomLoss);
        }

        if let Some(payload) = item.payload_mut()
            && !payload.is_empty()
            && self.rng.random::<f64>() < self.corruption_probability
        {
            let bit = self.rng.random_range(0..payload.len() * 8);
            payload[bit / 8] ^= 1 << (bit % 8);
            debug!("{:?} transmission #{} corrupted at bit {}", T::DIRECTION, nth, bit);
            return Transit::Corrupted(item, bit);
        }

        Transit::Delivered(item)
    }
}
