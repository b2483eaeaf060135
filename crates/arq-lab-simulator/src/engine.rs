use arq_lab_abstract::{Delivery, Frame, FrameCodec, LinkConfig, TestAction};
use arq_lab_protocol::{AckOutcome, Receiver, Sender};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::channel::{Channel, Transit};
use crate::error::SimError;
use crate::trace::{LinkEvent, SimulationReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Done,
}

/// Round-based Go-Back-N simulation.
///
/// Each round the sender fills its window, every surviving frame reaches
/// the receiver, every surviving ack reaches the sender, and then the
/// logical clock moves forward by one transmission delay before the
/// retransmission timer is checked. All randomness comes from the
/// channel's injected generator, so a seed replays a run exactly.
pub struct Simulation<R: Rng = StdRng> {
    config: LinkConfig,
    sender: Sender,
    receiver: Receiver,
    channel: Channel<R>,
    codec: Option<Box<dyn FrameCodec>>,

    clock: u64,
    round: u64,
    run_state: RunState,

    pub deliveries: Vec<Delivery>,
    pub link_events: Vec<LinkEvent>,
    base_history: Vec<u64>,
    max_in_flight: u64,
    corrected_frames: u64,
    rejected_frames: u64,
}

impl Simulation<StdRng> {
    /// Simulation whose loss sequence is seeded from `config.seed`.
    pub fn new(config: LinkConfig) -> Result<Self, SimError> {
        let rng = StdRng::seed_from_u64(config.seed);
        Self::with_rng(config, rng)
    }
}

impl<R: Rng> Simulation<R> {
    pub fn with_rng(config: LinkConfig, rng: R) -> Result<Self, SimError> {
        config.validate()?;
        if !config.timeout_covers_round_trip() {
            warn!(
                "timeout {} does not exceed the round trip of {}; expect spurious retransmissions",
                config.timeout,
                2 * config.transmission_delay
            );
        }
        let sender = Sender::new(&config);
        let receiver = Receiver::new(&config);
        let channel = Channel::new(&config, rng);
        let run_state = if sender.is_done() {
            RunState::Done
        } else {
            RunState::Running
        };

        Ok(Self {
            config,
            sender,
            receiver,
            channel,
            codec: None,
            clock: 0,
            round: 0,
            run_state,
            deliveries: Vec::new(),
            link_events: Vec::new(),
            base_history: Vec::new(),
            max_in_flight: 0,
            corrected_frames: 0,
            rejected_frames: 0,
        })
    }

    /// Plug a frame-integrity codec around the channel.
    pub fn with_codec(mut self, codec: Box<dyn FrameCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Register a deterministic one-shot fault.
    pub fn add_fault(&mut self, action: &TestAction) {
        self.channel.faults_mut().apply(action);
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    pub fn receiver(&self) -> &Receiver {
        &self.receiver
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn current_round(&self) -> u64 {
        self.round
    }

    pub fn current_time(&self) -> u64 {
        self.clock
    }

    /// `base` at the end of every round so far.
    pub fn base_history(&self) -> &[u64] {
        &self.base_history
    }

    fn event(&mut self, description: String) {
        self.link_events.push(LinkEvent {
            round: self.round,
            time: self.clock,
            description,
        });
    }

    /// Apply the codec, if any. `None` means the damage was detected but
    /// could not be repaired, so the frame never reaches the receiver.
    fn decode(&mut self, mut frame: Frame) -> Option<Frame> {
        let Some(codec) = &self.codec else {
            return Some(frame);
        };
        match codec.decode(&frame.payload) {
            Ok(decoded) => {
                if decoded.corrected {
                    self.corrected_frames += 1;
                    self.event(format!("[Receiver] CORRECTED frame {}", frame.payload_index));
                }
                frame.payload = decoded.data;
                Some(frame)
            }
            Err(err) => {
                self.rejected_frames += 1;
                debug!("frame {} rejected by codec: {}", frame.payload_index, err);
                self.event(format!(
                    "[Receiver] REJECT frame {} ({})",
                    frame.payload_index, err
                ));
                None
            }
        }
    }

    /// Run one round and report whether the transfer is finished.
    pub fn advance_one_round(&mut self) -> Result<RunState, SimError> {
        if self.run_state == RunState::Done {
            return Ok(RunState::Done);
        }
        self.round += 1;
        let now = self.clock;

        // 1. sender fills its window, each frame crosses the channel on its own
        let mut arrived = Vec::new();
        while self.sender.has_sendable() {
            let mut frame = self.sender.send_next(now)?;
            self.max_in_flight = self.max_in_flight.max(self.sender.state().in_flight());
            if let Some(codec) = &self.codec {
                frame.payload = codec.encode(&frame.payload);
            }
            let (index, seq) = (frame.payload_index, frame.seq_num);
            match self.channel.transmit(frame) {
                Transit::Delivered(frame) => {
                    self.event(format!("[Sender->Receiver] SEND frame {index} seq={seq}"));
                    arrived.push(frame);
                }
                Transit::Corrupted(frame, bit) => {
                    self.event(format!(
                        "[Sender->Receiver] CORRUPT frame {index} seq={seq} bit={bit}"
                    ));
                    arrived.push(frame);
                }
                Transit::Dropped(cause) => {
                    self.event(format!(
                        "[Sender->Receiver] DROP ({cause:?}) frame {index} seq={seq}"
                    ));
                }
            }
        }

        // 2. receiver answers every frame that made it
        let mut acks = Vec::new();
        for frame in arrived {
            let Some(frame) = self.decode(frame) else {
                continue;
            };
            let ack = self.receiver.on_frame(&frame, &mut self.deliveries);
            match self.channel.transmit(ack) {
                Transit::Dropped(cause) => {
                    self.event(format!(
                        "[Receiver->Sender] DROP ({cause:?}) ack={}",
                        ack.ack_num
                    ));
                }
                transit => acks.extend(transit.into_item()),
            }
        }

        // 3. sender slides its window
        for ack in acks {
            match self.sender.on_acknowledgment(ack, now) {
                AckOutcome::Advanced { frames } => self.event(format!(
                    "[Sender] ACK {} slides window by {frames} to base {}",
                    ack.ack_num,
                    self.sender.base()
                )),
                AckOutcome::Duplicate => {
                    self.event(format!("[Sender] DUPLICATE ack={}", ack.ack_num));
                }
                AckOutcome::OutOfWindow { .. } => {
                    self.event(format!("[Sender] OUT-OF-WINDOW ack={}", ack.ack_num));
                }
            }
        }

        // 4. time passes, the timer may fire
        self.clock += self.channel.transmission_delay().max(1);
        if self.sender.is_done() {
            self.run_state = RunState::Done;
        } else if self.sender.timer().has_expired(self.clock) {
            self.sender.on_timeout(self.clock);
            self.event(format!(
                "[Sender] TIMEOUT, going back to frame {}",
                self.sender.base()
            ));
        }

        debug_assert!(
            self.sender.state().in_flight() <= u64::from(self.config.window_size),
            "window bound violated"
        );
        self.base_history.push(self.sender.base());
        Ok(self.run_state)
    }

    /// Advance until every frame is acknowledged, giving up after
    /// `max_rounds`.
    pub fn run_to_completion(&mut self, max_rounds: u64) -> Result<SimulationReport, SimError> {
        info!(
            "Starting simulation: {} frames, window {}, sequence space {}",
            self.config.total_frames, self.config.window_size, self.config.sequence_space
        );
        while self.run_state == RunState::Running {
            if self.round >= max_rounds {
                return Err(SimError::RoundLimit { rounds: max_rounds });
            }
            self.advance_one_round()?;
        }
        info!(
            "Simulation complete after {} rounds ({} retransmissions, {} timeouts)",
            self.round,
            self.sender.stats().retransmissions,
            self.sender.stats().timeouts
        );
        Ok(self.export_report())
    }

    /// Serializable snapshot of the run so far.
    pub fn export_report(&self) -> SimulationReport {
        let stats = self.sender.stats();
        let payload_mismatches = self
            .deliveries
            .iter()
            .filter(|d| d.payload != d.payload_index.to_be_bytes())
            .count() as u64;

        SimulationReport {
            config: self.config.clone(),
            codec: self.codec.as_ref().map(|c| c.name().to_string()),
            rounds: self.round,
            duration: self.clock,
            delivered: self.deliveries.iter().map(|d| d.payload_index).collect(),
            payload_mismatches,
            frames_sent: stats.frames_sent,
            retransmissions: stats.retransmissions,
            timeouts: stats.timeouts,
            acks_accepted: stats.acks_accepted,
            duplicate_acks: stats.duplicate_acks,
            out_of_window_acks: stats.out_of_window_acks,
            out_of_order_discards: self.receiver.out_of_order_discards(),
            corrected_frames: self.corrected_frames,
            rejected_frames: self.rejected_frames,
            max_in_flight: self.max_in_flight,
            base_history: self.base_history.clone(),
            link_events: self.link_events.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arq_lab_protocol::Hamming74;

    fn base_config() -> LinkConfig {
        LinkConfig {
            window_size: 4,
            sequence_space: 8,
            total_frames: 10,
            transmission_delay: 10,
            timeout: 50,
            ..Default::default()
        }
    }

    #[test]
    fn lossless_run_needs_no_retransmission() {
        let mut sim = Simulation::new(base_config()).unwrap();
        let report = sim.run_to_completion(100).unwrap();

        assert!(report.delivered_in_order());
        assert_eq!(report.retransmissions, 0);
        assert_eq!(report.timeouts, 0);
        assert_eq!(report.frames_sent, 10);
        assert_eq!(report.rounds, 3);
        assert_eq!(sim.sender().base(), 10);
        assert_eq!(report.base_history, vec![4, 8, 10]);
        assert_eq!(sim.run_state(), RunState::Done);
    }

    #[test]
    fn dropped_third_frame_is_recovered_by_timeout() {
        let mut sim = Simulation::new(base_config()).unwrap();
        sim.add_fault(&TestAction::DropFrameTransmission { nth: 3 });
        let report = sim.run_to_completion(100).unwrap();

        assert!(report.delivered_in_order());
        // frames 3, 4 and 5 arrive while frame 2 is missing
        assert_eq!(report.out_of_order_discards, 3);
        assert_eq!(report.duplicate_acks, 3);
        assert_eq!(report.timeouts, 1);
        assert_eq!(report.retransmissions, 4);
        assert_eq!(report.frames_sent, 14);
        assert_eq!(report.rounds, 7);
    }

    #[test]
    fn lost_ack_is_covered_by_next_cumulative_ack() {
        let mut sim = Simulation::new(base_config()).unwrap();
        sim.add_fault(&TestAction::DropNextAck { ack: 3 });
        let report = sim.run_to_completion(100).unwrap();

        assert!(report.delivered_in_order());
        assert_eq!(report.timeouts, 0);
        assert_eq!(report.retransmissions, 0);
        assert_eq!(report.base_history[0], 4);
    }

    #[test]
    fn losing_every_ack_of_a_window_forces_timeout() {
        let mut sim = Simulation::new(base_config()).unwrap();
        for nth in 1..=4 {
            sim.add_fault(&TestAction::DropAckTransmission { nth });
        }
        let report = sim.run_to_completion(100).unwrap();

        assert!(report.delivered_in_order());
        assert_eq!(report.timeouts, 1);
        // resent frames 0..=3 are duplicates at the receiver
        assert_eq!(report.out_of_order_discards, 4);
    }

    #[test]
    fn empty_stream_is_done_before_any_round() {
        let mut sim = Simulation::new(LinkConfig {
            total_frames: 0,
            ..base_config()
        })
        .unwrap();
        assert_eq!(sim.run_state(), RunState::Done);
        let report = sim.run_to_completion(10).unwrap();
        assert_eq!(report.rounds, 0);
        assert!(report.delivered_in_order());
        assert_eq!(sim.advance_one_round().unwrap(), RunState::Done);
    }

    #[test]
    fn certain_loss_hits_round_limit() {
        let mut sim = Simulation::new(LinkConfig {
            frame_loss_probability: 1.0,
            ..base_config()
        })
        .unwrap();
        assert!(matches!(
            sim.run_to_completion(50),
            Err(SimError::RoundLimit { rounds: 50 })
        ));
        assert_eq!(sim.sender().base(), 0);
    }

    #[test]
    fn invalid_config_fails_before_running() {
        let result = Simulation::new(LinkConfig {
            timeout: 5,
            ..base_config()
        });
        assert!(matches!(result, Err(SimError::Config(_))));
    }

    #[test]
    fn same_seed_replays_same_run() {
        let config = LinkConfig {
            frame_loss_probability: 0.3,
            ack_loss_probability: 0.3,
            total_frames: 50,
            seed: 99,
            ..base_config()
        };
        let first = Simulation::new(config.clone())
            .unwrap()
            .run_to_completion(10_000)
            .unwrap();
        let second = Simulation::new(config)
            .unwrap()
            .run_to_completion(10_000)
            .unwrap();

        assert_eq!(first.base_history, second.base_history);
        assert_eq!(first.frames_sent, second.frames_sent);
        let describe = |r: &SimulationReport| {
            r.link_events
                .iter()
                .map(|e| e.description.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(describe(&first), describe(&second));
    }

    #[test]
    fn delivery_invariants_hold_under_random_loss() {
        for window_size in [1u32, 3, 7] {
            for loss in [0.0, 0.1, 0.3, 0.6] {
                for seed in 0..25u64 {
                    let config = LinkConfig {
                        window_size,
                        sequence_space: window_size + 1,
                        total_frames: 40,
                        frame_loss_probability: loss,
                        ack_loss_probability: loss,
                        seed,
                        ..base_config()
                    };
                    let report = Simulation::new(config)
                        .unwrap()
                        .run_to_completion(100_000)
                        .unwrap();

                    let label = format!("window {window_size} loss {loss} seed {seed}");
                    assert!(report.delivered_in_order(), "{label}: {:?}", report.delivered);
                    assert!(report.base_is_monotonic(), "{label}");
                    assert!(report.max_in_flight <= u64::from(window_size), "{label}");
                    assert_eq!(report.base_history.last(), Some(&40), "{label}");
                    assert_eq!(report.payload_mismatches, 0, "{label}");
                }
            }
        }
    }

    #[test]
    fn hamming_codec_repairs_corrupted_payloads() {
        let config = LinkConfig {
            corruption_probability: 1.0,
            total_frames: 30,
            seed: 3,
            ..base_config()
        };
        let mut sim = Simulation::new(config).unwrap().with_codec(Box::new(Hamming74));
        let report = sim.run_to_completion(10_000).unwrap();

        assert!(report.delivered_in_order());
        assert_eq!(report.payload_mismatches, 0);
        assert!(report.corrected_frames > 0);
        assert_eq!(report.codec.as_deref(), Some("hamming74"));
    }

    #[test]
    fn corruption_without_codec_reaches_the_receiver() {
        let config = LinkConfig {
            corruption_probability: 1.0,
            ..base_config()
        };
        let report = Simulation::new(config)
            .unwrap()
            .run_to_completion(100)
            .unwrap();
        assert!(report.delivered_in_order());
        assert_eq!(report.payload_mismatches, 10);
    }

    #[test]
    fn dropped_seq_after_wrap_is_recovered() {
        let mut sim = Simulation::new(LinkConfig {
            total_frames: 20,
            ..base_config()
        })
        .unwrap();
        // first two windows pass untouched, then seq 1 of the second lap
        sim.advance_one_round().unwrap();
        sim.advance_one_round().unwrap();
        assert_eq!(sim.sender().base(), 8);
        sim.add_fault(&TestAction::DropNextFrameSeq { seq: 1 });
        let report = sim.run_to_completion(100).unwrap();

        assert!(report.delivered_in_order());
        assert_eq!(report.timeouts, 1);
        assert!(
            report
                .link_events
                .iter()
                .any(|e| e.description.contains("DROP (Injected) frame 9 seq=1"))
        );
    }

    #[test]
    fn tight_timeout_is_warned_about_but_accepted() {
        let config = LinkConfig {
            timeout: 20,
            ..base_config()
        };
        assert!(!config.timeout_covers_round_trip());
        let report = Simulation::with_rng(config, StdRng::seed_from_u64(1))
            .unwrap()
            .run_to_completion(1_000)
            .unwrap();
        assert!(report.delivered_in_order());
    }

    #[test]
    fn caller_supplied_generator_drives_the_channel() {
        use rand::rngs::SmallRng;

        let config = LinkConfig {
            frame_loss_probability: 0.2,
            ack_loss_probability: 0.2,
            total_frames: 30,
            ..base_config()
        };
        let run = |seed| {
            Simulation::with_rng(config.clone(), SmallRng::seed_from_u64(seed))
                .unwrap()
                .run_to_completion(10_000)
                .unwrap()
        };
        let first = run(17);
        let second = run(17);
        assert!(first.delivered_in_order());
        assert_eq!(first.base_history, second.base_history);
        assert_eq!(first.frames_sent, second.frames_sent);
    }

    #[test]
    fn step_function_exposes_intermediate_state() {
        let mut sim = Simulation::new(base_config()).unwrap();
        assert_eq!(sim.advance_one_round().unwrap(), RunState::Running);
        assert_eq!(sim.current_round(), 1);
        assert_eq!(sim.current_time(), 10);
        assert_eq!(sim.receiver().expected(), 4);
        assert_eq!(sim.deliveries.len(), 4);
        assert_eq!(sim.base_history(), &[4]);
    }
}
