use crate::config::LinkConfig;
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub config: LinkConfigOverride,
    /// Name of a frame-integrity codec to plug into the link.
    #[serde(default)]
    pub codec: Option<String>,
    #[serde(default)]
    pub actions: Vec<TestAction>,
    #[serde(default)]
    pub assertions: Vec<TestAssertion>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct LinkConfigOverride {
    pub window_size: Option<u32>,
    pub sequence_space: Option<u32>,
    pub total_frames: Option<u64>,
    pub frame_loss_probability: Option<f64>,
    pub ack_loss_probability: Option<f64>,
    pub corruption_probability: Option<f64>,
    pub transmission_delay: Option<u64>,
    pub timeout: Option<u64>,
    pub seed: Option<u64>,
}

impl LinkConfigOverride {
    pub fn apply_to(&self, config: &mut LinkConfig) {
        if let Some(v) = self.window_size {
            config.window_size = v;
        }
        if let Some(v) = self.sequence_space {
            config.sequence_space = v;
        }
        if let Some(v) = self.total_frames {
            config.total_frames = v;
        }
        if let Some(v) = self.frame_loss_probability {
            config.frame_loss_probability = v;
        }
        if let Some(v) = self.ack_loss_probability {
            config.ack_loss_probability = v;
        }
        if let Some(v) = self.corruption_probability {
            config.corruption_probability = v;
        }
        if let Some(v) = self.transmission_delay {
            config.transmission_delay = v;
        }
        if let Some(v) = self.timeout {
            config.timeout = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAction {
    /// Drop the Nth frame transmission (1-based, retransmissions included)
    DropFrameTransmission { nth: u64 },
    /// Drop the first frame sent with the given wire sequence number
    DropNextFrameSeq { seq: u32 },
    /// Drop the Nth acknowledgment transmission (1-based)
    DropAckTransmission { nth: u64 },
    /// Drop the first acknowledgment carrying the given ack number
    DropNextAck { ack: u32 },
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAssertion {
    /// Deliveries are exactly 0..total_frames in order
    DeliveredInOrder,
    /// Number of retransmitted frames is within range
    Retransmissions { min: u64, max: Option<u64> },
    /// Number of sender timeouts is within range
    Timeouts { min: u64, max: Option<u64> },
    /// Number of frames the receiver discarded as out of order is within range
    OutOfOrderDiscards { min: u64, max: Option<u64> },
    /// Total frame transmissions are within range
    FramesSent { min: u64, max: Option<u64> },
    /// Simulation finishes within the given number of rounds
    MaxRounds { rounds: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scenario_with_actions_and_assertions() {
        let text = r#"
name = "lost third frame"
description = "drop one frame"
codec = "hamming74"

[config]
window_size = 4
total_frames = 10

[[actions]]
type = "drop_frame_transmission"
nth = 3

[[assertions]]
type = "delivered_in_order"

[[assertions]]
type = "timeouts"
min = 1
"#;
        let scenario: TestScenario = toml::from_str(text).unwrap();
        assert_eq!(scenario.codec.as_deref(), Some("hamming74"));
        assert_eq!(
            scenario.actions,
            vec![TestAction::DropFrameTransmission { nth: 3 }]
        );
        assert_eq!(scenario.assertions[0], TestAssertion::DeliveredInOrder);
        assert_eq!(
            scenario.assertions[1],
            TestAssertion::Timeouts { min: 1, max: None }
        );

        let mut config = LinkConfig::default();
        scenario.config.apply_to(&mut config);
        assert_eq!(config.total_frames, 10);
        assert_eq!(config.sequence_space, 8);
    }
}
