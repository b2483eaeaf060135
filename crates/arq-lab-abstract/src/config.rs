use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("window size must be at least 1")]
    WindowTooSmall,
    #[error("sequence space {sequence_space} must be at least window size + 1 ({window_size} + 1)")]
    SequenceSpaceTooSmall {
        sequence_space: u32,
        window_size: u32,
    },
    #[error("{field} = {value} is not a probability in [0, 1]")]
    ProbabilityOutOfRange { field: &'static str, value: f64 },
    #[error("timeout {timeout} must exceed transmission delay {transmission_delay}")]
    TimeoutTooShort { timeout: u64, transmission_delay: u64 },
}

/// Parameters of one Go-Back-N link.
///
/// Durations are logical ticks for the round simulator and milliseconds
/// for the live runner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LinkConfig {
    pub window_size: u32,
    pub sequence_space: u32,
    pub total_frames: u64,
    pub frame_loss_probability: f64,
    pub ack_loss_probability: f64,
    /// Chance that a surviving frame has one payload bit flipped.
    pub corruption_probability: f64,
    pub transmission_delay: u64,
    pub timeout: u64,
    pub seed: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            window_size: 4,
            sequence_space: 8,
            total_frames: 10,
            frame_loss_probability: 0.0,
            ack_loss_probability: 0.0,
            corruption_probability: 0.0,
            transmission_delay: 10,
            timeout: 50,
            seed: 0,
        }
    }
}

impl LinkConfig {
    /// Check the construction-time preconditions. Loss probabilities of
    /// exactly 1 pass validation but never terminate.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size < 1 {
            return Err(ConfigError::WindowTooSmall);
        }
        if u64::from(self.sequence_space) < u64::from(self.window_size) + 1 {
            return Err(ConfigError::SequenceSpaceTooSmall {
                sequence_space: self.sequence_space,
                window_size: self.window_size,
            });
        }
        for (field, value) in [
            ("frame_loss_probability", self.frame_loss_probability),
            ("ack_loss_probability", self.ack_loss_probability),
            ("corruption_probability", self.corruption_probability),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ProbabilityOutOfRange { field, value });
            }
        }
        if self.timeout <= self.transmission_delay {
            return Err(ConfigError::TimeoutTooShort {
                timeout: self.timeout,
                transmission_delay: self.transmission_delay,
            });
        }
        Ok(())
    }

    /// Whether an ack can make it back before the timer fires on a clean link.
    pub fn timeout_covers_round_trip(&self) -> bool {
        self.timeout > 2 * self.transmission_delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(LinkConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_sequence_space_equal_to_window() {
        let config = LinkConfig {
            window_size: 8,
            sequence_space: 8,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::SequenceSpaceTooSmall {
                sequence_space: 8,
                window_size: 8
            })
        );
    }

    #[test]
    fn rejects_zero_window() {
        let config = LinkConfig {
            window_size: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::WindowTooSmall));
    }

    #[test]
    fn rejects_timeout_not_exceeding_delay() {
        let config = LinkConfig {
            transmission_delay: 20,
            timeout: 20,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TimeoutTooShort { .. })
        ));
    }

    #[test]
    fn round_trip_check_needs_twice_the_delay() {
        let tight = LinkConfig {
            transmission_delay: 10,
            timeout: 20,
            ..Default::default()
        };
        assert!(tight.validate().is_ok());
        assert!(!tight.timeout_covers_round_trip());
        assert!(
            LinkConfig {
                timeout: 21,
                ..tight
            }
            .timeout_covers_round_trip()
        );
    }

    #[test]
    fn rejects_out_of_range_probability() {
        let config = LinkConfig {
            ack_loss_probability: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ProbabilityOutOfRange {
                field: "ack_loss_probability",
                ..
            })
        ));
        let config = LinkConfig {
            frame_loss_probability: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config: LinkConfig = toml::from_str("window_size = 3\ntotal_frames = 25\n").unwrap();
        assert_eq!(config.window_size, 3);
        assert_eq!(config.total_frames, 25);
        assert_eq!(config.sequence_space, 8);
    }
}
