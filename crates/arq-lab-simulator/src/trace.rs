use arq_lab_abstract::LinkConfig;
use serde::Serialize;

/// A compact textual record of one link event, for post-mortem reading.
#[derive(Debug, Clone, Serialize)]
pub struct LinkEvent {
    pub round: u64,
    pub time: u64,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub config: LinkConfig,
    pub codec: Option<String>,
    pub rounds: u64,
    pub duration: u64,
    pub delivered: Vec<u64>,
    /// Deliveries whose payload differs from what the sender put in.
    pub payload_mismatches: u64,
    pub frames_sent: u64,
    pub retransmissions: u64,
    pub timeouts: u64,
    pub acks_accepted: u64,
    pub duplicate_acks: u64,
    pub out_of_window_acks: u64,
    pub out_of_order_discards: u64,
    pub corrected_frames: u64,
    pub rejected_frames: u64,
    pub max_in_flight: u64,
    pub base_history: Vec<u64>,
    pub link_events: Vec<LinkEvent>,
}

impl SimulationReport {
    /// Deliveries are exactly `0..total_frames`, each once, in order.
    pub fn delivered_in_order(&self) -> bool {
        self.delivered.len() as u64 == self.config.total_frames
            && self
                .delivered
                .iter()
                .enumerate()
                .all(|(i, index)| i as u64 == *index)
    }

    pub fn base_is_monotonic(&self) -> bool {
        self.base_history.windows(2).all(|pair| pair[0] <= pair[1])
    }
}
