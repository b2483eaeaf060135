use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// `send_next` called while `can_send` is false.
    #[error("window full: {in_flight} of {window_size} frames outstanding")]
    WindowFull { in_flight: u64, window_size: u32 },
    #[error("all {total_frames} frames have already been sent")]
    StreamExhausted { total_frames: u64 },
}
