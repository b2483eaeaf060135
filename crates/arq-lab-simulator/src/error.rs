use arq_lab_abstract::ConfigError;
use arq_lab_protocol::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("simulation did not finish within {rounds} rounds")]
    RoundLimit { rounds: u64 },
    #[error("link closed before the transfer completed")]
    LinkClosed,
    #[error("endpoint task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
