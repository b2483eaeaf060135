pub mod codec;
pub mod error;
pub mod receiver;
pub mod sender;
pub mod timer;

pub use codec::{Hamming74, IdentityCodec, codec_by_name};
pub use error::ProtocolError;
pub use receiver::{FrameDisposition, Receiver, ReceiverState};
pub use sender::{AckOutcome, Sender, SenderState, SenderStats};
pub use timer::RetransmitTimer;
