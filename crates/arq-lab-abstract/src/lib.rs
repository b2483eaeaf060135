pub mod config;
pub mod frame;
pub mod interface;
pub mod scenario;

pub use config::{ConfigError, LinkConfig};
pub use frame::{Acknowledgment, Delivery, Frame};
pub use interface::{CodecError, Decoded, DeliverySink, FrameCodec};
pub use scenario::{LinkConfigOverride, TestAction, TestAssertion, TestScenario};
