pub mod channel;
pub mod engine;
pub mod error;
pub mod live;
pub mod scenario_runner;
pub mod trace;

pub use channel::{Channel, Direction, DropCause, FaultPlan, Transit, Transmit};
pub use engine::{RunState, Simulation};
pub use error::SimError;
pub use live::LiveReport;
pub use trace::{LinkEvent, SimulationReport};
