//! Discrete-event driver for ARQ protocols over an unreliable link.

pub mod engine;
pub mod error;
pub mod link;
pub mod queue;
pub mod rng;
pub mod scenario_runner;
pub mod source;
pub mod timer;
pub mod trace;

pub use engine::Simulator;
pub use error::SimError;
pub use link::{LinkOutcome, LinkStats, NetworkLink};
pub use queue::{Event, EventKind, EventQueue, NodeId};
pub use rng::RandomSource;
pub use source::{AlphabetSource, ArrivalProcess, MessageSource};
pub use timer::TimerRegistry;
pub use trace::{LinkEventSummary, SimulationReport};
