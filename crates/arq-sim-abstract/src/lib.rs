pub mod checksum;
pub mod config;
pub mod interface;
pub mod packet;
pub mod scenario;
pub mod stats;

pub use interface::{ProtocolError, SystemContext, TransportProtocol, restart_timer};
pub use packet::{ArqHeader, Packet};

pub use config::{ConfigError, FIRST_SEQ_NO, SimConfig, WindowConfig};
pub use scenario::{SimConfigOverride, TestAction, TestAssertion, TestScenario};
pub use stats::Statistics;
