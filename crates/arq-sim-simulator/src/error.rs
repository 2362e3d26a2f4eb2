use arq_sim_abstract::{ConfigError, ProtocolError};
use thiserror::Error;

use crate::queue::NodeId;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("{node:?} violated a protocol invariant: {source}")]
    Protocol {
        node: NodeId,
        #[source]
        source: ProtocolError,
    },

    /// The run kept producing events past the configured budget, which
    /// means the protocol is not converging.
    #[error("event budget of {events} exhausted at time {time:.3}")]
    EventBudgetExhausted { events: u64, time: f64 },
}
