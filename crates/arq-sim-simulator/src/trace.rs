use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use arq_sim_abstract::{SimConfig, Statistics};

use crate::link::LinkStats;

/// A compact textual summary of important link-layer events for inspection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkEventSummary {
    pub time: f64,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub config: SimConfig,
    /// Simulation time of the last processed event.
    pub duration: f64,
    pub events_processed: u64,
    pub delivered_data: Vec<Vec<u8>>,
    pub stats: Statistics,
    pub link: LinkStats,
    pub loss_ratio: f64,
    pub corruption_ratio: f64,
    pub average_rtt: Option<f64>,
    pub average_comm_time: Option<f64>,
    /// Largest number of packets the sender ever had in flight.
    pub max_in_flight: usize,
    pub metrics: BTreeMap<String, Vec<(f64, f64)>>,
    pub link_events: Vec<LinkEventSummary>,
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let na = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |v| format!("{v:.3}"));
        writeln!(f, "===============STATISTICS=======================")?;
        writeln!(
            f,
            "Number of original packets transmitted by A: {}",
            self.stats.original_packets
        )?;
        writeln!(f, "Number of retransmissions by A: {}", self.stats.retransmissions)?;
        writeln!(
            f,
            "Number of data packets delivered to layer 5 at B: {}",
            self.stats.delivered
        )?;
        writeln!(f, "Number of ACK packets sent by B: {}", self.stats.acks_sent)?;
        writeln!(f, "Number of corrupted packets: {}", self.stats.corrupted)?;
        writeln!(f, "Ratio of lost packets: {:.3}", self.loss_ratio)?;
        writeln!(f, "Ratio of corrupted packets: {:.3}", self.corruption_ratio)?;
        writeln!(f, "Average RTT: {}", na(self.average_rtt))?;
        writeln!(f, "Average communication time: {}", na(self.average_comm_time))?;
        writeln!(f, "==================================================")?;
        writeln!(f, "Number of ACK packets received by A: {}", self.stats.acks_received)?;
        writeln!(f, "Number of RTT measurements: {}", self.stats.rtt_samples)?;
        writeln!(
            f,
            "Number of communication time measurements: {}",
            self.stats.comm_time_samples
        )?;
        write!(
            f,
            "Simulation finished at time {:.3} after {} events",
            self.duration, self.events_processed
        )
    }
}
