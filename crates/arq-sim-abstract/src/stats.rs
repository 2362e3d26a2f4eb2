use serde::{Deserialize, Serialize};

/// Counters updated by the protocol entities through `SystemContext::stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Data packets transmitted by the sender for the first time.
    pub original_packets: u64,
    pub retransmissions: u64,
    /// Payloads handed to the application sink at the receiver.
    pub delivered: u64,
    pub acks_sent: u64,
    /// ACK packets that reached the sender, corrupted or not.
    pub acks_received: u64,
    /// Packets either side rejected on checksum mismatch.
    pub corrupted: u64,
    pub rtt_sum: f64,
    pub rtt_samples: u64,
    pub comm_time_sum: f64,
    pub comm_time_samples: u64,
}

impl Statistics {
    /// Account for a packet that has just been acknowledged `elapsed` time
    /// units after its first transmission. Retransmitted packets only count
    /// towards communication time since their RTT is ambiguous.
    pub fn record_ack_timing(&mut self, elapsed: f64, retransmitted: bool) {
        self.comm_time_sum += elapsed;
        self.comm_time_samples += 1;
        if !retransmitted {
            self.rtt_sum += elapsed;
            self.rtt_samples += 1;
        }
    }

    pub fn average_rtt(&self) -> Option<f64> {
        (self.rtt_samples > 0).then(|| self.rtt_sum / self.rtt_samples as f64)
    }

    pub fn average_comm_time(&self) -> Option<f64> {
        (self.comm_time_samples > 0).then(|| self.comm_time_sum / self.comm_time_samples as f64)
    }
}
