use crate::config::SimConfig;
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub config: SimConfigOverride,
    #[serde(default)]
    pub actions: Vec<TestAction>,
    #[serde(default)]
    pub assertions: Vec<TestAssertion>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SimConfigOverride {
    pub num_messages: Option<u64>,
    pub loss_prob: Option<f64>,
    pub corrupt_prob: Option<f64>,
    pub mean_delay: Option<f64>,
    pub message_interval: Option<f64>,
    pub window_size: Option<u32>,
    pub rxmt_interval: Option<f64>,
    pub trace: Option<u8>,
    pub seed: Option<u64>,
    pub max_events: Option<u64>,
}

impl SimConfigOverride {
    pub fn apply_to(&self, config: &mut SimConfig) {
        if let Some(v) = self.num_messages {
            config.num_messages = v;
        }
        if let Some(v) = self.loss_prob {
            config.loss_prob = v;
        }
        if let Some(v) = self.corrupt_prob {
            config.corrupt_prob = v;
        }
        if let Some(v) = self.mean_delay {
            config.mean_delay = v;
        }
        if let Some(v) = self.message_interval {
            config.message_interval = v;
        }
        if let Some(v) = self.window_size {
            config.window_size = v;
        }
        if let Some(v) = self.rxmt_interval {
            config.rxmt_interval = v;
        }
        if let Some(v) = self.trace {
            config.trace = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        if let Some(v) = self.max_events {
            config.max_events = v;
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAction {
    /// Application sends data at a specific time
    AppSend { time: f64, data: String },
    /// Deterministically drop the first packet sent by Sender with given seq number
    DropNextFromSenderSeq { seq: u32 },
    /// Deterministically drop the first ACK sent by Receiver with given ack number
    DropNextFromReceiverAck { ack: u32 },
    /// Deterministically corrupt the first packet sent by Sender with given seq number
    CorruptNextFromSenderSeq { seq: u32 },
    /// Deterministically corrupt the first ACK sent by Receiver with given ack number
    CorruptNextFromReceiverAck { ack: u32 },
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAssertion {
    /// Assert that specific data was delivered to the application layer
    DataDelivered { data: String },
    /// Assert the exact sequence of deliveries
    DeliveredInOrder { data: Vec<String> },
    /// Assert that the number of original data packets is within range
    SenderPacketCount { min: u64, max: Option<u64> },
    /// Assert that the number of retransmissions is within range
    Retransmissions { min: u64, max: Option<u64> },
    /// Assert that the number of checksum failures observed is within range
    CorruptedCount { min: u64, max: Option<u64> },
    /// Assert that the sender never had more than `max` packets in flight
    SenderWindowMax { max: u32 },
    /// Assert that simulation finishes within time
    MaxDuration { time: f64 },
}
