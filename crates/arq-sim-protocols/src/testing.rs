//! In-memory `SystemContext` for driving a single entity by hand.

use arq_sim_abstract::{Packet, ProtocolError, Statistics, SystemContext};

#[derive(Default)]
pub struct MockContext {
    pub now: f64,
    pub sent: Vec<Packet>,
    pub delivered: Vec<Vec<u8>>,
    pub logs: Vec<String>,
    pub stats: Statistics,
    pub timer: Option<f64>,
    pub timer_starts: usize,
}

impl MockContext {
    pub fn take_sent(&mut self) -> Vec<Packet> {
        std::mem::take(&mut self.sent)
    }

    /// Simulates the simulator honouring an expiration: the timer is gone
    /// by the time the handler runs.
    pub fn fire_timer(&mut self) {
        if let Some(expiry) = self.timer.take() {
            self.now = expiry;
        }
    }
}

impl SystemContext for MockContext {
    fn send_packet(&mut self, packet: Packet) {
        self.sent.push(packet);
    }

    fn start_timer(&mut self, duration: f64) -> Result<(), ProtocolError> {
        if self.timer.is_some() {
            return Err(ProtocolError::TimerAlreadyActive);
        }
        self.timer = Some(self.now + duration);
        self.timer_starts += 1;
        Ok(())
    }

    fn stop_timer(&mut self) {
        self.timer = None;
    }

    fn timer_active(&self) -> bool {
        self.timer.is_some()
    }

    fn deliver_data(&mut self, data: &[u8]) {
        self.delivered.push(data.to_vec());
    }

    fn log(&mut self, message: &str) {
        self.logs.push(message.to_string());
    }

    fn now(&self) -> f64 {
        self.now
    }

    fn stats(&mut self) -> &mut Statistics {
        &mut self.stats
    }
}

/// Flip one payload bit (or the sequence number of an empty packet).
pub fn corrupt(mut packet: Packet) -> Packet {
    match packet.payload.first_mut() {
        Some(byte) => *byte ^= 0x01,
        None => packet.header.seq_num ^= 0x01,
    }
    packet
}
