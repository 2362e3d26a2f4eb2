//! The unreliable channel between the two entities.
//!
//! Per transmitted packet the link draws, in this order:
//!
//! 1. `loss`: the packet vanishes if the draw is below `loss_prob`;
//! 2. `delay`: exponential with mean `mean_delay`;
//! 3. `corrupt`: a bit is flipped if the draw is below `corrupt_prob`;
//! 4. when corrupting, `target` (payload 75 %, sequence number 12.5 %,
//!    ack number 12.5 %) and then `bit`.
//!
//! Scripted faults registered for a run take precedence and draw nothing,
//! except that a scripted corruption still draws its delay.

use arq_sim_abstract::{Packet, SimConfig};
use serde::Serialize;
use tracing::debug;

use crate::queue::{EventKind, EventQueue, NodeId};
use crate::rng::RandomSource;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LinkStats {
    /// Packets handed to the link.
    pub transmitted: u64,
    pub lost: u64,
    pub corrupted: u64,
}

impl LinkStats {
    pub fn loss_ratio(&self) -> f64 {
        ratio(self.lost, self.transmitted)
    }

    /// Share of the packets that made it across which arrived corrupted.
    pub fn corruption_ratio(&self) -> f64 {
        ratio(self.corrupted, self.transmitted - self.lost)
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Drop,
    Corrupt,
}

/// A deterministic one-shot fault: the first packet from `from` whose
/// sequence number (sender) or ack number (receiver) equals `number`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptedFault {
    pub from: NodeId,
    pub number: u32,
    pub fault: Fault,
}

impl ScriptedFault {
    fn matches(&self, from: NodeId, packet: &Packet) -> bool {
        let number = match from {
            NodeId::Sender => packet.header.seq_num,
            NodeId::Receiver => packet.header.ack_num,
        };
        self.from == from && self.number == number
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CorruptionTarget {
    Payload,
    SeqNum,
    AckNum,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LinkOutcome {
    Lost { scripted: bool },
    Delivered {
        arrival: f64,
        delay: f64,
        corruption: Option<CorruptionTarget>,
    },
}

pub struct NetworkLink {
    loss_prob: f64,
    corrupt_prob: f64,
    mean_delay: f64,
    rng: RandomSource,
    scripted: Vec<ScriptedFault>,
    stats: LinkStats,
}

impl NetworkLink {
    pub fn new(config: &SimConfig, rng: RandomSource) -> Self {
        Self {
            loss_prob: config.loss_prob,
            corrupt_prob: config.corrupt_prob,
            mean_delay: config.mean_delay,
            rng,
            scripted: Vec::new(),
            stats: LinkStats::default(),
        }
    }

    pub fn add_fault(&mut self, fault: ScriptedFault) {
        self.scripted.push(fault);
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    /// Push `packet` from `from` into the channel. Either nothing is scheduled
    /// (lost) or exactly one `PacketArrival` for the peer is.
    pub fn transmit(
        &mut self,
        queue: &mut EventQueue,
        from: NodeId,
        mut packet: Packet,
        now: f64,
    ) -> LinkOutcome {
        self.stats.transmitted += 1;

        let scripted = self
            .scripted
            .iter()
            .position(|fault| fault.matches(from, &packet))
            .map(|pos| self.scripted.remove(pos).fault);

        match scripted {
            Some(Fault::Drop) => {
                debug!("Deterministically dropping packet from {:?}", from);
                self.stats.lost += 1;
                return LinkOutcome::Lost { scripted: true };
            }
            Some(Fault::Corrupt) => {
                let delay = self.draw_delay();
                let target = flip_bit(&mut packet, CorruptionTarget::Payload, 0.0);
                debug!("Deterministically corrupting packet from {:?}", from);
                self.stats.corrupted += 1;
                return self.schedule(queue, from, packet, now, delay, Some(target));
            }
            None => {}
        }

        if self.rng.draw_uniform() < self.loss_prob {
            debug!("Packet lost in channel");
            self.stats.lost += 1;
            return LinkOutcome::Lost { scripted: false };
        }

        let delay = self.draw_delay();
        let corruption = if self.rng.draw_uniform() < self.corrupt_prob {
            let target = match self.rng.draw_uniform() {
                x if x < 0.75 => CorruptionTarget::Payload,
                x if x < 0.875 => CorruptionTarget::SeqNum,
                _ => CorruptionTarget::AckNum,
            };
            let position = self.rng.draw_uniform();
            debug!("Packet corrupted in channel");
            self.stats.corrupted += 1;
            Some(flip_bit(&mut packet, target, position))
        } else {
            None
        };

        self.schedule(queue, from, packet, now, delay, corruption)
    }

    fn draw_delay(&mut self) -> f64 {
        self.mean_delay * -(1.0 - self.rng.draw_uniform()).ln()
    }

    fn schedule(
        &mut self,
        queue: &mut EventQueue,
        from: NodeId,
        packet: Packet,
        now: f64,
        delay: f64,
        corruption: Option<CorruptionTarget>,
    ) -> LinkOutcome {
        let arrival = now + delay;
        queue.push(
            arrival,
            EventKind::PacketArrival {
                to: from.peer(),
                packet,
            },
        );
        LinkOutcome::Delivered {
            arrival,
            delay,
            corruption,
        }
    }
}

/// Flip one bit of `target` chosen by `position` in `[0, 1)`. Packets with
/// an empty payload get their sequence number flipped instead.
fn flip_bit(packet: &mut Packet, target: CorruptionTarget, position: f64) -> CorruptionTarget {
    let pick = |bits: usize| ((position * bits as f64) as usize).min(bits - 1);
    match target {
        CorruptionTarget::Payload if !packet.payload.is_empty() => {
            let bit = pick(packet.payload.len() * 8);
            packet.payload[bit / 8] ^= 1 << (bit % 8);
            CorruptionTarget::Payload
        }
        CorruptionTarget::Payload | CorruptionTarget::SeqNum => {
            packet.header.seq_num ^= 1 << pick(32);
            CorruptionTarget::SeqNum
        }
        CorruptionTarget::AckNum => {
            packet.header.ack_num ^= 1 << pick(32);
            CorruptionTarget::AckNum
        }
    }
}
