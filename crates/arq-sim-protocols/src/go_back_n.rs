//! Go-Back-N with cumulative ACKs.
//!
//! The receiver only accepts the next in-order packet and acknowledges the
//! last sequence number it delivered. On timeout the sender resends every
//! outstanding packet.

use std::collections::VecDeque;

use arq_sim_abstract::{
    FIRST_SEQ_NO, Packet, ProtocolError, SystemContext, TransportProtocol, WindowConfig,
    restart_timer,
};

use crate::selective_repeat::{InFlight, WINDOW_METRIC};
use crate::seq::SeqSpace;

pub struct GbnSender {
    window: WindowConfig,
    seq: SeqSpace,
    base: u32,
    next_seq: u32,
    outstanding: VecDeque<InFlight>,
    backlog: VecDeque<Vec<u8>>,
}

impl GbnSender {
    pub fn new(window: WindowConfig) -> Self {
        Self {
            window,
            seq: SeqSpace::new(window.limit_seq_no),
            base: FIRST_SEQ_NO,
            next_seq: FIRST_SEQ_NO,
            outstanding: VecDeque::new(),
            backlog: VecDeque::new(),
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    fn is_window_full(&self) -> bool {
        self.outstanding.len() >= self.window.window_size as usize
    }

    fn try_send(&mut self, ctx: &mut dyn SystemContext) -> Result<(), ProtocolError> {
        while !self.is_window_full() {
            let Some(payload) = self.backlog.pop_front() else {
                break;
            };
            let starts_window = self.outstanding.is_empty();
            let packet = Packet::new_data(self.next_seq, payload);
            ctx.log(&format!(
                "GBN send seq={} ({} bytes)",
                self.next_seq,
                packet.len()
            ));
            ctx.send_packet(packet.clone());
            ctx.stats().original_packets += 1;
            self.outstanding.push_back(InFlight {
                packet,
                sent_at: ctx.now(),
                retransmitted: false,
                acked: false,
            });
            self.next_seq = self.seq.next(self.next_seq);
            ctx.record_metric(WINDOW_METRIC, self.outstanding.len() as f64);
            if starts_window {
                ctx.start_timer(self.window.rxmt_interval)?;
            }
        }
        Ok(())
    }
}

impl TransportProtocol for GbnSender {
    fn init(&mut self, ctx: &mut dyn SystemContext) -> Result<(), ProtocolError> {
        ctx.log(&format!(
            "GBN sender ready (window={})",
            self.window.window_size
        ));
        Ok(())
    }

    fn on_packet(
        &mut self,
        ctx: &mut dyn SystemContext,
        packet: Packet,
    ) -> Result<(), ProtocolError> {
        ctx.stats().acks_received += 1;
        if packet.is_corrupted() {
            ctx.stats().corrupted += 1;
            ctx.log("GBN corrupted ACK");
            return Ok(());
        }

        let ack = packet.header.ack_num;
        let Some(retired) = self
            .seq
            .offset(self.base, ack)
            .map(|offset| offset as usize + 1)
            .filter(|count| *count <= self.outstanding.len())
        else {
            ctx.log(&format!("GBN duplicate ACK {} (base={})", ack, self.base));
            return Ok(());
        };

        let now = ctx.now();
        for slot in self.outstanding.drain(..retired) {
            ctx.stats()
                .record_ack_timing(now - slot.sent_at, slot.retransmitted);
        }
        self.base = self.seq.next(ack);
        ctx.log(&format!(
            "GBN cumulative ACK {} retired {} (base={})",
            ack, retired, self.base
        ));
        ctx.record_metric(WINDOW_METRIC, self.outstanding.len() as f64);

        if self.outstanding.is_empty() {
            ctx.stop_timer();
        } else {
            restart_timer(ctx, self.window.rxmt_interval)?;
        }
        self.try_send(ctx)
    }

    fn on_timer(&mut self, ctx: &mut dyn SystemContext) -> Result<(), ProtocolError> {
        if self.outstanding.is_empty() {
            return Ok(());
        }
        ctx.log(&format!(
            "GBN timeout, resending {} packets from seq {}",
            self.outstanding.len(),
            self.base
        ));
        for slot in self.outstanding.iter_mut() {
            slot.retransmitted = true;
            ctx.send_packet(slot.packet.clone());
            ctx.stats().retransmissions += 1;
        }
        ctx.start_timer(self.window.rxmt_interval)
    }

    fn on_app_data(
        &mut self,
        ctx: &mut dyn SystemContext,
        data: &[u8],
    ) -> Result<(), ProtocolError> {
        self.backlog.push_back(data.to_vec());
        self.try_send(ctx)
    }

    fn in_flight(&self) -> usize {
        self.outstanding.len()
    }
}

pub struct GbnReceiver {
    seq: SeqSpace,
    expected_seq: u32,
}

impl GbnReceiver {
    pub fn new(window: WindowConfig) -> Self {
        Self {
            seq: SeqSpace::new(window.limit_seq_no),
            expected_seq: FIRST_SEQ_NO,
        }
    }

    fn send_ack(&mut self, ctx: &mut dyn SystemContext, ack: u32) {
        ctx.log(&format!("GBN send ACK {}", ack));
        ctx.send_packet(Packet::new_ack(ack));
        ctx.stats().acks_sent += 1;
    }
}

impl TransportProtocol for GbnReceiver {
    fn init(&mut self, ctx: &mut dyn SystemContext) -> Result<(), ProtocolError> {
        ctx.log("GBN receiver ready");
        Ok(())
    }

    fn on_packet(
        &mut self,
        ctx: &mut dyn SystemContext,
        packet: Packet,
    ) -> Result<(), ProtocolError> {
        if packet.is_corrupted() {
            ctx.stats().corrupted += 1;
            ctx.log(&format!(
                "GBN checksum mismatch for seq {}",
                packet.header.seq_num
            ));
            return Ok(());
        }

        if packet.header.seq_num == self.expected_seq {
            ctx.log(&format!(
                "GBN received seq {} ({} bytes)",
                packet.header.seq_num,
                packet.len()
            ));
            ctx.deliver_data(&packet.payload);
            ctx.stats().delivered += 1;
            self.send_ack(ctx, self.expected_seq);
            self.expected_seq = self.seq.next(self.expected_seq);
        } else {
            let last = self.seq.prev(self.expected_seq);
            ctx.log(&format!(
                "GBN unexpected seq {} (expect {}), re-ACK {}",
                packet.header.seq_num, self.expected_seq, last
            ));
            self.send_ack(ctx, last);
        }
        Ok(())
    }

    fn on_timer(&mut self, _ctx: &mut dyn SystemContext) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn on_app_data(
        &mut self,
        _ctx: &mut dyn SystemContext,
        _data: &[u8],
    ) -> Result<(), ProtocolError> {
        Ok(())
    }
}
