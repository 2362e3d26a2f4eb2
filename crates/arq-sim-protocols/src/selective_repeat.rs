//! Selective Repeat with a single retransmission timer.
//!
//! The sender keeps up to `window_size` packets in flight and accepts
//! per-sequence-number ACKs. Only the oldest unacknowledged packet (`base`)
//! is covered by the timer, so a timeout retransmits that packet alone.
//! Messages offered while the window is full wait in a FIFO backlog and are
//! sent as soon as the window slides.
//!
//! The receiver buffers every in-window packet, ACKs it, and hands the
//! contiguous prefix starting at `expected_base` to the application.
//! Corrupted packets are dropped without an ACK; recovery is left to the
//! sender's timeout.

use std::collections::{HashMap, VecDeque};

use arq_sim_abstract::{
    FIRST_SEQ_NO, Packet, ProtocolError, SystemContext, TransportProtocol, WindowConfig,
    restart_timer,
};

use crate::seq::SeqSpace;

pub(crate) const WINDOW_METRIC: &str = "window_occupancy";

/// A data packet the sender has transmitted and not yet retired.
#[derive(Debug, Clone)]
pub(crate) struct InFlight {
    pub packet: Packet,
    /// Time of the first transmission.
    pub sent_at: f64,
    pub retransmitted: bool,
    pub acked: bool,
}

pub struct SrSender {
    window: WindowConfig,
    seq: SeqSpace,
    base: u32,
    next_seq: u32,
    outstanding: VecDeque<InFlight>,
    backlog: VecDeque<Vec<u8>>,
}

impl SrSender {
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

    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    pub fn is_window_full(&self) -> bool {
        self.outstanding.len() >= self.window.window_size as usize
    }

    /// Move backlog messages into free window slots.
    fn fill_window(&mut self, ctx: &mut dyn SystemContext) -> Result<(), ProtocolError> {
        while !self.is_window_full() {
            let Some(payload) = self.backlog.pop_front() else {
                break;
            };
            self.transmit_new(ctx, payload)?;
        }
        Ok(())
    }

    fn transmit_new(
        &mut self,
        ctx: &mut dyn SystemContext,
        payload: Vec<u8>,
    ) -> Result<(), ProtocolError> {
        let starts_window = self.outstanding.is_empty();
        let packet = Packet::new_data(self.next_seq, payload);
        ctx.log(&format!(
            "SR send seq={} ({} bytes)",
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

        // The timer only ever covers `base`.
        if starts_window {
            ctx.start_timer(self.window.rxmt_interval)?;
        }
        Ok(())
    }

    fn slide(&mut self, ctx: &mut dyn SystemContext) {
        let mut moved = 0;
        while self.outstanding.front().is_some_and(|slot| slot.acked) {
            self.outstanding.pop_front();
            self.base = self.seq.next(self.base);
            moved += 1;
        }
        ctx.log(&format!(
            "SR window moved by {} (base={}, next_seq={})",
            moved, self.base, self.next_seq
        ));
        ctx.record_metric(WINDOW_METRIC, self.outstanding.len() as f64);
    }
}

impl TransportProtocol for SrSender {
    fn init(&mut self, ctx: &mut dyn SystemContext) -> Result<(), ProtocolError> {
        ctx.log(&format!(
            "SR sender ready (window={}, seq space={})",
            self.window.window_size, self.window.limit_seq_no
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
            ctx.log(&format!(
                "SR checksum mismatch on ACK (expected {:04X}, got {:04X})",
                packet.expected_checksum(),
                packet.header.checksum
            ));
            return Ok(());
        }

        let ack = packet.header.ack_num;
        let Some(offset) = self
            .seq
            .offset(self.base, ack)
            .map(|offset| offset as usize)
            .filter(|offset| *offset < self.outstanding.len())
        else {
            ctx.log(&format!(
                "SR ignoring ACK {} outside window (base={})",
                ack, self.base
            ));
            return Ok(());
        };

        let now = ctx.now();
        let slot = &mut self.outstanding[offset];
        if slot.acked {
            ctx.log(&format!("SR duplicate ACK {}", ack));
            return Ok(());
        }
        slot.acked = true;
        ctx.stats()
            .record_ack_timing(now - slot.sent_at, slot.retransmitted);
        ctx.log(&format!("SR received ACK {}", ack));

        if offset == 0 {
            self.slide(ctx);
            if self.outstanding.is_empty() {
                ctx.stop_timer();
            } else {
                restart_timer(ctx, self.window.rxmt_interval)?;
            }
            self.fill_window(ctx)?;
        }
        Ok(())
    }

    fn on_timer(&mut self, ctx: &mut dyn SystemContext) -> Result<(), ProtocolError> {
        let Some(first) = self.outstanding.front_mut() else {
            return Ok(());
        };
        first.retransmitted = true;
        ctx.log(&format!(
            "SR timeout, retransmitting seq {}",
            first.packet.header.seq_num
        ));
        ctx.send_packet(first.packet.clone());
        ctx.stats().retransmissions += 1;
        ctx.start_timer(self.window.rxmt_interval)
    }

    fn on_app_data(
        &mut self,
        ctx: &mut dyn SystemContext,
        data: &[u8],
    ) -> Result<(), ProtocolError> {
        self.backlog.push_back(data.to_vec());
        if self.is_window_full() {
            ctx.log(&format!(
                "SR window full, queued message ({} waiting)",
                self.backlog.len()
            ));
            return Ok(());
        }
        self.fill_window(ctx)
    }

    fn in_flight(&self) -> usize {
        self.outstanding.len()
    }
}

pub struct SrReceiver {
    window: WindowConfig,
    seq: SeqSpace,
    expected_base: u32,
    buffer: HashMap<u32, Vec<u8>>,
}

impl SrReceiver {
    pub fn new(window: WindowConfig) -> Self {
        Self {
            window,
            seq: SeqSpace::new(window.limit_seq_no),
            expected_base: FIRST_SEQ_NO,
            buffer: HashMap::new(),
        }
    }

    pub fn expected_base(&self) -> u32 {
        self.expected_base
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn send_ack(&mut self, ctx: &mut dyn SystemContext, seq: u32) {
        ctx.log(&format!("SR send ACK {}", seq));
        ctx.send_packet(Packet::new_ack(seq));
        ctx.stats().acks_sent += 1;
    }

    fn deliver_run(&mut self, ctx: &mut dyn SystemContext) {
        while let Some(payload) = self.buffer.remove(&self.expected_base) {
            ctx.deliver_data(&payload);
            ctx.stats().delivered += 1;
            self.expected_base = self.seq.next(self.expected_base);
        }
        ctx.log(&format!("SR delivered up to base={}", self.expected_base));
    }
}

impl TransportProtocol for SrReceiver {
    fn init(&mut self, ctx: &mut dyn SystemContext) -> Result<(), ProtocolError> {
        ctx.log("SR receiver ready");
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
                "SR checksum mismatch for seq {} (expected {:04X}, got {:04X})",
                packet.header.seq_num,
                packet.expected_checksum(),
                packet.header.checksum
            ));
            return Ok(());
        }

        let seq = packet.header.seq_num;
        let window = self.window.window_size;
        // The W sequence numbers before the window: already delivered, the
        // sender may still be waiting for their ACK.
        let previous = self.seq.add(self.expected_base, self.seq.limit() - window);

        if self.seq.in_window(self.expected_base, window, seq) {
            if self.buffer.contains_key(&seq) {
                ctx.log(&format!("SR duplicate buffered seq {}", seq));
            } else {
                ctx.log(&format!("SR received seq {} ({} bytes)", seq, packet.len()));
                self.buffer.insert(seq, packet.payload);
            }
            self.send_ack(ctx, seq);
            if seq == self.expected_base {
                self.deliver_run(ctx);
            }
        } else if self.seq.in_window(previous, window, seq) {
            ctx.log(&format!(
                "SR stale seq {} (base={}), re-ACK",
                seq, self.expected_base
            ));
            self.send_ack(ctx, seq);
        } else {
            ctx.log(&format!(
                "SR dropping seq {} outside window (base={})",
                seq, self.expected_base
            ));
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockContext, corrupt};

    fn window(size: u32) -> WindowConfig {
        WindowConfig {
            window_size: size,
            limit_seq_no: size * 2,
            rxmt_interval: 20.0,
        }
    }

    #[test]
    fn first_send_starts_timer_once() {
        let mut sender = SrSender::new(window(4));
        let mut ctx = MockContext::default();

        sender.on_app_data(&mut ctx, b"a").unwrap();
        sender.on_app_data(&mut ctx, b"b").unwrap();

        let sent = ctx.take_sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].header.seq_num, 0);
        assert_eq!(sent[1].header.seq_num, 1);
        assert_eq!(ctx.timer_starts, 1);
        assert_eq!(ctx.stats.original_packets, 2);
        assert_eq!(sender.next_seq(), 2);
    }

    #[test]
    fn full_window_queues_instead_of_dropping() {
        let mut sender = SrSender::new(window(2));
        let mut ctx = MockContext::default();

        for msg in [b"a", b"b", b"c"] {
            sender.on_app_data(&mut ctx, msg).unwrap();
        }
        assert_eq!(ctx.take_sent().len(), 2);
        assert!(sender.is_window_full());
        assert_eq!(sender.backlog_len(), 1);

        sender.on_packet(&mut ctx, Packet::new_ack(0)).unwrap();
        let sent = ctx.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].header.seq_num, 2);
        assert_eq!(sent[0].payload, b"c");
        assert_eq!(sender.backlog_len(), 0);
        assert_eq!(sender.in_flight(), 2);
    }

    #[test]
    fn out_of_order_ack_waits_for_base() {
        let mut sender = SrSender::new(window(4));
        let mut ctx = MockContext::default();
        for msg in [b"a", b"b", b"c"] {
            sender.on_app_data(&mut ctx, msg).unwrap();
        }

        ctx.now = 5.0;
        sender.on_packet(&mut ctx, Packet::new_ack(1)).unwrap();
        sender.on_packet(&mut ctx, Packet::new_ack(2)).unwrap();
        assert_eq!(sender.base(), 0);
        assert_eq!(sender.in_flight(), 3);

        sender.on_packet(&mut ctx, Packet::new_ack(0)).unwrap();
        assert_eq!(sender.base(), 3);
        assert_eq!(sender.in_flight(), 0);
        assert!(!ctx.timer_active());
        assert_eq!(ctx.stats.rtt_samples, 3);
    }

    #[test]
    fn duplicate_and_corrupted_acks_change_nothing() {
        let mut sender = SrSender::new(window(4));
        let mut ctx = MockContext::default();
        sender.on_app_data(&mut ctx, b"a").unwrap();
        sender.on_app_data(&mut ctx, b"b").unwrap();

        sender.on_packet(&mut ctx, Packet::new_ack(1)).unwrap();
        sender.on_packet(&mut ctx, Packet::new_ack(1)).unwrap();
        sender.on_packet(&mut ctx, Packet::new_ack(6)).unwrap();
        sender
            .on_packet(&mut ctx, corrupt(Packet::new_ack(0)))
            .unwrap();

        assert_eq!(sender.base(), 0);
        assert_eq!(sender.in_flight(), 2);
        assert_eq!(ctx.stats.corrupted, 1);
        assert_eq!(ctx.stats.acks_received, 4);
        assert_eq!(ctx.stats.comm_time_samples, 1);
    }

    #[test]
    fn timeout_retransmits_only_base() {
        let mut sender = SrSender::new(window(4));
        let mut ctx = MockContext::default();
        for msg in [b"a", b"b", b"c"] {
            sender.on_app_data(&mut ctx, msg).unwrap();
        }
        ctx.take_sent();

        ctx.fire_timer();
        sender.on_timer(&mut ctx).unwrap();

        let sent = ctx.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].header.seq_num, 0);
        assert_eq!(ctx.stats.retransmissions, 1);
        assert!(ctx.timer_active());

        // A retransmitted packet yields no RTT sample.
        sender.on_packet(&mut ctx, Packet::new_ack(0)).unwrap();
        assert_eq!(ctx.stats.rtt_samples, 0);
        assert_eq!(ctx.stats.comm_time_samples, 1);
    }

    #[test]
    fn sequence_numbers_wrap() {
        let mut sender = SrSender::new(window(2));
        let mut ctx = MockContext::default();
        for round in 0..5u32 {
            sender.on_app_data(&mut ctx, b"x").unwrap();
            let sent = ctx.take_sent();
            assert_eq!(sent[0].header.seq_num, round % 4);
            sender.on_packet(&mut ctx, Packet::new_ack(round % 4)).unwrap();
        }
        assert_eq!(sender.base(), 1);
        assert_eq!(sender.in_flight(), 0);
    }

    #[test]
    fn receiver_buffers_and_delivers_in_order() {
        let mut receiver = SrReceiver::new(window(4));
        let mut ctx = MockContext::default();

        receiver
            .on_packet(&mut ctx, Packet::new_data(1, b"second".to_vec()))
            .unwrap();
        receiver
            .on_packet(&mut ctx, Packet::new_data(2, b"third".to_vec()))
            .unwrap();
        assert!(ctx.delivered.is_empty());
        assert_eq!(receiver.buffered(), 2);

        receiver
            .on_packet(&mut ctx, Packet::new_data(0, b"first".to_vec()))
            .unwrap();
        assert_eq!(
            ctx.delivered,
            vec![b"first".to_vec(), b"second".to_vec(), b"third".to_vec()]
        );
        assert_eq!(receiver.expected_base(), 3);
        assert_eq!(receiver.buffered(), 0);

        let acks: Vec<u32> = ctx.sent.iter().map(|p| p.header.ack_num).collect();
        assert_eq!(acks, vec![1, 2, 0]);
        assert_eq!(ctx.stats.acks_sent, 3);
        assert_eq!(ctx.stats.delivered, 3);
    }

    #[test]
    fn receiver_reacks_stale_without_redelivery() {
        let mut receiver = SrReceiver::new(window(4));
        let mut ctx = MockContext::default();
        receiver
            .on_packet(&mut ctx, Packet::new_data(0, b"a".to_vec()))
            .unwrap();
        receiver
            .on_packet(&mut ctx, Packet::new_data(0, b"a".to_vec()))
            .unwrap();

        assert_eq!(ctx.delivered.len(), 1);
        assert_eq!(ctx.sent.len(), 2);
        assert_eq!(ctx.sent[1].header.ack_num, 0);
    }

    #[test]
    fn receiver_ignores_corruption_silently() {
        let mut receiver = SrReceiver::new(window(4));
        let mut ctx = MockContext::default();
        receiver
            .on_packet(&mut ctx, corrupt(Packet::new_data(0, b"a".to_vec())))
            .unwrap();

        assert!(ctx.sent.is_empty());
        assert!(ctx.delivered.is_empty());
        assert_eq!(ctx.stats.corrupted, 1);
    }

    #[test]
    fn receiver_drops_outside_window_when_space_is_wide() {
        let wide = WindowConfig {
            window_size: 2,
            limit_seq_no: 8,
            rxmt_interval: 20.0,
        };
        let mut receiver = SrReceiver::new(wide);
        let mut ctx = MockContext::default();
        // Window is [0, 1]; stale range is [6, 7]; 3 is neither.
        receiver
            .on_packet(&mut ctx, Packet::new_data(3, b"x".to_vec()))
            .unwrap();
        assert!(ctx.sent.is_empty());

        receiver
            .on_packet(&mut ctx, Packet::new_data(7, b"x".to_vec()))
            .unwrap();
        assert_eq!(ctx.sent.len(), 1);
        assert!(ctx.delivered.is_empty());
    }

    #[test]
    fn receiver_window_follows_base_across_wrap() {
        let mut receiver = SrReceiver::new(window(2));
        let mut ctx = MockContext::default();
        for seq in 0..3 {
            receiver
                .on_packet(&mut ctx, Packet::new_data(seq, vec![seq as u8]))
                .unwrap();
        }
        assert_eq!(receiver.expected_base(), 3);
        ctx.take_sent();

        // Window is [3, 0], stale range is [1, 2].
        receiver
            .on_packet(&mut ctx, Packet::new_data(0, vec![4]))
            .unwrap();
        assert_eq!(receiver.buffered(), 1);
        receiver
            .on_packet(&mut ctx, Packet::new_data(1, vec![1]))
            .unwrap();
        assert_eq!(receiver.buffered(), 1);
        // Not a sequence number of this space.
        receiver
            .on_packet(&mut ctx, Packet::new_data(5, vec![5]))
            .unwrap();
        let acks: Vec<u32> = ctx.take_sent().iter().map(|p| p.header.ack_num).collect();
        assert_eq!(acks, vec![0, 1]);
        assert_eq!(ctx.delivered.len(), 3);

        receiver
            .on_packet(&mut ctx, Packet::new_data(3, vec![3]))
            .unwrap();
        assert_eq!(ctx.delivered, vec![vec![0], vec![1], vec![2], vec![3], vec![4]]);
        assert_eq!(receiver.expected_base(), 1);
    }
}
