use crate::error::SimError;
use crate::link::{Fault, LinkOutcome, NetworkLink, ScriptedFault};
use crate::queue::{EventKind, EventQueue, NodeId};
use crate::rng::RandomSource;
use crate::source::{AlphabetSource, ArrivalProcess, MessageSource};
use crate::timer::TimerRegistry;
use crate::trace::{LinkEventSummary, SimulationReport};
use arq_sim_abstract::{
    Packet, ProtocolError, SimConfig, Statistics, SystemContext, TransportProtocol,
};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// RNG stream feeding the link's fault model.
const LINK_STREAM: u64 = 0;
/// RNG stream pacing the application source.
const ARRIVAL_STREAM: u64 = 1;

/// Actions buffered during a protocol handler call
#[derive(Default)]
struct ActionBuffer {
    outgoing_packets: Vec<Packet>,
    timers_start: Vec<(f64, u64)>, // (expiry, epoch)
    logs: Vec<String>,
    delivered_data: Vec<Vec<u8>>,
    metrics: Vec<(String, f64)>,
}

/// Context implementation passed to a protocol entity
struct ScopedContext<'a> {
    buffer: &'a mut ActionBuffer,
    timers: &'a mut TimerRegistry,
    stats: &'a mut Statistics,
    node: NodeId,
    now: f64,
}

impl SystemContext for ScopedContext<'_> {
    fn send_packet(&mut self, packet: Packet) {
        self.buffer.outgoing_packets.push(packet);
    }

    fn start_timer(&mut self, duration: f64) -> Result<(), ProtocolError> {
        let epoch = self.timers.start(self.node, self.now, duration)?;
        self.buffer.timers_start.push((self.now + duration, epoch));
        Ok(())
    }

    fn stop_timer(&mut self) {
        self.timers.stop(self.node);
    }

    fn timer_active(&self) -> bool {
        self.timers.is_active(self.node)
    }

    fn deliver_data(&mut self, data: &[u8]) {
        self.buffer.delivered_data.push(data.to_vec());
    }

    fn log(&mut self, message: &str) {
        self.buffer.logs.push(message.to_string());
    }

    fn now(&self) -> f64 {
        self.now
    }

    fn stats(&mut self) -> &mut Statistics {
        self.stats
    }

    fn record_metric(&mut self, name: &str, value: f64) {
        self.buffer.metrics.push((name.to_string(), value));
    }
}

pub struct Simulator {
    time: f64,
    queue: EventQueue,
    events_processed: u64,

    config: SimConfig,
    link: NetworkLink,
    timers: TimerRegistry,
    arrivals: ArrivalProcess,
    source: Box<dyn MessageSource>,

    pub sender: Box<dyn TransportProtocol>,
    pub receiver: Box<dyn TransportProtocol>,

    /// Everything handed to the application sink, in delivery order.
    pub delivered_data: Vec<Vec<u8>>,
    pub stats: Statistics,
    max_in_flight: usize,

    /// Time series recorded via `SystemContext::record_metric`
    /// Key: metric name (e.g., "window_occupancy"), Value: Vec<(time, value)>
    pub metrics: BTreeMap<String, Vec<(f64, f64)>>,

    /// Timeline of link events (drops, corruptions, sends, deliveries).
    pub link_events: Vec<LinkEventSummary>,
}

impl Simulator {
    pub fn new(
        config: SimConfig,
        sender: Box<dyn TransportProtocol>,
        receiver: Box<dyn TransportProtocol>,
    ) -> Result<Self, SimError> {
        config.validate()?;
        let link = NetworkLink::new(&config, RandomSource::stream(config.seed, LINK_STREAM));
        let arrivals = ArrivalProcess::new(
            config.message_interval,
            config.num_messages,
            RandomSource::stream(config.seed, ARRIVAL_STREAM),
        );

        Ok(Self {
            time: 0.0,
            queue: EventQueue::new(),
            events_processed: 0,
            config,
            link,
            timers: TimerRegistry::new(),
            arrivals,
            source: Box::new(AlphabetSource),
            sender,
            receiver,
            delivered_data: Vec::new(),
            stats: Statistics::default(),
            max_in_flight: 0,
            metrics: BTreeMap::new(),
            link_events: Vec::new(),
        })
    }

    /// Replace the default alphabet message source.
    pub fn with_source(mut self, source: impl MessageSource + 'static) -> Self {
        self.source = Box::new(source);
        self
    }

    /// Register a deterministic fault: drop the first packet sent by Sender whose seq equals `seq`.
    pub fn add_drop_sender_seq_once(&mut self, seq: u32) {
        self.add_fault(NodeId::Sender, seq, Fault::Drop);
    }

    /// Register a deterministic fault: drop the first ACK sent by Receiver whose ack equals `ack`.
    pub fn add_drop_receiver_ack_once(&mut self, ack: u32) {
        self.add_fault(NodeId::Receiver, ack, Fault::Drop);
    }

    pub fn add_corrupt_sender_seq_once(&mut self, seq: u32) {
        self.add_fault(NodeId::Sender, seq, Fault::Corrupt);
    }

    pub fn add_corrupt_receiver_ack_once(&mut self, ack: u32) {
        self.add_fault(NodeId::Receiver, ack, Fault::Corrupt);
    }

    fn add_fault(&mut self, from: NodeId, number: u32, fault: Fault) {
        self.link.add_fault(ScriptedFault {
            from,
            number,
            fault,
        });
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn timers(&self) -> &TimerRegistry {
        &self.timers
    }

    /// Return the (time, value) samples for a named metric, if present.
    pub fn metric_series(&self, name: &str) -> Option<&[(f64, f64)]> {
        self.metrics.get(name).map(|v| v.as_slice())
    }

    pub fn schedule_app_send(&mut self, time: f64, data: Vec<u8>) {
        self.queue.push(time, EventKind::AppSend { data });
    }

    pub fn init(&mut self) -> Result<(), SimError> {
        self.dispatch(NodeId::Sender, |entity, ctx| entity.init(ctx))?;
        self.dispatch(NodeId::Receiver, |entity, ctx| entity.init(ctx))?;
        if self.arrivals.remaining() > 0 {
            let gap = self.arrivals.next_gap();
            self.queue.push(self.time + gap, EventKind::AppArrival);
        }
        Ok(())
    }

    pub fn current_time(&self) -> f64 {
        self.time
    }

    pub fn remaining_events(&self) -> usize {
        self.queue.len()
    }

    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Process the next event. Returns `Ok(true)` if an event was processed,
    /// `Ok(false)` if the queue is empty.
    ///
    /// Expirations of stopped or restarted timers are discarded on the way:
    /// they neither move the clock nor count against `max_events`. When the
    /// budget is spent the pending event stays queued.
    pub fn step(&mut self) -> Result<bool, SimError> {
        self.discard_stale_timers();
        if self.queue.peek_time().is_none() {
            return Ok(false);
        }
        if self.events_processed >= self.config.max_events {
            return Err(SimError::EventBudgetExhausted {
                events: self.events_processed,
                time: self.time,
            });
        }
        let Some(event) = self.queue.pop() else {
            return Ok(false);
        };
        self.events_processed += 1;

        self.time = event.time;
        debug!("Processing event at {:.3}: {:?}", self.time, event.kind);

        match event.kind {
            EventKind::PacketArrival { to, packet } => {
                self.dispatch(to, |entity, ctx| entity.on_packet(ctx, packet))?;
            }
            EventKind::TimerExpiry { node, epoch } => {
                if self.timers.on_expire(node, epoch) {
                    self.dispatch(node, |entity, ctx| entity.on_timer(ctx))?;
                }
            }
            EventKind::AppArrival => {
                if let Some(index) = self.arrivals.claim() {
                    if self.arrivals.remaining() > 0 {
                        let gap = self.arrivals.next_gap();
                        self.queue.push(self.time + gap, EventKind::AppArrival);
                    }
                    let data = self.source.produce(index);
                    debug!("Application message {} ({} bytes)", index, data.len());
                    self.dispatch(NodeId::Sender, |entity, ctx| entity.on_app_data(ctx, &data))?;
                }
            }
            EventKind::AppSend { data } => {
                self.dispatch(NodeId::Sender, |entity, ctx| entity.on_app_data(ctx, &data))?;
            }
        }
        Ok(true)
    }

    /// Pop expirations at the head of the queue that can no longer fire.
    /// A stale epoch never becomes current again.
    fn discard_stale_timers(&mut self) {
        loop {
            let Some(EventKind::TimerExpiry { node, epoch }) = self.queue.peek().map(|e| &e.kind)
            else {
                break;
            };
            let (node, epoch) = (*node, *epoch);
            if self.timers.is_pending(node, epoch) {
                break;
            }
            self.queue.pop();
            debug!("Skipping stale timer event for {:?} (epoch {})", node, epoch);
        }
    }

    /// Produce a serializable snapshot of the current simulation state.
    pub fn export_report(&self) -> SimulationReport {
        let link = self.link.stats().clone();
        SimulationReport {
            config: self.config.clone(),
            duration: self.time,
            events_processed: self.events_processed,
            delivered_data: self.delivered_data.clone(),
            stats: self.stats.clone(),
            loss_ratio: link.loss_ratio(),
            corruption_ratio: link.corruption_ratio(),
            average_rtt: self.stats.average_rtt(),
            average_comm_time: self.stats.average_comm_time(),
            link,
            max_in_flight: self.max_in_flight,
            metrics: self.metrics.clone(),
            link_events: self.link_events.clone(),
        }
    }

    /// Run until no event is left: the message budget is spent and every
    /// packet has been retired.
    pub fn run_until_complete(&mut self) -> Result<(), SimError> {
        self.init()?;
        while self.step()? {}
        info!(
            "Simulation complete at {:.3} after {} events",
            self.time, self.events_processed
        );
        Ok(())
    }

    /// Run one handler of `node` against a fresh scoped context, then apply
    /// what it asked for.
    fn dispatch<F>(&mut self, node: NodeId, handler: F) -> Result<(), SimError>
    where
        F: FnOnce(&mut dyn TransportProtocol, &mut dyn SystemContext) -> Result<(), ProtocolError>,
    {
        let mut buffer = ActionBuffer::default();
        let result = {
            let mut ctx = ScopedContext {
                buffer: &mut buffer,
                timers: &mut self.timers,
                stats: &mut self.stats,
                node,
                now: self.time,
            };
            let entity = match node {
                NodeId::Sender => self.sender.as_mut(),
                NodeId::Receiver => self.receiver.as_mut(),
            };
            handler(entity, &mut ctx)
        };
        self.process_actions(node, buffer);
        result.map_err(|source| SimError::Protocol { node, source })?;

        let in_flight = self.sender.in_flight();
        if in_flight > self.config.window_size as usize {
            warn!(
                "Sender has {} packets in flight, window is {}",
                in_flight, self.config.window_size
            );
        }
        self.max_in_flight = self.max_in_flight.max(in_flight);
        Ok(())
    }

    fn process_actions(&mut self, source_node: NodeId, buffer: ActionBuffer) {
        // First, fold metrics into simulator-wide store
        for (name, value) in buffer.metrics {
            self.metrics
                .entry(name)
                .or_default()
                .push((self.time, value));
        }

        for log in buffer.logs {
            info!("[{:?}] {}", source_node, log);
        }

        for data in buffer.delivered_data {
            info!("[{:?}] DELIVERED DATA: {} bytes", source_node, data.len());
            self.link_events.push(LinkEventSummary {
                time: self.time,
                description: format!(
                    "[{:?}] DELIVERED {} bytes to application",
                    source_node,
                    data.len()
                ),
            });
            self.delivered_data.push(data);
        }

        for (expiry, epoch) in buffer.timers_start {
            self.queue.push(
                expiry,
                EventKind::TimerExpiry {
                    node: source_node,
                    epoch,
                },
            );
        }

        // Packet transmission logic (Channel)
        for packet in buffer.outgoing_packets {
            let (seq, ack) = (packet.header.seq_num, packet.header.ack_num);
            let target_node = source_node.peer();
            let outcome = self
                .link
                .transmit(&mut self.queue, source_node, packet, self.time);

            let description = match outcome {
                LinkOutcome::Lost { scripted: true } => format!(
                    "[{:?}->{:?}] DROP (scripted) seq={} ack={}",
                    source_node, target_node, seq, ack
                ),
                LinkOutcome::Lost { scripted: false } => format!(
                    "[{:?}->{:?}] DROP (random loss) seq={} ack={}",
                    source_node, target_node, seq, ack
                ),
                LinkOutcome::Delivered {
                    delay,
                    corruption: Some(target),
                    ..
                } => format!(
                    "[{:?}->{:?}] CORRUPT {:?} seq={} ack={} (delay={:.3})",
                    source_node, target_node, target, seq, ack, delay
                ),
                LinkOutcome::Delivered {
                    delay,
                    corruption: None,
                    ..
                } => format!(
                    "[{:?}->{:?}] SEND seq={} ack={} (delay={:.3})",
                    source_node, target_node, seq, ack, delay
                ),
            };
            self.link_events.push(LinkEventSummary {
                time: self.time,
                description,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Simulator;
    use crate::error::SimError;
    use crate::queue::NodeId;
    use arq_sim_abstract::{Packet, ProtocolError, SimConfig, SystemContext, TransportProtocol};

    /// Starts a timer at init, stops and restarts it when a message arrives,
    /// and counts how often the timer actually fires.
    #[derive(Default)]
    struct TimerUser {
        fired: u32,
        double_start: bool,
    }

    impl TransportProtocol for TimerUser {
        fn init(&mut self, ctx: &mut dyn SystemContext) -> Result<(), ProtocolError> {
            ctx.start_timer(10.0)
        }

        fn on_packet(
            &mut self,
            _ctx: &mut dyn SystemContext,
            _packet: Packet,
        ) -> Result<(), ProtocolError> {
            Ok(())
        }

        fn on_timer(&mut self, _ctx: &mut dyn SystemContext) -> Result<(), ProtocolError> {
            self.fired += 1;
            Ok(())
        }

        fn on_app_data(
            &mut self,
            ctx: &mut dyn SystemContext,
            _data: &[u8],
        ) -> Result<(), ProtocolError> {
            if self.double_start {
                return ctx.start_timer(1.0);
            }
            ctx.stop_timer();
            ctx.start_timer(20.0)
        }
    }

    fn quiet_config() -> SimConfig {
        SimConfig {
            num_messages: 0,
            ..Default::default()
        }
    }

    fn timer_sim(entity: TimerUser) -> Simulator {
        Simulator::new(quiet_config(), Box::new(entity), Box::new(TimerUser::default())).unwrap()
    }

    #[test]
    fn restarted_timer_fires_once() {
        let mut sim = timer_sim(TimerUser::default());
        sim.schedule_app_send(5.0, b"restart".to_vec());
        sim.run_until_complete().unwrap();

        // Sender: the timer from init is stale, only the restarted one fires.
        // Receiver: its own init timer fires at 10. The stale expiry is not
        // counted.
        assert_eq!(sim.current_time(), 25.0);
        assert!(!sim.timers().is_active(NodeId::Sender));
        assert_eq!(sim.events_processed(), 3);
    }

    #[test]
    fn double_start_is_fatal() {
        let mut sim = timer_sim(TimerUser {
            double_start: true,
            ..Default::default()
        });
        sim.schedule_app_send(5.0, b"again".to_vec());
        let err = sim.run_until_complete().unwrap_err();
        assert!(matches!(
            err,
            SimError::Protocol {
                node: NodeId::Sender,
                source: ProtocolError::TimerAlreadyActive
            }
        ));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = SimConfig {
            corrupt_prob: 1.5,
            ..Default::default()
        };
        let result = Simulator::new(
            config,
            Box::new(TimerUser::default()),
            Box::new(TimerUser::default()),
        );
        assert!(matches!(result, Err(SimError::Config(_))));
    }

    /// Re-arms its timer forever.
    struct Spinner;

    impl TransportProtocol for Spinner {
        fn init(&mut self, ctx: &mut dyn SystemContext) -> Result<(), ProtocolError> {
            ctx.start_timer(1.0)
        }

        fn on_packet(
            &mut self,
            _ctx: &mut dyn SystemContext,
            _packet: Packet,
        ) -> Result<(), ProtocolError> {
            Ok(())
        }

        fn on_timer(&mut self, ctx: &mut dyn SystemContext) -> Result<(), ProtocolError> {
            ctx.start_timer(1.0)
        }

        fn on_app_data(
            &mut self,
            _ctx: &mut dyn SystemContext,
            _data: &[u8],
        ) -> Result<(), ProtocolError> {
            Ok(())
        }
    }

    #[test]
    fn livelock_hits_event_budget() {
        let config = SimConfig {
            max_events: 50,
            ..quiet_config()
        };
        let mut sim = Simulator::new(config, Box::new(Spinner), Box::new(TimerUser::default()))
            .unwrap();
        let err = sim.run_until_complete().unwrap_err();
        assert!(matches!(
            err,
            SimError::EventBudgetExhausted { events: 50, .. }
        ));
        // The event that hit the budget is still queued.
        assert_eq!(sim.remaining_events(), 1);
        assert_eq!(sim.events_processed(), 50);
    }
}
