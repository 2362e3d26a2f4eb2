use thiserror::Error;

use crate::packet::Packet;
use crate::stats::Statistics;

/// Invariant violations a protocol can commit against the simulator.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Only one timer per entity can run at a time.
    #[error("attempt to start a timer that is already running")]
    TimerAlreadyActive,
}

/// The capability provided by the simulator to a protocol entity.
/// Entities call these methods to interact with the link, their timer and
/// the application layer. Everything except the timer is buffered and
/// applied by the simulator once the handler returns.
pub trait SystemContext {
    /// Hand a packet to the unreliable link.
    fn send_packet(&mut self, packet: Packet);

    /// Start this entity's single timer, expiring `duration` time units from now.
    /// Fails if the timer is already running.
    fn start_timer(&mut self, duration: f64) -> Result<(), ProtocolError>;

    /// Stop the timer. Stopping an idle timer does nothing.
    fn stop_timer(&mut self);

    fn timer_active(&self) -> bool;

    /// Deliver data to the application layer.
    fn deliver_data(&mut self, data: &[u8]);

    /// Log a message to the simulator's debug output.
    fn log(&mut self, message: &str);

    /// Current simulation time.
    fn now(&self) -> f64;

    /// Run-wide counters.
    fn stats(&mut self) -> &mut Statistics;

    /// Record a numeric sample for the report (e.g. window occupancy).
    fn record_metric(&mut self, _name: &str, _value: f64) {}
}

/// A reliability protocol entity. Each handler runs to completion and
/// returns before the next event is processed.
pub trait TransportProtocol {
    /// Called once when the simulation starts.
    fn init(&mut self, _ctx: &mut dyn SystemContext) -> Result<(), ProtocolError> {
        Ok(())
    }

    /// Called when a packet arrives from the link.
    fn on_packet(&mut self, ctx: &mut dyn SystemContext, packet: Packet)
    -> Result<(), ProtocolError>;

    /// Called when the entity's timer expires.
    fn on_timer(&mut self, ctx: &mut dyn SystemContext) -> Result<(), ProtocolError>;

    /// Called when the application layer hands over a message to send reliably.
    fn on_app_data(&mut self, ctx: &mut dyn SystemContext, data: &[u8])
    -> Result<(), ProtocolError>;

    /// Sequence numbers sent but not yet retired, zero for entities that never send data.
    fn in_flight(&self) -> usize {
        0
    }
}

/// Restart the timer: stop it if running, then start it again.
pub fn restart_timer(ctx: &mut dyn SystemContext, duration: f64) -> Result<(), ProtocolError> {
    ctx.stop_timer();
    ctx.start_timer(duration)
}
