use std::collections::HashMap;

use arq_sim_abstract::ProtocolError;

use crate::queue::NodeId;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimerSlot {
    pub active: bool,
    pub expires_at: f64,
    /// Bumped on every start; an expiration carrying an older epoch is stale.
    pub epoch: u64,
}

/// One timer per entity. Cancellation never touches the event queue:
/// expirations are checked against the slot when they are popped.
#[derive(Debug, Default)]
pub struct TimerRegistry {
    slots: HashMap<NodeId, TimerSlot>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer of `node`. Returns the epoch the expiration event must carry.
    pub fn start(&mut self, node: NodeId, now: f64, duration: f64) -> Result<u64, ProtocolError> {
        let slot = self.slots.entry(node).or_default();
        if slot.active {
            return Err(ProtocolError::TimerAlreadyActive);
        }
        slot.active = true;
        slot.expires_at = now + duration;
        slot.epoch += 1;
        Ok(slot.epoch)
    }

    /// Disarm the timer of `node`. Returns whether it was running.
    pub fn stop(&mut self, node: NodeId) -> bool {
        match self.slots.get_mut(&node) {
            Some(slot) if slot.active => {
                slot.active = false;
                true
            }
            _ => false,
        }
    }

    /// Decide whether a popped expiration is honoured. Honouring it
    /// disarms the timer.
    pub fn on_expire(&mut self, node: NodeId, epoch: u64) -> bool {
        match self.slots.get_mut(&node) {
            Some(slot) if slot.active && slot.epoch == epoch => {
                slot.active = false;
                true
            }
            _ => false,
        }
    }

    /// Whether an expiration carrying `epoch` would still be honoured.
    pub fn is_pending(&self, node: NodeId, epoch: u64) -> bool {
        self.slots
            .get(&node)
            .is_some_and(|slot| slot.active && slot.epoch == epoch)
    }

    pub fn is_active(&self, node: NodeId) -> bool {
        self.slots.get(&node).is_some_and(|slot| slot.active)
    }

    pub fn slot(&self, node: NodeId) -> TimerSlot {
        self.slots.get(&node).copied().unwrap_or_default()
    }
}
