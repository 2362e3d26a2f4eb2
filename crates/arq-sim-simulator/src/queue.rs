use std::cmp::Ordering;
use std::collections::BinaryHeap;

use arq_sim_abstract::Packet;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NodeId {
    Sender,
    Receiver,
}

impl NodeId {
    pub fn peer(&self) -> Self {
        match self {
            NodeId::Sender => NodeId::Receiver,
            NodeId::Receiver => NodeId::Sender,
        }
    }
}

#[derive(Debug)]
pub enum EventKind {
    PacketArrival {
        to: NodeId,
        packet: Packet,
    },
    TimerExpiry {
        node: NodeId,
        epoch: u64,
    },
    /// Next message of the paced application source.
    AppArrival,
    /// Scripted application send.
    AppSend {
        data: Vec<u8>,
    },
}

#[derive(Debug)]
pub struct Event {
    pub time: f64,
    /// Insertion order, breaks ties between events at the same time.
    pub id: u64,
    pub kind: EventKind,
}

// Custom Ord for Min-Heap (smallest time pops first)
impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse comparison: smallest time is Greater in BinaryHeap
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Future events ordered by time, FIFO among equal times.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Event>,
    next_id: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, time: f64, kind: EventKind) -> u64 {
        let id = self.next_id;
        self.heap.push(Event { time, id, kind });
        self.next_id += 1;
        id
    }

    pub fn pop(&mut self) -> Option<Event> {
        self.heap.pop()
    }

    pub fn peek(&self) -> Option<&Event> {
        self.heap.peek()
    }

    pub fn peek_time(&self) -> Option<f64> {
        self.heap.peek().map(|e| e.time)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
