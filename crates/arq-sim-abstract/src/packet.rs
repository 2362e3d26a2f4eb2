use serde::{Deserialize, Serialize};

use crate::checksum::packet_checksum;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ArqHeader {
    /// Sequence number of a data packet (unused on ACKs).
    pub seq_num: u32,
    /// Sequence number being acknowledged (unused on data packets).
    pub ack_num: u32,
    /// Checksum over `seq_num`, `ack_num` and the payload, fixed at construction.
    pub checksum: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Packet {
    pub header: ArqHeader,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Build a packet and stamp its checksum.
    pub fn new(seq: u32, ack: u32, payload: Vec<u8>) -> Self {
        let checksum = packet_checksum(seq, ack, &payload);
        Self {
            header: ArqHeader {
                seq_num: seq,
                ack_num: ack,
                checksum,
            },
            payload,
        }
    }

    pub fn new_data(seq: u32, payload: Vec<u8>) -> Self {
        Self::new(seq, 0, payload)
    }

    /// Create a pure ACK packet
    pub fn new_ack(ack: u32) -> Self {
        Self::new(0, ack, Vec::new())
    }

    /// Checksum recomputed from the fields as they are now.
    pub fn expected_checksum(&self) -> u16 {
        packet_checksum(self.header.seq_num, self.header.ack_num, &self.payload)
    }

    pub fn is_corrupted(&self) -> bool {
        self.expected_checksum() != self.header.checksum
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::Packet;

    #[test]
    fn fresh_packets_verify() {
        assert!(!Packet::new_data(5, b"hello".to_vec()).is_corrupted());
        assert!(!Packet::new_ack(7).is_corrupted());
        assert!(!Packet::new_data(0, Vec::new()).is_corrupted());
    }

    #[test]
    fn any_single_bit_flip_is_detected() {
        let packet = Packet::new(6, 3, b"abcdefghijklmnopqrs\n".to_vec());

        for bit in 0..32 {
            let mut seq = packet.clone();
            seq.header.seq_num ^= 1 << bit;
            assert!(seq.is_corrupted(), "seq bit {bit} undetected");

            let mut ack = packet.clone();
            ack.header.ack_num ^= 1 << bit;
            assert!(ack.is_corrupted(), "ack bit {bit} undetected");
        }

        for byte in 0..packet.payload.len() {
            for bit in 0..8 {
                let mut flipped = packet.clone();
                flipped.payload[byte] ^= 1 << bit;
                assert!(flipped.is_corrupted(), "payload byte {byte} bit {bit} undetected");
            }
        }
    }

    #[test]
    fn checksum_is_pure() {
        let a = Packet::new_data(1, b"same".to_vec());
        let b = Packet::new_data(1, b"same".to_vec());
        assert_eq!(a, b);
        assert_eq!(a.expected_checksum(), a.header.checksum);
    }
}
