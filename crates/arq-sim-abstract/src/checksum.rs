/// 16-bit Internet checksum (ones' complement) over the packet's sequence
/// number, acknowledgment number and payload.
///
/// Any single-bit change in one of the covered fields changes the result,
/// which is what the link relies on when it corrupts a packet in flight.
pub fn packet_checksum(seq_num: u32, ack_num: u32, payload: &[u8]) -> u16 {
    let mut sum = ones_complement_sum(0, &seq_num.to_be_bytes());
    sum = ones_complement_sum(sum, &ack_num.to_be_bytes());
    sum = ones_complement_sum(sum, payload);
    !fold(sum)
}

fn ones_complement_sum(mut sum: u32, data: &[u8]) -> u32 {
    let mut chunks = data.chunks_exact(2);

    for chunk in &mut chunks {
        let value = u16::from_be_bytes([chunk[0], chunk[1]]) as u32;
        sum = fold(sum.wrapping_add(value)) as u32;
    }

    if let Some(&byte) = chunks.remainder().first() {
        sum = fold(sum.wrapping_add((byte as u32) << 8)) as u32;
    }

    sum
}

fn fold(mut sum: u32) -> u16 {
    while (sum >> 16) != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    sum as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // RFC 1071 example words 0x0001 0xf203 0xf4f5 0xf6f7 sum to 0xddf2.
        assert_eq!(packet_checksum(0x0001_f203, 0xf4f5_f6f7, &[]), !0xddf2);
    }

    #[test]
    fn odd_length_pads_with_zero() {
        assert_eq!(packet_checksum(0, 0, &[0xab]), packet_checksum(0, 0, &[0xab, 0x00]));
    }

    #[test]
    fn header_fields_are_covered() {
        let base = packet_checksum(3, 0, b"payload");
        assert_ne!(base, packet_checksum(4, 0, b"payload"));
        assert_ne!(base, packet_checksum(3, 1, b"payload"));
        assert_ne!(base, packet_checksum(3, 0, b"paylobd"));
    }
}
