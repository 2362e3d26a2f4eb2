/// Modular sequence-number arithmetic over `[0, limit)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqSpace {
    limit: u32,
}

impl SeqSpace {
    pub fn new(limit: u32) -> Self {
        assert!(limit > 0, "sequence space must not be empty");
        Self { limit }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn next(&self, seq: u32) -> u32 {
        self.add(seq, 1)
    }

    pub fn prev(&self, seq: u32) -> u32 {
        self.add(seq, self.limit - 1)
    }

    pub fn add(&self, seq: u32, n: u32) -> u32 {
        ((seq as u64 + n as u64) % self.limit as u64) as u32
    }

    /// Forward distance from `from` to `to` around the circle, or `None`
    /// when `to` is not a sequence number of this space at all.
    pub fn offset(&self, from: u32, to: u32) -> Option<u32> {
        if to >= self.limit {
            return None;
        }
        let limit = self.limit as u64;
        Some(((to as u64 + limit - from as u64 % limit) % limit) as u32)
    }

    /// Whether `seq` lies in the half-open circular range `[base, base + len)`.
    pub fn in_window(&self, base: u32, len: u32, seq: u32) -> bool {
        self.offset(base, seq).is_some_and(|offset| offset < len)
    }
}

#[cfg(test)]
mod tests {
    use super::SeqSpace;

    #[test]
    fn wraps_around() {
        let space = SeqSpace::new(8);
        assert_eq!(space.next(7), 0);
        assert_eq!(space.prev(0), 7);
        assert_eq!(space.add(6, 5), 3);
    }

    #[test]
    fn offsets_are_circular() {
        let space = SeqSpace::new(8);
        assert_eq!(space.offset(6, 1), Some(3));
        assert_eq!(space.offset(1, 6), Some(5));
        assert_eq!(space.offset(3, 3), Some(0));
        assert_eq!(space.offset(0, 8), None);
    }

    #[test]
    fn window_membership() {
        let space = SeqSpace::new(8);
        // [6, 7, 0, 1]
        assert!(space.in_window(6, 4, 6));
        assert!(space.in_window(6, 4, 1));
        assert!(!space.in_window(6, 4, 2));
        assert!(!space.in_window(6, 4, 5));
        assert!(!space.in_window(6, 0, 6));
    }
}
