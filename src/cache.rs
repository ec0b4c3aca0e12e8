//! Bounded PTS-reordering cache.
//!
//! A holding area for packets of one stream that may arrive out of
//! timestamp order. Capacity is fixed at construction; pushing past it
//! evicts the current minimum-PTS entry, never an arbitrary one.

use crate::packet::Packet;

/// Fixed-capacity packet cache with PTS-ordered retrieval.
#[derive(Debug)]
pub struct PtsCache {
    packets: Vec<Packet>,
    capacity: usize,
}

impl PtsCache {
    /// Create a cache holding at most `capacity` packets (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            packets: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Packets currently held.
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Maximum number of packets held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert a packet. At capacity, the minimum-PTS entry is evicted
    /// first to make room; its contents are discarded.
    pub fn push(&mut self, packet: Packet) {
        if self.packets.len() == self.capacity {
            let _ = self.pop_minimum();
        }
        self.packets.push(packet);
    }

    /// Remove and return the packet with the smallest PTS. Ties go to the
    /// earliest-inserted entry.
    pub fn pop_minimum(&mut self) -> Option<Packet> {
        if self.packets.is_empty() {
            return None;
        }
        let mut min_idx = 0;
        for (idx, packet) in self.packets.iter().enumerate().skip(1) {
            if packet.pts < self.packets[min_idx].pts {
                min_idx = idx;
            }
        }
        Some(self.packets.remove(min_idx))
    }

    /// Remove and return the first packet whose PTS equals `target`.
    ///
    /// Entries with PTS strictly below `target` encountered during the
    /// scan are stale and are discarded; they can never match a future
    /// forward-only request and would otherwise pin the cache. Entries
    /// with PTS at or above `target` are left intact. Returns `None` when
    /// no exact match exists.
    pub fn pop_by_pts(&mut self, target: i64) -> Option<Packet> {
        let mut idx = 0;
        while idx < self.packets.len() {
            let pts = self.packets[idx].pts;
            if pts < target {
                self.packets.remove(idx);
            } else if pts == target {
                return Some(self.packets.remove(idx));
            } else {
                idx += 1;
            }
        }
        None
    }

    /// Discard all held packets.
    pub fn clear(&mut self) {
        self.packets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(pts: i64) -> Packet {
        Packet::new(1, pts, 1, vec![pts as u8])
    }

    #[test]
    fn test_pop_minimum_yields_sorted_sequence() {
        let mut cache = PtsCache::new(8);
        for pts in [30, 10, 50, 20, 40] {
            cache.push(packet(pts));
        }

        let mut out = Vec::new();
        while let Some(p) = cache.pop_minimum() {
            out.push(p.pts);
        }
        assert_eq!(out, vec![10, 20, 30, 40, 50]);
    }

    #[test]
    fn test_pop_minimum_tie_is_stable() {
        let mut cache = PtsCache::new(4);
        let mut first = packet(10);
        first.data = vec![1];
        let mut second = packet(10);
        second.data = vec![2];
        cache.push(first);
        cache.push(second);

        assert_eq!(cache.pop_minimum().unwrap().data, vec![1]);
        assert_eq!(cache.pop_minimum().unwrap().data, vec![2]);
    }

    #[test]
    fn test_capacity_evicts_minimum() {
        let mut cache = PtsCache::new(3);
        for pts in [10, 30, 20] {
            cache.push(packet(pts));
        }
        cache.push(packet(40));

        assert_eq!(cache.len(), 3);
        // 10 was evicted; the rest survive.
        let mut out = Vec::new();
        while let Some(p) = cache.pop_minimum() {
            out.push(p.pts);
        }
        assert_eq!(out, vec![20, 30, 40]);
    }

    #[test]
    fn test_pop_by_pts_exact_match_discards_stale() {
        let mut cache = PtsCache::new(8);
        for pts in [10, 20, 30] {
            cache.push(packet(pts));
        }

        let found = cache.pop_by_pts(20).unwrap();
        assert_eq!(found.pts, 20);
        // 10 was stale and discarded; only 30 remains.
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.pop_minimum().unwrap().pts, 30);
    }

    #[test]
    fn test_pop_by_pts_no_match_leaves_remaining() {
        let mut cache = PtsCache::new(8);
        for pts in [20, 30] {
            cache.push(packet(pts));
        }

        assert!(cache.pop_by_pts(15).is_none());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.pop_minimum().unwrap().pts, 20);
        assert_eq!(cache.pop_minimum().unwrap().pts, 30);
    }

    #[test]
    fn test_push_never_exceeds_capacity() {
        let mut cache = PtsCache::new(4);
        for pts in 0..100 {
            cache.push(packet(pts));
            assert!(cache.len() <= 4);
        }
    }
}
