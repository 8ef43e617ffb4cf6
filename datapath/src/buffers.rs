// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The packet buffer pool.
//!
//! Punted packets are parked here under a buffer id so the controller can
//! later release them back into the pipeline (flow-mod `buffer_id`) without
//! shipping the payload both ways.

use crate::packet::Packet;
use ahash::AHashMap;
use std::collections::VecDeque;
use tracing::warn;

const DEFAULT_CAPACITY: usize = 256;

/// A bounded pool of parked packets, evicting the oldest when full.
#[derive(Debug)]
pub struct BufferPool {
    slots: AHashMap<u32, Packet>,
    fifo: VecDeque<u32>,
    next_id: u32,
    capacity: usize,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl BufferPool {
    /// A pool holding at most `capacity` packets.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: AHashMap::new(),
            fifo: VecDeque::new(),
            next_id: 0,
            capacity,
        }
    }

    /// Park a packet, returning its buffer id. The packet's own `buffer_id`
    /// field records the id as well.
    pub fn save(&mut self, mut pkt: Packet) -> u32 {
        if self.slots.len() >= self.capacity {
            if let Some(oldest) = self.fifo.pop_front() {
                warn!("buffer pool full, evicting buffer {oldest}");
                self.slots.remove(&oldest);
            }
        }
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        pkt.buffer_id = Some(id);
        self.slots.insert(id, pkt);
        self.fifo.push_back(id);
        id
    }

    /// Take the packet parked under `id`, if it is still there.
    pub fn retrieve(&mut self, id: u32) -> Option<Packet> {
        let pkt = self.slots.remove(&id)?;
        self.fifo.retain(|parked| *parked != id);
        Some(pkt)
    }

    /// Number of parked packets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when nothing is parked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod test {
    use super::*;
    use openflow::action::PortNo;
    use openflow::oxm::FieldValues;

    fn packet(tag: u8) -> Packet {
        Packet::new(vec![tag; 60], FieldValues::new(), PortNo(1))
    }

    #[test]
    fn save_and_retrieve() {
        let mut pool = BufferPool::default();
        let id = pool.save(packet(1));
        let got = pool.retrieve(id).unwrap();
        assert_eq!(got.buffer_id, Some(id));
        assert_eq!(got.payload[0], 1);
        // a second retrieve finds nothing
        assert!(pool.retrieve(id).is_none());
    }

    #[test]
    fn full_pool_evicts_oldest() {
        let mut pool = BufferPool::with_capacity(2);
        let first = pool.save(packet(1));
        let second = pool.save(packet(2));
        let third = pool.save(packet(3));
        assert!(pool.retrieve(first).is_none());
        assert!(pool.retrieve(second).is_some());
        assert!(pool.retrieve(third).is_some());
    }
}
