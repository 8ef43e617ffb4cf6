// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The meter table: per-meter token-bucket policing.
//!
//! The meter instruction hands the packet slot here; an over-rate packet is
//! consumed. Granularity is packets per second, which is what the software
//! datapath polices on.

use crate::packet::Packet;
use ahash::AHashMap;
use std::time::Instant;
use tracing::{debug, trace};

const MILLITOKENS_PER_PACKET: u64 = 1000;

/// One meter instance.
#[derive(Debug)]
pub struct Meter {
    rate_pps: u64,
    burst: u64,
    millitokens: u64,
    last_refill: Instant,
}

impl Meter {
    /// A meter passing `rate_pps` packets per second with a burst allowance
    /// of `burst` packets. A rate of zero drops everything.
    #[must_use]
    pub fn new(rate_pps: u64, burst: u64) -> Self {
        Self {
            rate_pps,
            burst,
            millitokens: burst * MILLITOKENS_PER_PACKET,
            last_refill: Instant::now(),
        }
    }

    fn admit(&mut self, now: Instant) -> bool {
        let elapsed_ms = u64::try_from(now.duration_since(self.last_refill).as_millis())
            .unwrap_or(u64::MAX);
        self.last_refill = now;
        let refill = elapsed_ms.saturating_mul(self.rate_pps);
        self.millitokens =
            (self.millitokens.saturating_add(refill)).min(self.burst * MILLITOKENS_PER_PACKET);
        if self.millitokens >= MILLITOKENS_PER_PACKET {
            self.millitokens -= MILLITOKENS_PER_PACKET;
            true
        } else {
            false
        }
    }
}

/// The datapath's meters, keyed by meter id.
#[derive(Debug, Default)]
pub struct MeterTable {
    meters: AHashMap<u32, Meter>,
}

impl MeterTable {
    /// An empty meter table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install (or replace) a meter.
    pub fn add(&mut self, meter_id: u32, meter: Meter) {
        self.meters.insert(meter_id, meter);
    }

    /// Remove a meter.
    pub fn remove(&mut self, meter_id: u32) {
        self.meters.remove(&meter_id);
    }

    /// Police the packet in `slot` through `meter_id`.
    ///
    /// An over-rate packet is consumed from the slot. An unknown meter id is
    /// a no-op: meter-mod validates ids at configuration time.
    pub fn apply(&mut self, slot: &mut Option<Packet>, meter_id: u32) {
        let Some(meter) = self.meters.get_mut(&meter_id) else {
            trace!("meter {meter_id} not configured, passing packet");
            return;
        };
        if !meter.admit(Instant::now()) {
            debug!("meter {meter_id} dropped packet");
            *slot = None;
        }
    }
}
