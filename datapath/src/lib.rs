// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! # Datapath collaborators
//!
//! The subsystems the pipeline drives but does not own: the packet with its
//! parsed-field view and action set, the action executor and its validation,
//! the packet buffer pool, the meter table, and the per-connection controller
//! state (role plus the multipart reassembly slot).
//!
//! Everything here runs on the single datapath thread; operations complete
//! synchronously and the outbound queues absorb back-pressure below this
//! layer.

#![deny(
    unsafe_code,
    clippy::all,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

pub mod actions;
pub mod buffers;
pub mod meter;
pub mod packet;
pub mod remote;

pub use actions::ActionSet;
pub use buffers::BufferPool;
pub use meter::{Meter, MeterTable};
pub use packet::{FieldView, Packet};
pub use remote::{Reassembly, Remote, Sender};

use openflow::action::PortNo;
use openflow::config::{DpFlags, MissSendLen};
use openflow::message::{Message, PacketIn, PacketInReason};
use openflow::oxm::Match;
use std::collections::BTreeSet;
use tracing::trace;

/// Switch-level configuration, edited by set-config messages upstream.
#[derive(Debug, Default, Clone, Copy)]
pub struct DpConfig {
    /// Behavior flags.
    pub flags: DpFlags,
    /// How much of a punted packet to ship to the controller.
    pub miss_send_len: MissSendLen,
}

/// The datapath: shared configuration, port and group id registries, the
/// buffer pool and meter table, and the outbound queues.
///
/// The connection manager drains `tx`; the port drivers drain `egress`.
#[derive(Debug, Default)]
pub struct Datapath {
    /// Switch configuration.
    pub config: DpConfig,
    /// Physical ports the switch owns.
    pub ports: BTreeSet<PortNo>,
    /// Configured group ids (group execution itself lives in the group table).
    pub groups: BTreeSet<u32>,
    /// Parked packets awaiting a controller verdict.
    pub buffers: BufferPool,
    /// Meter instances.
    pub meters: MeterTable,
    tx: Vec<Message>,
    egress: Vec<(PortNo, Vec<u8>)>,
}

impl Datapath {
    /// A datapath with no ports and default config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an outbound message for the connection manager. Non-blocking.
    pub fn send_message(&mut self, msg: Message) {
        self.tx.push(msg);
    }

    /// Queue a frame for transmission on `port`.
    pub fn transmit(&mut self, port: PortNo, frame: Vec<u8>) {
        trace!("queueing {} bytes on port {port}", frame.len());
        self.egress.push((port, frame));
    }

    /// Messages queued so far (drained by the connection manager).
    #[must_use]
    pub fn sent_messages(&self) -> &[Message] {
        &self.tx
    }

    /// Take all queued messages.
    pub fn drain_messages(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.tx)
    }

    /// Frames queued so far (drained by the port drivers).
    #[must_use]
    pub fn egressed(&self) -> &[(PortNo, Vec<u8>)] {
        &self.egress
    }

    /// Take all queued frames.
    pub fn drain_egress(&mut self) -> Vec<(PortNo, Vec<u8>)> {
        std::mem::take(&mut self.egress)
    }

    /// Punt a packet to the controller.
    ///
    /// With buffering enabled (`miss_send_len != NO_BUFFER`) a copy of the
    /// packet is parked in the buffer pool and the packet-in carries the
    /// buffer id plus at most `miss_send_len` bytes; otherwise the complete
    /// payload travels in the message and nothing is parked.
    pub fn punt_to_controller(
        &mut self,
        pkt: &Packet,
        table_id: u8,
        reason: PacketInReason,
        cookie: u64,
    ) {
        let total_len = pkt.payload.len();
        let (buffer_id, data) = if self.config.miss_send_len.buffers() {
            let id = self.buffers.save(pkt.clone());
            let keep = total_len.min(usize::from(self.config.miss_send_len.0));
            (Some(id), pkt.payload[..keep].to_vec())
        } else {
            (None, pkt.payload.clone())
        };
        trace!("packet-in from table {table_id}, reason {reason:?}");
        self.send_message(Message::PacketIn(PacketIn {
            buffer_id,
            total_len,
            reason,
            table_id,
            cookie,
            match_fields: Match::snapshot_of(&pkt.handle.fields),
            data,
        }));
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod test {
    use super::*;
    use openflow::oxm::FieldValues;

    fn packet(len: usize) -> Packet {
        Packet::new(vec![0xab; len], FieldValues::new(), PortNo(1))
    }

    #[test]
    fn punt_without_buffering_ships_everything() {
        let mut dp = Datapath::new();
        dp.config.miss_send_len = MissSendLen::NO_BUFFER;
        dp.punt_to_controller(&packet(300), 0, PacketInReason::InvalidTtl, u64::MAX);

        let msgs = dp.sent_messages();
        assert_eq!(msgs.len(), 1);
        let Message::PacketIn(pin) = &msgs[0] else {
            unreachable!("expected a packet-in");
        };
        assert!(pin.buffer_id.is_none());
        assert_eq!(pin.data.len(), 300);
        assert_eq!(pin.total_len, 300);
    }

    #[test]
    fn punt_with_buffering_truncates_and_parks() {
        let mut dp = Datapath::new();
        dp.config.miss_send_len = MissSendLen(128);
        dp.punt_to_controller(&packet(300), 2, PacketInReason::ApplyAction, 7);

        let Message::PacketIn(pin) = &dp.sent_messages()[0] else {
            unreachable!("expected a packet-in");
        };
        assert_eq!(pin.data.len(), 128);
        assert_eq!(pin.total_len, 300);
        let id = pin.buffer_id.unwrap();
        let parked = dp.buffers.retrieve(id).unwrap();
        assert_eq!(parked.payload.len(), 300);
    }
}
