// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The packet as the pipeline sees it: raw bytes plus the parsed-field view
//! and the accumulated action set.

use crate::actions::ActionSet;
use openflow::action::PortNo;
use openflow::oxm::{FieldValues, OxmField, OxmValue};

/// The parsed-field view of a packet.
///
/// The field values are authoritative for matching and set-field rewrites;
/// re-serialization back into bytes is the egress driver's problem. A packet
/// has exactly one view.
#[derive(Debug, Clone, Default)]
pub struct FieldView {
    /// The OXM field values.
    pub fields: FieldValues,
    /// IP TTL, when the packet has an IP header.
    pub ip_ttl: Option<u8>,
    /// Number of VLAN tags currently on the packet.
    pub vlan_depth: u8,
    /// Set by the walker when the matched entry is a table-miss entry.
    pub table_miss: bool,
}

impl FieldView {
    /// A TTL of 0 or 1 cannot be decremented and forwarded; packets without
    /// an IP header always pass.
    #[must_use]
    pub fn is_ttl_valid(&self) -> bool {
        self.ip_ttl.is_none_or(|ttl| ttl > 1)
    }

    /// Re-establish the view's invariants after field rewrites.
    ///
    /// The metadata register always exists once the packet is in the
    /// pipeline.
    pub fn validate(&mut self) {
        if self.fields.get(OxmField::Metadata).is_none() {
            self.fields.set(OxmField::Metadata, OxmValue::U64(0));
        }
    }
}

/// A packet owned by the pipeline while it walks the tables.
#[derive(Debug, Clone)]
pub struct Packet {
    /// The raw frame.
    pub payload: Vec<u8>,
    /// Parsed-field view.
    pub handle: FieldView,
    /// Write-actions accumulator, executed at pipeline end.
    pub action_set: ActionSet,
    /// Ingress port (physical port == logical port on this datapath).
    pub in_port: PortNo,
    /// Last table the packet visited.
    pub table_id: u8,
    /// Buffer pool id, set when the packet is parked for the controller.
    pub buffer_id: Option<u32>,
}

impl Packet {
    /// Wrap a parsed frame for pipeline processing.
    #[must_use]
    pub fn new(payload: Vec<u8>, mut fields: FieldValues, in_port: PortNo) -> Self {
        fields.set(OxmField::InPort, OxmValue::U32(in_port.0));
        let mut handle = FieldView {
            fields,
            ..FieldView::default()
        };
        handle.validate();
        Self {
            payload,
            handle,
            action_set: ActionSet::new(),
            in_port,
            table_id: 0,
            buffer_id: None,
        }
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// True for an empty payload.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ttl_validity() {
        let mut view = FieldView::default();
        assert!(view.is_ttl_valid());
        view.ip_ttl = Some(64);
        assert!(view.is_ttl_valid());
        view.ip_ttl = Some(1);
        assert!(!view.is_ttl_valid());
        view.ip_ttl = Some(0);
        assert!(!view.is_ttl_valid());
    }

    #[test]
    fn new_packet_carries_in_port_and_metadata() {
        let pkt = Packet::new(vec![0; 64], FieldValues::new(), PortNo(3));
        assert_eq!(
            pkt.handle.fields.get(OxmField::InPort),
            Some(&OxmValue::U32(3))
        );
        assert_eq!(
            pkt.handle.fields.get(OxmField::Metadata),
            Some(&OxmValue::U64(0))
        );
    }
}
