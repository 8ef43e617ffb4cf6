// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Action execution and validation.
//!
//! The action set is the ordered, de-duplicated accumulator filled by
//! write-actions instructions; the list executor applies actions immediately
//! for apply-actions and for the final action-set commit.

use crate::packet::Packet;
use crate::Datapath;
use openflow::action::{Action, ActionKind, PortNo};
use openflow::error::OflError;
use openflow::message::PacketInReason;
use openflow::oxm::{Match, OxmField, OxmValue};
use ordermap::OrderMap;
use tracing::{debug, trace, warn};

/// The accumulated write-actions of a packet.
///
/// One action per [`ActionKind`]: a later write of the same kind replaces the
/// earlier one. Execution drains the set in `ActionKind` order, ending with
/// output.
#[derive(Debug, Clone, Default)]
pub struct ActionSet {
    set: OrderMap<ActionKind, Action>,
}

impl ActionSet {
    /// The empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `actions` into the set, replacing same-kind entries.
    pub fn write_actions(&mut self, actions: &[Action]) {
        for action in actions {
            self.set.insert(action.kind(), action.clone());
        }
    }

    /// Empty the set (the clear-actions instruction).
    pub fn clear_actions(&mut self) {
        self.set.clear();
    }

    /// True when nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Drain the set into the order it must execute in.
    #[must_use]
    pub fn take_for_execution(&mut self) -> Vec<Action> {
        let mut drained: Vec<(ActionKind, Action)> = self.set.drain(..).collect();
        drained.sort_by_key(|(kind, _)| *kind);
        drained.into_iter().map(|(_, action)| action).collect()
    }
}

/// Execute an action list on the packet in `slot`.
///
/// Actions may consume the packet (a controller punt with buffering moves a
/// copy; group processing is external); callers must re-check the slot after
/// the call. `cookie` and `reason` attribute any packet-in this list emits.
pub fn execute_list(
    dp: &mut Datapath,
    slot: &mut Option<Packet>,
    actions: &[Action],
    cookie: u64,
    reason: PacketInReason,
) {
    for action in actions {
        let Some(pkt) = slot.as_mut() else {
            return;
        };
        match action {
            Action::Output { port } => output(dp, pkt, *port, cookie, reason),
            Action::Group { group_id } => {
                // Group execution belongs to the group table subsystem.
                trace!("group {group_id} processing delegated");
            }
            Action::SetQueue { queue_id } => {
                trace!("queue {queue_id} selected");
            }
            Action::SetField(tlv) => {
                pkt.handle.fields.set(tlv.field, tlv.value);
                pkt.handle.validate();
            }
            Action::SetNwTtl(ttl) => {
                if pkt.handle.ip_ttl.is_some() {
                    pkt.handle.ip_ttl = Some(*ttl);
                }
            }
            Action::DecNwTtl => {
                if let Some(ttl) = pkt.handle.ip_ttl {
                    pkt.handle.ip_ttl = Some(ttl.saturating_sub(1));
                }
            }
            Action::PushVlan(_) => {
                pkt.handle.vlan_depth = pkt.handle.vlan_depth.saturating_add(1);
            }
            Action::PopVlan => {
                pkt.handle.vlan_depth = pkt.handle.vlan_depth.saturating_sub(1);
            }
        }
    }
}

fn output(dp: &mut Datapath, pkt: &Packet, port: PortNo, cookie: u64, reason: PacketInReason) {
    match port {
        PortNo::CONTROLLER => {
            dp.punt_to_controller(pkt, pkt.table_id, reason, cookie);
        }
        PortNo::IN_PORT => {
            dp.transmit(pkt.in_port, pkt.payload.clone());
        }
        PortNo::FLOOD | PortNo::ALL => {
            let out: Vec<PortNo> = dp
                .ports
                .iter()
                .copied()
                .filter(|p| *p != pkt.in_port)
                .collect();
            for p in out {
                dp.transmit(p, pkt.payload.clone());
            }
        }
        PortNo::TABLE | PortNo::ANY => {
            debug!("output to {port} ignored outside packet-out");
        }
        port if dp.ports.contains(&port) => {
            dp.transmit(port, pkt.payload.clone());
        }
        port => {
            // validation screens these out of flow-mods; ports can still
            // disappear between install and execution
            warn!("output to unknown port {port}, dropping frame copy");
        }
    }
}

/// Check an action list against the datapath: output ports must exist or be
/// reserved, groups must be configured.
pub fn validate(dp: &Datapath, actions: &[Action]) -> Result<(), OflError> {
    for action in actions {
        match action {
            Action::Output { port } => {
                if !port.is_reserved() && !dp.ports.contains(port) {
                    return Err(OflError::BadOutPort(port.0));
                }
            }
            Action::Group { group_id } => {
                if !dp.groups.contains(group_id) {
                    return Err(OflError::BadOutGroup(*group_id));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Check the set-field actions of a flow-mod against its match.
///
/// A set-field must be unmasked, must not rewrite the ingress port, and its
/// protocol prerequisites must be pinned by the match: rewriting an IPv4
/// address requires the match to pin `ETH_TYPE` to IPv4, rewriting an L4 port
/// requires the matching `IP_PROTO`.
pub fn check_set_field_req(match_fields: &Match, actions: &[Action]) -> Result<(), OflError> {
    for action in actions {
        let Action::SetField(tlv) = action else {
            continue;
        };
        if tlv.mask.is_some() {
            return Err(OflError::BadSetArgument);
        }
        let prereq = match tlv.field {
            OxmField::InPort => return Err(OflError::BadSetArgument),
            OxmField::Ipv4Src | OxmField::Ipv4Dst => {
                Some((OxmField::EthType, OxmValue::U16(0x0800)))
            }
            OxmField::TcpSrc | OxmField::TcpDst => Some((OxmField::IpProto, OxmValue::U8(6))),
            OxmField::UdpSrc | OxmField::UdpDst => Some((OxmField::IpProto, OxmValue::U8(17))),
            _ => None,
        };
        if let Some((field, value)) = prereq {
            let pinned = match_fields
                .get(field)
                .is_some_and(|t| t.mask.is_none() && t.value == value);
            if !pinned {
                return Err(OflError::BadSetArgument);
            }
        }
    }
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod test {
    use super::*;
    use openflow::oxm::{FieldValues, OxmTlv};
    use std::net::Ipv4Addr;

    fn dp_with_ports(ports: &[u32]) -> Datapath {
        let mut dp = Datapath::new();
        dp.ports = ports.iter().map(|p| PortNo(*p)).collect();
        dp
    }

    fn packet_on(port: u32) -> Packet {
        Packet::new(vec![0xaa; 60], FieldValues::new(), PortNo(port))
    }

    #[test]
    fn action_set_dedups_by_kind() {
        let mut set = ActionSet::new();
        set.write_actions(&[
            Action::Output { port: PortNo(1) },
            Action::SetNwTtl(9),
        ]);
        set.write_actions(&[Action::Output { port: PortNo(2) }]);

        let drained = set.take_for_execution();
        assert_eq!(
            drained,
            vec![Action::SetNwTtl(9), Action::Output { port: PortNo(2) }]
        );
        assert!(set.is_empty());
    }

    #[test]
    fn action_set_executes_output_last() {
        let mut set = ActionSet::new();
        set.write_actions(&[
            Action::Output { port: PortNo(1) },
            Action::PopVlan,
            Action::SetField(OxmTlv::ipv4_dst(Ipv4Addr::new(10, 0, 0, 1))),
        ]);
        let drained = set.take_for_execution();
        assert_eq!(drained.last(), Some(&Action::Output { port: PortNo(1) }));
        assert_eq!(drained.first(), Some(&Action::PopVlan));
    }

    #[test]
    fn output_transmits_on_known_port() {
        let mut dp = dp_with_ports(&[1, 2]);
        let mut slot = Some(packet_on(1));
        execute_list(
            &mut dp,
            &mut slot,
            &[Action::Output { port: PortNo(2) }],
            0,
            PacketInReason::ApplyAction,
        );
        assert!(slot.is_some());
        assert_eq!(dp.egressed().len(), 1);
        assert_eq!(dp.egressed()[0].0, PortNo(2));
    }

    #[test]
    fn flood_skips_ingress_port() {
        let mut dp = dp_with_ports(&[1, 2, 3]);
        let mut slot = Some(packet_on(1));
        execute_list(
            &mut dp,
            &mut slot,
            &[Action::Output {
                port: PortNo::FLOOD,
            }],
            0,
            PacketInReason::ApplyAction,
        );
        let out: Vec<PortNo> = dp.egressed().iter().map(|(p, _)| *p).collect();
        assert_eq!(out, vec![PortNo(2), PortNo(3)]);
    }

    #[test]
    fn validate_rejects_unknown_port_and_group() {
        let dp = dp_with_ports(&[1]);
        assert_eq!(
            validate(&dp, &[Action::Output { port: PortNo(9) }]),
            Err(OflError::BadOutPort(9))
        );
        assert_eq!(
            validate(&dp, &[Action::Group { group_id: 4 }]),
            Err(OflError::BadOutGroup(4))
        );
        assert!(validate(
            &dp,
            &[Action::Output {
                port: PortNo::CONTROLLER
            }]
        )
        .is_ok());
    }

    #[test]
    fn set_field_prerequisites() {
        // rewriting an IPv4 address without pinning ETH_TYPE fails
        let actions = [Action::SetField(OxmTlv::ipv4_dst(Ipv4Addr::new(
            10, 0, 0, 1,
        )))];
        assert_eq!(
            check_set_field_req(&Match::any(), &actions),
            Err(OflError::BadSetArgument)
        );

        let pinned = Match::new(vec![OxmTlv::exact(
            OxmField::EthType,
            OxmValue::U16(0x0800),
        )]);
        assert!(check_set_field_req(&pinned, &actions).is_ok());

        // masked set-field is never valid
        let masked = [Action::SetField(OxmTlv::ipv4_dst_masked(
            Ipv4Addr::new(10, 0, 0, 0),
            Ipv4Addr::new(255, 0, 0, 0),
        ))];
        assert_eq!(
            check_set_field_req(&pinned, &masked),
            Err(OflError::BadSetArgument)
        );
    }
}
