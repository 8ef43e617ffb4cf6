// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Actions and the action-set ordering.

use crate::oxm::OxmTlv;
use std::fmt::Display;

/// An OpenFlow port number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct PortNo(pub u32);

impl PortNo {
    /// Maximum number of a physical port.
    pub const MAX: PortNo = PortNo(0xffff_ff00);
    /// Send the packet out the port it arrived on.
    pub const IN_PORT: PortNo = PortNo(0xffff_fff8);
    /// Submit to the flow tables (packet-out only).
    pub const TABLE: PortNo = PortNo(0xffff_fff9);
    /// Flood using normal L2 semantics.
    pub const FLOOD: PortNo = PortNo(0xffff_fffb);
    /// All ports except ingress.
    pub const ALL: PortNo = PortNo(0xffff_fffc);
    /// Punt to the controller.
    pub const CONTROLLER: PortNo = PortNo(0xffff_fffd);
    /// Wildcard used by flow-mod delete filters.
    pub const ANY: PortNo = PortNo(0xffff_ffff);

    /// True for the reserved (non-physical) port numbers.
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        self.0 > Self::MAX.0
    }
}

impl Display for PortNo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            PortNo::CONTROLLER => write!(f, "controller"),
            PortNo::FLOOD => write!(f, "flood"),
            PortNo::ALL => write!(f, "all"),
            PortNo::ANY => write!(f, "any"),
            PortNo(n) => write!(f, "{n}"),
        }
    }
}

/// Wildcard group id used by flow-mod delete filters.
pub const GROUP_ANY: u32 = 0xffff_ffff;

/// An action, as carried by apply-actions / write-actions instructions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Emit the packet on a port (or punt, for `PortNo::CONTROLLER`).
    Output {
        /// Destination port.
        port: PortNo,
    },
    /// Process the packet through a group.
    Group {
        /// Group id.
        group_id: u32,
    },
    /// Set the queue the packet egresses on.
    SetQueue {
        /// Queue id.
        queue_id: u32,
    },
    /// Rewrite one packet field.
    SetField(OxmTlv),
    /// Set the IP TTL.
    SetNwTtl(u8),
    /// Decrement the IP TTL.
    DecNwTtl,
    /// Push an 802.1Q tag.
    PushVlan(u16),
    /// Pop the outermost 802.1Q tag.
    PopVlan,
}

impl Action {
    /// The de-duplication / ordering kind of this action.
    #[must_use]
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Output { .. } => ActionKind::Output,
            Action::Group { .. } => ActionKind::Group,
            Action::SetQueue { .. } => ActionKind::SetQueue,
            Action::SetField(_) => ActionKind::SetField,
            Action::SetNwTtl(_) => ActionKind::SetNwTtl,
            Action::DecNwTtl => ActionKind::DecNwTtl,
            Action::PushVlan(_) => ActionKind::PushVlan,
            Action::PopVlan => ActionKind::PopVlan,
        }
    }
}

/// Action discriminant, ordered by the OpenFlow 1.3 action-set execution
/// order (§5.10): a written action of a given kind replaces any earlier write
/// of the same kind, and the set executes in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionKind {
    /// Pop VLAN runs first among the kinds modeled here.
    PopVlan,
    /// Push VLAN.
    PushVlan,
    /// Decrement TTL.
    DecNwTtl,
    /// Set TTL.
    SetNwTtl,
    /// Set-field rewrites.
    SetField,
    /// Queue selection.
    SetQueue,
    /// Group processing.
    Group,
    /// Output runs last.
    Output,
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reserved_ports() {
        assert!(PortNo::CONTROLLER.is_reserved());
        assert!(PortNo::FLOOD.is_reserved());
        assert!(!PortNo(1).is_reserved());
        assert!(!PortNo::MAX.is_reserved());
    }

    #[test]
    fn action_set_order_ends_with_output() {
        let mut kinds = [
            ActionKind::Output,
            ActionKind::SetField,
            ActionKind::Group,
            ActionKind::PopVlan,
        ];
        kinds.sort();
        assert_eq!(kinds[0], ActionKind::PopVlan);
        assert_eq!(kinds[3], ActionKind::Output);
    }
}
