// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Flow entries and their arena ids.

use openflow::action::{Action, GROUP_ANY, PortNo};
use openflow::instruction::Instruction;
use openflow::message::FlowMod;
use openflow::oxm::Match;
use std::fmt::Display;
use std::time::Instant;

/// Arena index of a flow entry within its table.
///
/// Ids are only held across a single flow-mod call or inside a sibling link
/// pair; the table reuses slots of removed entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(pub(crate) u32);

impl EntryId {
    #[must_use]
    pub(crate) fn slot(self) -> usize {
        self.0 as usize
    }
}

impl Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One flow entry: match, priority, instructions, counters and the optional
/// synchronization links into the sibling table.
#[derive(Debug, Clone)]
pub struct FlowEntry {
    /// Matching precedence; higher wins.
    pub priority: u16,
    /// The match.
    pub match_fields: Match,
    /// Controller cookie.
    pub cookie: u64,
    /// Seconds of inactivity before eviction; 0 disables.
    pub idle_timeout: u16,
    /// Seconds of lifetime before eviction; 0 disables.
    pub hard_timeout: u16,
    /// Instructions, stored in canonical execution order.
    pub instructions: Vec<Instruction>,
    /// Packets that hit this entry.
    pub packet_count: u64,
    /// Bytes that hit this entry.
    pub byte_count: u64,
    /// When the entry was installed.
    pub added_at: Instant,
    /// When the entry last matched a packet.
    pub last_used: Instant,
    /// Peer entry in table 62 (set on entries of table 63).
    pub sync_master: Option<EntryId>,
    /// Peer entry in table 63 (set on entries of table 62).
    pub sync_slave: Option<EntryId>,
}

impl FlowEntry {
    /// Build an entry from an add flow-mod. The match and instruction list
    /// move out of the message into the table.
    #[must_use]
    pub fn from_flow_mod(msg: FlowMod, now: Instant) -> Self {
        Self {
            priority: msg.priority,
            match_fields: msg.match_fields,
            cookie: msg.cookie,
            idle_timeout: msg.idle_timeout,
            hard_timeout: msg.hard_timeout,
            instructions: msg.instructions,
            packet_count: 0,
            byte_count: 0,
            added_at: now,
            last_used: now,
            sync_master: None,
            sync_slave: None,
        }
    }

    /// A table-miss entry is the priority-0 catch-all with an empty match.
    #[must_use]
    pub fn is_table_miss(&self) -> bool {
        self.priority == 0 && self.match_fields.wire_len() <= 4
    }

    /// True iff any apply- or write-actions instruction outputs to `port`.
    /// `PortNo::ANY` matches every entry.
    #[must_use]
    pub fn forwards_to_port(&self, port: PortNo) -> bool {
        if port == PortNo::ANY {
            return true;
        }
        self.actions()
            .any(|a| matches!(a, Action::Output { port: p } if *p == port))
    }

    /// True iff any apply- or write-actions instruction forwards to
    /// `group_id`. [`GROUP_ANY`] matches every entry.
    #[must_use]
    pub fn forwards_to_group(&self, group_id: u32) -> bool {
        if group_id == GROUP_ANY {
            return true;
        }
        self.actions()
            .any(|a| matches!(a, Action::Group { group_id: g } if *g == group_id))
    }

    fn actions(&self) -> impl Iterator<Item = &Action> {
        self.instructions
            .iter()
            .filter_map(|inst| match inst {
                Instruction::ApplyActions(actions) | Instruction::WriteActions(actions) => {
                    Some(actions.iter())
                }
                _ => None,
            })
            .flatten()
    }

    /// True iff the entry has outlived its idle or hard timeout.
    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        if self.hard_timeout > 0
            && now.duration_since(self.added_at).as_secs() >= u64::from(self.hard_timeout)
        {
            return true;
        }
        self.idle_timeout > 0
            && now.duration_since(self.last_used).as_secs() >= u64::from(self.idle_timeout)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod test {
    use super::*;
    use openflow::message::FlowModBuilder;
    use openflow::oxm::OxmTlv;
    use std::time::Duration;

    fn entry(priority: u16, match_fields: Match) -> FlowEntry {
        let msg = FlowModBuilder::default()
            .priority(priority)
            .match_fields(match_fields)
            .build()
            .unwrap();
        FlowEntry::from_flow_mod(msg, Instant::now())
    }

    #[test]
    fn table_miss_requires_empty_match_and_zero_priority() {
        assert!(entry(0, Match::any()).is_table_miss());
        assert!(!entry(1, Match::any()).is_table_miss());
        let m = Match::new(vec![OxmTlv::eth_dst(openflow::Mac::BROADCAST)]);
        assert!(!entry(0, m).is_table_miss());
    }

    #[test]
    fn out_port_filter_sees_write_actions() {
        let msg = FlowModBuilder::default()
            .instructions(vec![Instruction::WriteActions(vec![Action::Output {
                port: PortNo(7),
            }])])
            .build()
            .unwrap();
        let e = FlowEntry::from_flow_mod(msg, Instant::now());
        assert!(e.forwards_to_port(PortNo(7)));
        assert!(e.forwards_to_port(PortNo::ANY));
        assert!(!e.forwards_to_port(PortNo(8)));
    }

    #[test]
    fn expiry() {
        let mut e = entry(1, Match::any());
        e.idle_timeout = 5;
        let now = e.last_used + Duration::from_secs(4);
        assert!(!e.is_expired(now));
        let now = e.last_used + Duration::from_secs(5);
        assert!(e.is_expired(now));

        let mut e = entry(1, Match::any());
        e.hard_timeout = 10;
        e.last_used = e.added_at + Duration::from_secs(9);
        assert!(e.is_expired(e.added_at + Duration::from_secs(10)));
    }
}
