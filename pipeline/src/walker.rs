// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The packet walker: drives an ingress packet through the table chain until
//! it is forwarded, dropped, or punted.

use crate::pipeline::Pipeline;
use datapath::{actions, Datapath, Packet};
use flowtable::FlowEntry;
use openflow::config::DpFlags;
use openflow::message::PacketInReason;
use tracing::{debug, trace, warn};

/// Cookie used when a packet-in or action-set commit cannot be attributed to
/// one particular flow.
pub(crate) const UNATTRIBUTED_COOKIE: u64 = 0xffff_ffff_ffff_ffff;

impl Pipeline {
    /// Walk an ingress packet through the tables, starting at table 0.
    ///
    /// Terminal outcomes: the accumulated action set executes and the packet
    /// is released; the packet is dropped by a meter, an action, or a table
    /// miss; or the packet is punted to the controller. The walker never
    /// retries and never re-enters itself on the same packet.
    pub fn process_packet(&mut self, dp: &mut Datapath, pkt: Packet) {
        trace!(
            "processing packet: {} bytes in on port {}",
            pkt.len(),
            pkt.in_port
        );

        if !pkt.handle.is_ttl_valid() {
            if dp.config.flags.contains(DpFlags::INVALID_TTL_TO_CONTROLLER) {
                debug!("packet has invalid TTL, sending to controller");
                dp.punt_to_controller(&pkt, 0, PacketInReason::InvalidTtl, UNATTRIBUTED_COOKIE);
            } else {
                debug!("packet has invalid TTL, dropping");
            }
            return;
        }

        let mut slot = Some(pkt);
        let mut next_table: Option<u8> = Some(0);
        while let Some(table_id) = next_table.take() {
            let Some(pkt) = slot.as_mut() else {
                return;
            };
            trace!("trying table {table_id}");
            pkt.table_id = table_id;

            let bytes = pkt.len() as u64;
            let idx = usize::from(table_id);
            let Some(entry_id) = self.tables[idx].lookup(&pkt.handle.fields, bytes) else {
                // OpenFlow 1.3 behavior on a miss with no table-miss entry
                debug!("no matching entry found, dropping packet");
                return;
            };
            pkt.handle.table_miss = self.tables[idx]
                .entry(entry_id)
                .is_some_and(FlowEntry::is_table_miss);

            self.execute_entry(dp, idx, entry_id, &mut slot, &mut next_table);
            // the packet may have died mid-entry (meter, action)
            if slot.is_none() {
                return;
            }

            if next_table.is_none() {
                let Some(mut pkt) = slot.take() else {
                    return;
                };
                // no flow to attribute the commit to
                let actions = pkt.action_set.take_for_execution();
                let mut last = Some(pkt);
                actions::execute_list(
                    dp,
                    &mut last,
                    &actions,
                    UNATTRIBUTED_COOKIE,
                    PacketInReason::ActionSet,
                );
                return;
            }
        }
        warn!("reached outside of pipeline processing cycle");
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::{add_flow, dp, eth_packet, ipv4_packet};
    use datapath::Meter;
    use openflow::action::{Action, PortNo};
    use openflow::instruction::Instruction;
    use openflow::message::Message;
    use openflow::oxm::{Match, OxmField, OxmTlv, OxmValue};

    #[test]
    fn invalid_ttl_punts_when_configured() {
        let mut pl = Pipeline::new();
        let mut dp = dp();
        dp.config.flags |= DpFlags::INVALID_TTL_TO_CONTROLLER;

        pl.process_packet(&mut dp, ipv4_packet(1, 0));

        let msgs = dp.sent_messages();
        assert_eq!(msgs.len(), 1);
        let Message::PacketIn(pin) = &msgs[0] else {
            unreachable!("expected a packet-in");
        };
        assert_eq!(pin.reason, PacketInReason::InvalidTtl);
        assert_eq!(pin.table_id, 0);
        assert_eq!(pin.cookie, UNATTRIBUTED_COOKIE);
        // no table was consulted
        assert_eq!(pl.table(0).unwrap().stats.lookup_count, 0);
    }

    #[test]
    fn invalid_ttl_drops_silently_otherwise() {
        let mut pl = Pipeline::new();
        let mut dp = dp();
        pl.process_packet(&mut dp, ipv4_packet(1, 1));
        assert!(dp.sent_messages().is_empty());
        assert!(dp.egressed().is_empty());
    }

    #[test]
    fn miss_with_empty_table_drops() {
        let mut pl = Pipeline::new();
        let mut dp = dp();
        pl.process_packet(&mut dp, eth_packet(1));
        assert!(dp.sent_messages().is_empty());
        assert!(dp.egressed().is_empty());
        assert_eq!(pl.table(0).unwrap().stats.lookup_count, 1);
        assert_eq!(pl.table(0).unwrap().stats.matched_count, 0);
    }

    #[test]
    fn goto_chains_two_tables_and_forwards() {
        let mut pl = Pipeline::new();
        let mut dp = dp();
        add_flow(
            &mut pl,
            0,
            10,
            Match::any(),
            vec![Instruction::GotoTable { table_id: 1 }],
        );
        add_flow(
            &mut pl,
            1,
            10,
            Match::any(),
            vec![Instruction::ApplyActions(vec![Action::Output {
                port: PortNo(2),
            }])],
        );

        pl.process_packet(&mut dp, eth_packet(1));

        assert_eq!(dp.egressed().len(), 1);
        assert_eq!(dp.egressed()[0].0, PortNo(2));
        assert!(dp.sent_messages().is_empty());
        assert_eq!(pl.table(0).unwrap().stats.matched_count, 1);
        assert_eq!(pl.table(1).unwrap().stats.matched_count, 1);
    }

    #[test]
    fn action_set_commits_at_terminal_table() {
        let mut pl = Pipeline::new();
        let mut dp = dp();
        add_flow(
            &mut pl,
            0,
            5,
            Match::any(),
            vec![Instruction::WriteActions(vec![Action::Output {
                port: PortNo(3),
            }])],
        );

        pl.process_packet(&mut dp, eth_packet(1));

        assert_eq!(dp.egressed().len(), 1);
        assert_eq!(dp.egressed()[0].0, PortNo(3));
    }

    #[test]
    fn action_set_punt_uses_action_set_reason() {
        let mut pl = Pipeline::new();
        let mut dp = dp();
        add_flow(
            &mut pl,
            0,
            5,
            Match::any(),
            vec![Instruction::WriteActions(vec![Action::Output {
                port: PortNo::CONTROLLER,
            }])],
        );

        pl.process_packet(&mut dp, eth_packet(1));

        let Message::PacketIn(pin) = &dp.sent_messages()[0] else {
            unreachable!("expected a packet-in");
        };
        assert_eq!(pin.reason, PacketInReason::ActionSet);
        assert_eq!(pin.cookie, UNATTRIBUTED_COOKIE);
    }

    #[test]
    fn table_miss_entry_punts_with_miss_reason() {
        let mut pl = Pipeline::new();
        let mut dp = dp();
        // priority-0 catch-all with an empty match is the table-miss entry
        add_flow(
            &mut pl,
            0,
            0,
            Match::any(),
            vec![Instruction::ApplyActions(vec![Action::Output {
                port: PortNo::CONTROLLER,
            }])],
        );

        pl.process_packet(&mut dp, eth_packet(1));

        let Message::PacketIn(pin) = &dp.sent_messages()[0] else {
            unreachable!("expected a packet-in");
        };
        assert_eq!(pin.reason, PacketInReason::TableMiss);
    }

    #[test]
    fn meter_drop_terminates_mid_pipeline() {
        let mut pl = Pipeline::new();
        let mut dp = dp();
        dp.meters.add(1, Meter::new(0, 0));
        add_flow(
            &mut pl,
            0,
            5,
            Match::any(),
            vec![
                Instruction::Meter { meter_id: 1 },
                Instruction::GotoTable { table_id: 1 },
            ],
        );
        add_flow(
            &mut pl,
            1,
            5,
            Match::any(),
            vec![Instruction::ApplyActions(vec![Action::Output {
                port: PortNo(2),
            }])],
        );

        pl.process_packet(&mut dp, eth_packet(1));

        // table 1 never consulted, nothing forwarded, no action-set commit
        assert_eq!(pl.table(1).unwrap().stats.lookup_count, 0);
        assert!(dp.egressed().is_empty());
        assert!(dp.sent_messages().is_empty());
    }

    #[test]
    fn write_metadata_is_matchable_downstream() {
        let mut pl = Pipeline::new();
        let mut dp = dp();
        add_flow(
            &mut pl,
            0,
            5,
            Match::any(),
            vec![
                Instruction::WriteMetadata {
                    metadata: 0x5a,
                    mask: 0xff,
                },
                Instruction::GotoTable { table_id: 1 },
            ],
        );
        // only matches once the metadata write landed
        add_flow(
            &mut pl,
            1,
            5,
            Match::new(vec![OxmTlv::exact(OxmField::Metadata, OxmValue::U64(0x5a))]),
            vec![Instruction::ApplyActions(vec![Action::Output {
                port: PortNo(2),
            }])],
        );

        pl.process_packet(&mut dp, eth_packet(1));

        assert_eq!(dp.egressed().len(), 1);
        assert_eq!(dp.egressed()[0].0, PortNo(2));
    }

    #[test]
    fn apply_then_clear_then_write_ordering() {
        let mut pl = Pipeline::new();
        let mut dp = dp();
        // stored canonically: apply (output 2), clear, write (output 3)
        add_flow(
            &mut pl,
            0,
            5,
            Match::any(),
            vec![
                Instruction::ApplyActions(vec![Action::Output { port: PortNo(2) }]),
                Instruction::ClearActions,
                Instruction::WriteActions(vec![Action::Output { port: PortNo(3) }]),
            ],
        );

        pl.process_packet(&mut dp, eth_packet(1));

        let out: Vec<PortNo> = dp.egressed().iter().map(|(p, _)| *p).collect();
        assert_eq!(out, vec![PortNo(2), PortNo(3)]);
    }
}
