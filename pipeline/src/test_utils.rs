// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Builders shared by the pipeline tests.

use crate::pipeline::Pipeline;
use datapath::{Datapath, Packet, Remote, Sender};
use flowtable::{EntryId, SYNC_MASTER_TABLE};
use openflow::action::PortNo;
use openflow::instruction::{sort_for_execution, Instruction};
use openflow::message::{FlowMod, FlowModBuilder};
use openflow::oxm::{FieldValues, Match, OxmField, OxmValue};
use openflow::Mac;

/// A datapath with ports 1, 2 and 3.
pub(crate) fn dp() -> Datapath {
    let mut dp = Datapath::new();
    dp.ports = [1, 2, 3].into_iter().map(PortNo).collect();
    dp
}

/// A plain Ethernet frame arriving on `in_port`.
pub(crate) fn eth_packet(in_port: u32) -> Packet {
    let mut fields = FieldValues::new();
    fields.set(OxmField::EthDst, OxmValue::Mac(Mac([0x02, 0, 0, 0, 0, 1])));
    fields.set(OxmField::EthSrc, OxmValue::Mac(Mac([0x02, 0, 0, 0, 0, 2])));
    Packet::new(vec![0u8; 64], fields, PortNo(in_port))
}

/// An IPv4 packet arriving on `in_port` with the given TTL.
pub(crate) fn ipv4_packet(in_port: u32, ttl: u8) -> Packet {
    let mut fields = FieldValues::new();
    fields.set(OxmField::EthDst, OxmValue::Mac(Mac([0x02, 0, 0, 0, 0, 1])));
    fields.set(OxmField::EthSrc, OxmValue::Mac(Mac([0x02, 0, 0, 0, 0, 2])));
    fields.set(OxmField::EthType, OxmValue::U16(0x0800));
    fields.set(
        OxmField::Ipv4Dst,
        OxmValue::Ipv4(std::net::Ipv4Addr::new(10, 0, 0, 1)),
    );
    let mut pkt = Packet::new(vec![0u8; 98], fields, PortNo(in_port));
    pkt.handle.ip_ttl = Some(ttl);
    pkt
}

/// A flow-mod add.
#[allow(clippy::unwrap_used)]
pub(crate) fn flow_mod(
    table_id: u8,
    priority: u16,
    match_fields: Match,
    instructions: Vec<Instruction>,
) -> FlowMod {
    FlowModBuilder::default()
        .table_id(table_id)
        .priority(priority)
        .match_fields(match_fields)
        .instructions(instructions)
        .build()
        .unwrap()
}

/// Install an entry straight into a table, normalized the way the flow-mod
/// handler would store it.
#[allow(clippy::unwrap_used)]
pub(crate) fn add_flow(
    pl: &mut Pipeline,
    table_id: u8,
    priority: u16,
    match_fields: Match,
    mut instructions: Vec<Instruction>,
) -> EntryId {
    sort_for_execution(&mut instructions);
    let msg = flow_mod(table_id, priority, match_fields, instructions);
    pl.table_mut(table_id)
        .unwrap()
        .flow_mod(msg)
        .unwrap()
        .entry
        .unwrap()
}

/// Install a synchronized 62/63 pair through the flow-mod handler and return
/// (master, slave) entry ids.
#[allow(clippy::unwrap_used)]
pub(crate) fn sibling_add(pl: &mut Pipeline) -> (EntryId, EntryId) {
    let mut dp = dp();
    let mut remote = Remote::new();
    let sender = Sender::new(&mut remote, 1);
    let msg = flow_mod(
        SYNC_MASTER_TABLE,
        5,
        Match::new(vec![
            openflow::oxm::OxmTlv::eth_dst(Mac([0xaa; 6])),
            openflow::oxm::OxmTlv::eth_src(Mac([0xbb; 6])),
        ]),
        vec![],
    );
    pl.handle_flow_mod(&mut dp, msg, &sender).unwrap();
    let master_table = pl.table(SYNC_MASTER_TABLE).unwrap();
    let master = master_table.entry_ids()[0];
    let slave = master_table.entry(master).unwrap().sync_slave.unwrap();
    (master, slave)
}
