// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The flow-mod handler: validation, dispatch, and the table 62 ↔ 63
//! synchronization.

use crate::pipeline::Pipeline;
use datapath::{actions, Datapath, Sender};
use flowtable::{LPM_TABLE, PIPELINE_TABLES, SYNC_MASTER_TABLE, SYNC_SLAVE_TABLE};
use openflow::config::ControllerRole;
use openflow::error::OflError;
use openflow::instruction::{sort_for_execution, Instruction};
use openflow::message::{FlowMod, FlowModCommand, ALL_TABLES};
use openflow::oxm::{contiguous_prefix_len, OxmField, OxmValue};
use tracing::{debug, warn};

impl Pipeline {
    /// Apply a flow-mod.
    ///
    /// Validation (role, actions, goto targets, the prefix-match constraint
    /// of table 61) runs before any table is touched; a validated message is
    /// then dispatched to one table or, for the all-tables delete sentinel,
    /// to every table in order. An add to table 62 additionally installs the
    /// Ethernet-transposed twin into table 63 and cross-links the pair.
    pub fn handle_flow_mod(
        &mut self,
        dp: &mut Datapath,
        mut msg: FlowMod,
        sender: &Sender<'_>,
    ) -> Result<(), OflError> {
        if sender.remote.role == ControllerRole::Slave {
            return Err(OflError::IsSlave);
        }

        // normalize to execution order so entries store it canonically
        sort_for_execution(&mut msg.instructions);

        for inst in &msg.instructions {
            match inst {
                Instruction::ApplyActions(list) | Instruction::WriteActions(list) => {
                    actions::validate(dp, list)?;
                    actions::check_set_field_req(&msg.match_fields, list)?;
                }
                // forward progress is only checkable against a concrete
                // table; the all-tables sentinel is rejected at dispatch
                Instruction::GotoTable { table_id }
                    if !msg.command.is_delete() && msg.table_id != ALL_TABLES =>
                {
                    // the walker assumes forward progress
                    if *table_id <= msg.table_id || usize::from(*table_id) >= PIPELINE_TABLES {
                        return Err(OflError::BadGotoTable);
                    }
                }
                _ => {}
            }
        }

        if msg.table_id == LPM_TABLE && msg.command == FlowModCommand::Add {
            validate_lpm_priority(&msg)?;
        }

        if msg.table_id == ALL_TABLES {
            // the sentinel is only defined for deletion, meaning every table
            if !msg.command.is_delete() {
                return Err(OflError::BadTableId);
            }
            for idx in 0..PIPELINE_TABLES {
                // first error aborts; prior deletions stand
                let effect = self.tables[idx].flow_mod(msg.clone())?;
                #[allow(clippy::cast_possible_truncation)] // table ids fit u8
                self.unlink_peers(idx as u8, effect.unlinked_peers);
            }
            return Ok(());
        }

        let table_id = msg.table_id;
        let command = msg.command;
        let buffer_id = msg.buffer_id;
        if usize::from(table_id) >= PIPELINE_TABLES {
            return Err(OflError::BadTableId);
        }

        // clone before the match and instructions move into the table
        let sibling_src = (table_id == SYNC_MASTER_TABLE && command == FlowModCommand::Add)
            .then(|| msg.clone());

        let effect = self.tables[usize::from(table_id)].flow_mod(msg)?;
        self.unlink_peers(table_id, effect.unlinked_peers);

        if let (Some(slave_msg), Some(master_id)) = (sibling_src, effect.entry) {
            self.install_sibling(slave_msg, master_id);
        }

        if matches!(
            command,
            FlowModCommand::Add | FlowModCommand::Modify | FlowModCommand::ModifyStrict
        ) {
            if let Some(buffer_id) = buffer_id {
                // run the buffered packet through the updated tables
                match dp.buffers.retrieve(buffer_id) {
                    Some(pkt) => self.process_packet(dp, pkt),
                    None => {
                        warn!("the buffer flow-mod referred to was empty ({buffer_id})");
                    }
                }
            }
        }

        Ok(())
    }

    /// Table 63 mirrors table 62: install the Ethernet-transposed twin of a
    /// freshly added master entry and cross-link the pair.
    ///
    /// A failing twin install is swallowed: surfacing it would require
    /// pulling the master back out of the table, and that removal has side
    /// effects of its own. The master simply stays unlinked.
    fn install_sibling(&mut self, mut slave_msg: FlowMod, master_id: flowtable::EntryId) {
        slave_msg.match_fields.transpose_eth_addrs();
        slave_msg.table_id = SYNC_SLAVE_TABLE;
        // the master dispatch already re-injected any buffered packet
        slave_msg.buffer_id = None;

        match self.tables[usize::from(SYNC_SLAVE_TABLE)].flow_mod(slave_msg) {
            Ok(slave_effect) => {
                self.unlink_peers(SYNC_SLAVE_TABLE, slave_effect.unlinked_peers);
                if let Some(slave_id) = slave_effect.entry {
                    if let Some(slave) =
                        self.tables[usize::from(SYNC_SLAVE_TABLE)].entry_mut(slave_id)
                    {
                        slave.sync_master = Some(master_id);
                    }
                    if let Some(master) =
                        self.tables[usize::from(SYNC_MASTER_TABLE)].entry_mut(master_id)
                    {
                        master.sync_slave = Some(slave_id);
                    }
                }
            }
            Err(err) => {
                debug!("synchronized install into table 63 failed: {err}");
            }
        }
    }
}

/// Table 61 stores IPv4 destination routes; by convention an entry's priority
/// is its prefix length, so longer prefixes win lookups. Reject adds that
/// break the convention.
fn validate_lpm_priority(msg: &FlowMod) -> Result<(), OflError> {
    for tlv in msg.match_fields.iter() {
        if tlv.field != OxmField::Ipv4Dst {
            continue;
        }
        match (&tlv.value, &tlv.mask) {
            (OxmValue::Ipv4(_), Some(OxmValue::Ipv4(mask))) => {
                let Some(prefix_len) = contiguous_prefix_len(u32::from(*mask)) else {
                    return Err(OflError::BadNwAddrMask);
                };
                debug!(
                    "mask validation: prio = {}, prefix = {prefix_len}",
                    msg.priority
                );
                if msg.priority != u16::from(prefix_len) {
                    return Err(OflError::BadPriority);
                }
            }
            (OxmValue::Ipv4(_), None) => {
                if msg.priority != 32 {
                    return Err(OflError::BadPriority);
                }
            }
            _ => {}
        }
    }
    Ok(())
}
