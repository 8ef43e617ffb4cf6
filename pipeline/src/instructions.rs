// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The instruction executor.

use crate::pipeline::Pipeline;
use datapath::{actions, Datapath, Packet};
use flowtable::EntryId;
use openflow::instruction::Instruction;
use openflow::message::PacketInReason;
use tracing::{debug, trace};

/// Handler for experimenter instructions.
///
/// The packet is handed over mutably; the hook must not consume it.
pub type ExperimenterHook = fn(&mut Datapath, &mut Packet, u32, &[u8]);

impl Pipeline {
    /// Execute the instructions of a matched entry.
    ///
    /// Entries store their instructions in canonical execution order (flow-mod
    /// normalizes on insert): Meter, Apply-Actions, Clear-Actions,
    /// Write-Actions, Write-Metadata, Goto-Table. Any instruction may consume
    /// the packet; the slot is re-checked before every instruction and the
    /// walker inspects it after the call.
    pub(crate) fn execute_entry(
        &self,
        dp: &mut Datapath,
        table_idx: usize,
        entry_id: EntryId,
        slot: &mut Option<Packet>,
        next_table: &mut Option<u8>,
    ) {
        let Some(entry) = self.tables[table_idx].entry(entry_id) else {
            return;
        };
        let cookie = entry.cookie;
        let is_miss = entry.is_table_miss();

        for inst in &entry.instructions {
            if slot.is_none() {
                return;
            }
            match inst {
                Instruction::Meter { meter_id } => {
                    dp.meters.apply(slot, *meter_id);
                }
                Instruction::ApplyActions(list) => {
                    let reason = if is_miss {
                        PacketInReason::TableMiss
                    } else {
                        PacketInReason::ApplyAction
                    };
                    actions::execute_list(dp, slot, list, cookie, reason);
                }
                Instruction::ClearActions => {
                    if let Some(pkt) = slot.as_mut() {
                        pkt.action_set.clear_actions();
                    }
                }
                Instruction::WriteActions(list) => {
                    if let Some(pkt) = slot.as_mut() {
                        pkt.action_set.write_actions(list);
                    }
                }
                Instruction::WriteMetadata { metadata, mask } => {
                    if let Some(pkt) = slot.as_mut() {
                        pkt.handle.validate();
                        pkt.handle.fields.write_metadata(*metadata, *mask);
                        trace!("executing write metadata: {metadata:#x}/{mask:#x}");
                    }
                }
                Instruction::GotoTable { table_id } => {
                    // validated at flow-mod time to target a strictly later table
                    *next_table = Some(*table_id);
                }
                Instruction::Experimenter { exp_id, data } => match self.exp_hook {
                    Some(hook) => {
                        if let Some(pkt) = slot.as_mut() {
                            hook(dp, pkt, *exp_id, data);
                        }
                    }
                    None => debug!("experimenter instruction {exp_id} has no handler"),
                },
            }
        }
    }
}
