// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! One flow table: entry arena, priority-ordered lookup, flow-mod mutation,
//! statistics and timeout eviction.

use crate::entry::{EntryId, FlowEntry};
use crate::FLOW_TABLE_MAX_ENTRIES;
use openflow::error::OflError;
use openflow::message::{AggregateStats, FlowMod, FlowModCommand, FlowStats, FlowStatsRequest};
use openflow::oxm::{FieldValues, Match};
use openflow::table::{TableDesc, TableFeatures, TableStats};
use std::time::Instant;
use tracing::{debug, trace};

/// What a flow-mod did to the table.
///
/// `entry` is the entry produced by an add (the pipeline uses it to wire the
/// 62↔63 synchronization links). `unlinked_peers` are the sibling peers of
/// entries this mutation removed; they live in the *other* table of the
/// synchronized pair and the pipeline must null their link.
#[derive(Debug, Default)]
pub struct FlowModEffect {
    /// Entry produced by an add command.
    pub entry: Option<EntryId>,
    /// Sibling peers of removed entries, to be unlinked by the caller.
    pub unlinked_peers: Vec<EntryId>,
}

/// A single flow table.
#[derive(Debug)]
pub struct FlowTable {
    arena: Vec<Option<FlowEntry>>,
    free: Vec<usize>,
    /// Lookup order: priority descending, insertion order within a priority.
    order: Vec<EntryId>,
    /// Per-table counters.
    pub stats: TableStats,
    /// Mutable description (config flags, vacancy property).
    pub desc: TableDesc,
    /// Current features record.
    pub features: TableFeatures,
    /// Features snapshot taken by the save operation.
    pub saved_features: TableFeatures,
}

impl FlowTable {
    /// Create the empty table `table_id`.
    #[must_use]
    pub fn new(table_id: u8) -> Self {
        #[allow(clippy::cast_possible_truncation)] // max entries fits u32
        let features = TableFeatures::new(table_id, FLOW_TABLE_MAX_ENTRIES as u32);
        Self {
            arena: Vec::new(),
            free: Vec::new(),
            order: Vec::new(),
            stats: TableStats {
                table_id,
                ..TableStats::default()
            },
            desc: TableDesc::new(table_id),
            saved_features: features.clone(),
            features,
        }
    }

    /// The table id.
    #[must_use]
    pub fn table_id(&self) -> u8 {
        self.stats.table_id
    }

    /// Percentage of free entry slots, the basis of the vacancy property.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // result is within 0..=100
    pub fn free_percent(&self) -> u8 {
        ((FLOW_TABLE_MAX_ENTRIES - self.stats.active_count as usize) * 100
            / FLOW_TABLE_MAX_ENTRIES) as u8
    }

    /// Entry ids in lookup order (priority descending).
    #[must_use]
    pub fn entry_ids(&self) -> &[EntryId] {
        &self.order
    }

    /// Borrow an entry by id.
    #[must_use]
    pub fn entry(&self, id: EntryId) -> Option<&FlowEntry> {
        self.arena.get(id.slot()).and_then(Option::as_ref)
    }

    /// Mutably borrow an entry by id.
    pub fn entry_mut(&mut self, id: EntryId) -> Option<&mut FlowEntry> {
        self.arena.get_mut(id.slot()).and_then(Option::as_mut)
    }

    /// Null the synchronization links of `id`, if the entry still exists.
    pub fn clear_sync_link(&mut self, id: EntryId) {
        if let Some(entry) = self.entry_mut(id) {
            entry.sync_master = None;
            entry.sync_slave = None;
        }
    }

    /// Find the highest-priority entry matching the packet's fields.
    ///
    /// Bumps the table lookup counter, and on a hit the match counter and the
    /// entry's own packet/byte counters.
    pub fn lookup(&mut self, fields: &FieldValues, bytes: u64) -> Option<EntryId> {
        self.stats.lookup_count += 1;
        let hit = self
            .order
            .iter()
            .copied()
            .find(|id| {
                self.entry(*id)
                    .is_some_and(|e| e.match_fields.matches(fields))
            })?;
        self.stats.matched_count += 1;
        if let Some(entry) = self.entry_mut(hit) {
            entry.packet_count += 1;
            entry.byte_count += bytes;
            entry.last_used = Instant::now();
        }
        trace!(
            "table {}: lookup hit entry {hit} ({bytes} bytes)",
            self.stats.table_id
        );
        Some(hit)
    }

    /// Apply a flow-mod to this table.
    ///
    /// The message's match and instruction list move into the table on add;
    /// modify clones the instructions into every selected entry; delete
    /// honors the cookie / out-port / out-group filters.
    pub fn flow_mod(&mut self, msg: FlowMod) -> Result<FlowModEffect, OflError> {
        match msg.command {
            FlowModCommand::Add => self.add(msg),
            FlowModCommand::Modify | FlowModCommand::ModifyStrict => {
                let strict = msg.command == FlowModCommand::ModifyStrict;
                Ok(self.modify(&msg, strict))
            }
            FlowModCommand::Delete | FlowModCommand::DeleteStrict => {
                let strict = msg.command == FlowModCommand::DeleteStrict;
                Ok(self.delete(&msg, strict))
            }
        }
    }

    fn add(&mut self, msg: FlowMod) -> Result<FlowModEffect, OflError> {
        let now = Instant::now();
        let mut effect = FlowModEffect::default();

        // An identical (priority, match) replaces the old entry in place.
        if let Some(id) = self.find_identical(&msg.match_fields, msg.priority) {
            let replacement = FlowEntry::from_flow_mod(msg, now);
            if let Some(slot) = self.arena.get_mut(id.slot()) {
                if let Some(old) = slot.replace(replacement) {
                    effect.unlinked_peers.extend(old.sync_master);
                    effect.unlinked_peers.extend(old.sync_slave);
                }
            }
            debug!("table {}: replaced entry {id}", self.stats.table_id);
            effect.entry = Some(id);
            return Ok(effect);
        }

        if self.stats.active_count as usize >= FLOW_TABLE_MAX_ENTRIES {
            return Err(OflError::TableFull);
        }

        let entry = FlowEntry::from_flow_mod(msg, now);
        let priority = entry.priority;
        let id = match self.free.pop() {
            Some(slot) => {
                #[allow(clippy::cast_possible_truncation)] // arena is bounded
                let id = EntryId(slot as u32);
                self.arena[slot] = Some(entry);
                id
            }
            None => {
                #[allow(clippy::cast_possible_truncation)] // arena is bounded
                let id = EntryId(self.arena.len() as u32);
                self.arena.push(Some(entry));
                id
            }
        };

        // Keep the order sorted by priority, first-added winning ties.
        let pos = self.order.partition_point(|other| {
            self.entry(*other).is_some_and(|e| e.priority >= priority)
        });
        self.order.insert(pos, id);
        self.stats.active_count += 1;
        debug!(
            "table {}: added entry {id} prio {priority}",
            self.stats.table_id
        );
        effect.entry = Some(id);
        Ok(effect)
    }

    fn modify(&mut self, msg: &FlowMod, strict: bool) -> FlowModEffect {
        let selected: Vec<EntryId> = self
            .order
            .iter()
            .copied()
            .filter(|id| {
                self.entry(*id)
                    .is_some_and(|e| Self::selects(e, msg, strict, false))
            })
            .collect();
        for id in selected {
            if let Some(entry) = self.entry_mut(id) {
                entry.instructions = msg.instructions.clone();
                entry.cookie = msg.cookie;
            }
        }
        FlowModEffect::default()
    }

    fn delete(&mut self, msg: &FlowMod, strict: bool) -> FlowModEffect {
        let mut effect = FlowModEffect::default();
        let doomed: Vec<EntryId> = self
            .order
            .iter()
            .copied()
            .filter(|id| {
                self.entry(*id)
                    .is_some_and(|e| Self::selects(e, msg, strict, true))
            })
            .collect();
        for id in doomed {
            self.remove(id, &mut effect.unlinked_peers);
        }
        effect
    }

    fn remove(&mut self, id: EntryId, unlinked: &mut Vec<EntryId>) {
        let Some(slot) = self.arena.get_mut(id.slot()) else {
            return;
        };
        let Some(old) = slot.take() else {
            return;
        };
        unlinked.extend(old.sync_master);
        unlinked.extend(old.sync_slave);
        self.free.push(id.slot());
        self.order.retain(|other| *other != id);
        self.stats.active_count -= 1;
        debug!("table {}: removed entry {id}", self.stats.table_id);
    }

    /// Selection rule shared by modify, delete and the stats reads: cookie
    /// filter, strict or subsuming match compare, and (for deletes and stats)
    /// the out-port / out-group forwarding filters.
    fn selects(entry: &FlowEntry, msg: &FlowMod, strict: bool, out_filters: bool) -> bool {
        if msg.cookie_mask != 0 && (entry.cookie & msg.cookie_mask) != (msg.cookie & msg.cookie_mask)
        {
            return false;
        }
        if out_filters
            && !(entry.forwards_to_port(msg.out_port) && entry.forwards_to_group(msg.out_group))
        {
            return false;
        }
        if strict {
            entry.priority == msg.priority && entry.match_fields == msg.match_fields
        } else {
            Self::subsumes(&msg.match_fields, &entry.match_fields)
        }
    }

    /// True iff `wide` selects `narrow`: every field `wide` names must be
    /// present in `narrow` and agree under `wide`'s mask. An empty `wide`
    /// selects everything.
    fn subsumes(wide: &Match, narrow: &Match) -> bool {
        wide.iter().all(|tlv| {
            narrow
                .get(tlv.field)
                .is_some_and(|have| have.value.masked_eq(&tlv.value, tlv.mask.as_ref()))
        })
    }

    fn find_identical(&self, match_fields: &Match, priority: u16) -> Option<EntryId> {
        self.order.iter().copied().find(|id| {
            self.entry(*id)
                .is_some_and(|e| e.priority == priority && e.match_fields == *match_fields)
        })
    }

    /// Append the stats of entries selected by `req` to `out`.
    pub fn flow_stats(&self, req: &FlowStatsRequest, out: &mut Vec<FlowStats>) {
        for entry in self.selected_by(req) {
            out.push(FlowStats {
                table_id: self.stats.table_id,
                priority: entry.priority,
                idle_timeout: entry.idle_timeout,
                hard_timeout: entry.hard_timeout,
                cookie: entry.cookie,
                packet_count: entry.packet_count,
                byte_count: entry.byte_count,
                match_fields: entry.match_fields.clone(),
                instructions: entry.instructions.clone(),
            });
        }
    }

    /// Fold the counters of entries selected by `req` into `acc`.
    pub fn aggregate_stats(&self, req: &FlowStatsRequest, acc: &mut AggregateStats) {
        for entry in self.selected_by(req) {
            acc.packet_count += entry.packet_count;
            acc.byte_count += entry.byte_count;
            acc.flow_count += 1;
        }
    }

    fn selected_by<'a>(
        &'a self,
        req: &'a FlowStatsRequest,
    ) -> impl Iterator<Item = &'a FlowEntry> {
        self.order.iter().filter_map(|id| self.entry(*id)).filter(|entry| {
            if req.cookie_mask != 0
                && (entry.cookie & req.cookie_mask) != (req.cookie & req.cookie_mask)
            {
                return false;
            }
            entry.forwards_to_port(req.out_port)
                && entry.forwards_to_group(req.out_group)
                && Self::subsumes(&req.match_fields, &entry.match_fields)
        })
    }

    /// Evict entries whose idle or hard timeout has elapsed. Returns the
    /// sibling peers of evicted entries, to be unlinked by the caller.
    pub fn timeout(&mut self, now: Instant) -> Vec<EntryId> {
        let expired: Vec<EntryId> = self
            .order
            .iter()
            .copied()
            .filter(|id| self.entry(*id).is_some_and(|e| e.is_expired(now)))
            .collect();
        let mut unlinked = Vec::new();
        for id in expired {
            debug!("table {}: entry {id} timed out", self.stats.table_id);
            self.remove(id, &mut unlinked);
        }
        unlinked
    }
}
