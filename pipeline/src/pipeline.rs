// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The pipeline itself: the fixed table chain and its lifecycle.

use flowtable::{
    EntryId, FlowTable, PIPELINE_TABLES, SYNC_MASTER_TABLE, SYNC_SLAVE_TABLE,
};
use std::time::Instant;

use crate::instructions::ExperimenterHook;

/// The fixed chain of flow tables packets walk through.
///
/// Created once at datapath startup; the datapath outlives it. Table ids are
/// dense `0..PIPELINE_TABLES`; the `0xff` sentinel of the mutation protocol
/// never reaches the array.
pub struct Pipeline {
    pub(crate) tables: Vec<FlowTable>,
    pub(crate) exp_hook: Option<ExperimenterHook>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    /// Build the empty table chain.
    #[must_use]
    pub fn new() -> Self {
        #[allow(clippy::cast_possible_truncation)] // PIPELINE_TABLES fits u8
        let tables = (0..PIPELINE_TABLES).map(|id| FlowTable::new(id as u8)).collect();
        Self {
            tables,
            exp_hook: None,
        }
    }

    /// Install the handler for experimenter instructions.
    pub fn set_experimenter_hook(&mut self, hook: ExperimenterHook) {
        self.exp_hook = Some(hook);
    }

    /// Borrow a table by id.
    #[must_use]
    pub fn table(&self, table_id: u8) -> Option<&FlowTable> {
        self.tables.get(usize::from(table_id))
    }

    /// Mutably borrow a table by id.
    pub fn table_mut(&mut self, table_id: u8) -> Option<&mut FlowTable> {
        self.tables.get_mut(usize::from(table_id))
    }

    /// All tables, in id order.
    #[must_use]
    pub fn tables(&self) -> &[FlowTable] {
        &self.tables
    }

    /// Periodic tick: fan the timeout sweep out to every table and null the
    /// synchronization links of peers of evicted entries.
    pub fn timeout(&mut self, now: Instant) {
        for idx in 0..self.tables.len() {
            let unlinked = self.tables[idx].timeout(now);
            #[allow(clippy::cast_possible_truncation)] // table ids fit u8
            self.unlink_peers(idx as u8, unlinked);
        }
    }

    /// Null the synchronization link of `peers`, which live in the sibling of
    /// `table_id`. Links only ever pair tables 62 and 63.
    pub(crate) fn unlink_peers(&mut self, table_id: u8, peers: Vec<EntryId>) {
        if peers.is_empty() {
            return;
        }
        let peer_table = match table_id {
            SYNC_MASTER_TABLE => SYNC_SLAVE_TABLE,
            SYNC_SLAVE_TABLE => SYNC_MASTER_TABLE,
            _ => return,
        };
        for peer in peers {
            self.tables[usize::from(peer_table)].clear_sync_link(peer);
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::{add_flow, sibling_add};
    use openflow::oxm::Match;
    use std::time::Duration;

    #[test]
    fn pipeline_has_the_full_table_chain() {
        let pl = Pipeline::new();
        assert_eq!(pl.tables().len(), PIPELINE_TABLES);
        assert_eq!(pl.table(63).unwrap().table_id(), 63);
        assert!(pl.table(64).is_none());
    }

    #[test]
    fn timeout_fans_out_and_unlinks_siblings() {
        let mut pl = Pipeline::new();
        let (master, slave) = sibling_add(&mut pl);

        // expire the master only
        {
            let entry = pl.table_mut(62).unwrap().entry_mut(master).unwrap();
            entry.idle_timeout = 1;
            entry.last_used = Instant::now() - Duration::from_secs(5);
        }
        pl.timeout(Instant::now());

        assert!(pl.table(62).unwrap().entry(master).is_none());
        let slave_entry = pl.table(63).unwrap().entry(slave).unwrap();
        assert!(slave_entry.sync_master.is_none());
    }

    #[test]
    fn timeout_leaves_fresh_entries_alone() {
        let mut pl = Pipeline::new();
        add_flow(&mut pl, 0, 5, Match::any(), vec![]);
        pl.timeout(Instant::now());
        assert_eq!(pl.table(0).unwrap().stats.active_count, 1);
    }
}
