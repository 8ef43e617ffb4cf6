// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The table-mod handler and the features save/restore pair.

use crate::pipeline::Pipeline;
use datapath::Sender;
use flowtable::PIPELINE_TABLES;
use openflow::config::ControllerRole;
use openflow::error::OflError;
use openflow::message::{TableMod, TableModProp, ALL_TABLES};
use tracing::debug;

impl Pipeline {
    /// Apply a table-mod to one table or, with the `0xff` sentinel, to all of
    /// them.
    ///
    /// Property updates are validated before any table is touched; the
    /// vacancy thresholds are then copied into each targeted table's
    /// description, the down-event arming state is re-derived from the
    /// current occupancy, and the config flags are written last.
    pub fn handle_table_mod(&mut self, msg: &TableMod, sender: &Sender<'_>) -> Result<(), OflError> {
        if sender.remote.role == ControllerRole::Slave {
            return Err(OflError::IsSlave);
        }

        for prop in &msg.properties {
            let TableModProp::Vacancy {
                vacancy_down,
                vacancy_up,
            } = prop;
            if vacancy_down > vacancy_up {
                return Err(OflError::BadVacancyArgument);
            }
        }

        let range = if msg.table_id == ALL_TABLES {
            0..PIPELINE_TABLES
        } else {
            let idx = usize::from(msg.table_id);
            if idx >= PIPELINE_TABLES {
                return Err(OflError::BadTableId);
            }
            idx..idx + 1
        };

        for table in &mut self.tables[range] {
            for prop in &msg.properties {
                let TableModProp::Vacancy {
                    vacancy_down,
                    vacancy_up,
                } = prop;
                let id = table.table_id();
                let free = table.free_percent();
                if let Some(vac) = table.desc.vacancy_mut() {
                    vac.vacancy_down = *vacancy_down;
                    vac.vacancy_up = *vacancy_up;
                    vac.down_set = free >= *vacancy_up;
                    debug!(
                        "table {id}: vacancy thresholds {vacancy_down}/{vacancy_up}, down_set {}",
                        vac.down_set
                    );
                }
            }
            table.desc.config = msg.config;
        }

        Ok(())
    }

    /// Snapshot every table's features config, so a tentative change can be
    /// rolled back with [`Pipeline::features_restore`].
    pub fn features_save(&mut self) {
        for table in &mut self.tables {
            table.saved_features.config = table.features.config;
        }
    }

    /// Roll every table's features config back to the saved snapshot.
    pub fn features_restore(&mut self) {
        for table in &mut self.tables {
            table.features.config = table.saved_features.config;
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::dp;
    use datapath::{Remote, Sender};
    use openflow::table::TableConfig;

    fn table_mod(table_id: u8, config: TableConfig, properties: Vec<TableModProp>) -> TableMod {
        TableMod {
            table_id,
            config,
            properties,
        }
    }

    #[test]
    fn slave_role_is_rejected() {
        let mut pl = Pipeline::new();
        let _dp = dp();
        let mut remote = Remote::with_role(ControllerRole::Slave);
        let sender = Sender::new(&mut remote, 1);

        let msg = table_mod(0, TableConfig::VACANCY_EVENTS, vec![]);
        assert_eq!(pl.handle_table_mod(&msg, &sender), Err(OflError::IsSlave));
        assert!(pl.table(0).unwrap().desc.config.is_empty());
    }

    #[test]
    fn inverted_thresholds_fail_before_any_mutation() {
        let mut pl = Pipeline::new();
        let mut remote = Remote::new();
        let sender = Sender::new(&mut remote, 1);

        let msg = table_mod(
            ALL_TABLES,
            TableConfig::VACANCY_EVENTS,
            vec![TableModProp::Vacancy {
                vacancy_down: 50,
                vacancy_up: 20,
            }],
        );
        assert_eq!(
            pl.handle_table_mod(&msg, &sender),
            Err(OflError::BadVacancyArgument)
        );
        // nothing was written anywhere
        for table in pl.tables() {
            assert!(table.desc.config.is_empty());
            assert_eq!(table.desc.vacancy().unwrap().vacancy_up, 0);
        }
    }

    #[test]
    fn vacancy_thresholds_are_copied_and_armed() {
        let mut pl = Pipeline::new();
        let mut remote = Remote::new();
        let sender = Sender::new(&mut remote, 1);

        let msg = table_mod(
            3,
            TableConfig::VACANCY_EVENTS,
            vec![TableModProp::Vacancy {
                vacancy_down: 10,
                vacancy_up: 80,
            }],
        );
        pl.handle_table_mod(&msg, &sender).unwrap();

        let desc = &pl.table(3).unwrap().desc;
        assert_eq!(desc.config, TableConfig::VACANCY_EVENTS);
        let vac = desc.vacancy().unwrap();
        assert_eq!(vac.vacancy_down, 10);
        assert_eq!(vac.vacancy_up, 80);
        // an empty table sits at 100% free, at or above the up threshold
        assert!(vac.down_set);
        // other tables untouched
        assert!(pl.table(4).unwrap().desc.config.is_empty());
    }

    #[test]
    fn down_set_clears_when_occupancy_is_high() {
        let mut pl = Pipeline::new();
        let mut remote = Remote::new();
        let sender = Sender::new(&mut remote, 1);

        // half-full table: 50% free, below an up threshold of 80
        #[allow(clippy::cast_possible_truncation)]
        {
            pl.table_mut(2).unwrap().stats.active_count =
                (flowtable::FLOW_TABLE_MAX_ENTRIES / 2) as u32;
        }
        let msg = table_mod(
            2,
            TableConfig::VACANCY_EVENTS,
            vec![TableModProp::Vacancy {
                vacancy_down: 10,
                vacancy_up: 80,
            }],
        );
        pl.handle_table_mod(&msg, &sender).unwrap();
        assert!(!pl.table(2).unwrap().desc.vacancy().unwrap().down_set);
    }

    #[test]
    fn all_tables_sentinel_reaches_every_table() {
        let mut pl = Pipeline::new();
        let mut remote = Remote::new();
        let sender = Sender::new(&mut remote, 1);

        let msg = table_mod(ALL_TABLES, TableConfig::EVICTION, vec![]);
        pl.handle_table_mod(&msg, &sender).unwrap();
        for table in pl.tables() {
            assert_eq!(table.desc.config, TableConfig::EVICTION);
        }
    }

    #[test]
    fn features_save_and_restore_bracket_a_change() {
        let mut pl = Pipeline::new();

        pl.table_mut(5).unwrap().features.config = TableConfig::VACANCY_EVENTS;
        pl.features_save();
        pl.table_mut(5).unwrap().features.config = TableConfig::EVICTION;
        pl.features_restore();

        assert_eq!(
            pl.table(5).unwrap().features.config,
            TableConfig::VACANCY_EVENTS
        );
    }
}
