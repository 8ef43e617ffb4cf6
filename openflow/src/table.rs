// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Per-table records: statistics, description, features.

use bitflags::bitflags;

bitflags! {
    /// Per-table configuration flags (`OFPTC_*`).
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
    pub struct TableConfig: u32 {
        /// The table may evict entries on its own.
        const EVICTION = 0b0000_0100;
        /// The table generates vacancy events.
        const VACANCY_EVENTS = 0b0000_1000;
    }
}

/// Per-table counters, as reported by the table-stats multipart reply.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct TableStats {
    /// Table id.
    pub table_id: u8,
    /// Number of live entries.
    pub active_count: u32,
    /// Packets looked up in the table.
    pub lookup_count: u64,
    /// Packets that hit an entry.
    pub matched_count: u64,
}

/// The vacancy property of a table description.
///
/// `vacancy` is the free-slot percentage; the `down`/`up` thresholds drive
/// vacancy-event generation and `down_set` records whether the down event is
/// currently armed-off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct VacancyProp {
    /// Threshold (percent free) below which a vacancy-down event fires.
    pub vacancy_down: u8,
    /// Threshold (percent free) above which a vacancy-up event fires.
    pub vacancy_up: u8,
    /// Current free-slot percentage.
    pub vacancy: u8,
    /// True while the vacancy sits at or above `vacancy_up`.
    pub down_set: bool,
}

/// A typed property of a table description.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub enum TableProperty {
    /// Vacancy thresholds and current occupancy.
    Vacancy(VacancyProp),
    /// Eviction policy flags.
    Eviction {
        /// Eviction policy bits.
        flags: u32,
    },
}

/// A table description, as reported by the table-desc multipart reply and
/// edited by table-mod.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TableDesc {
    /// Table id.
    pub table_id: u8,
    /// Configuration flags.
    pub config: TableConfig,
    /// Property list.
    pub properties: Vec<TableProperty>,
}

impl TableDesc {
    /// Description of a fresh, empty table.
    #[must_use]
    pub fn new(table_id: u8) -> Self {
        Self {
            table_id,
            config: TableConfig::empty(),
            properties: vec![TableProperty::Vacancy(VacancyProp {
                vacancy: 100,
                ..VacancyProp::default()
            })],
        }
    }

    /// The vacancy property, if the description carries one.
    #[must_use]
    pub fn vacancy(&self) -> Option<&VacancyProp> {
        self.properties.iter().find_map(|p| match p {
            TableProperty::Vacancy(v) => Some(v),
            TableProperty::Eviction { .. } => None,
        })
    }

    /// Mutable access to the vacancy property.
    pub fn vacancy_mut(&mut self) -> Option<&mut VacancyProp> {
        self.properties.iter_mut().find_map(|p| match p {
            TableProperty::Vacancy(v) => Some(v),
            TableProperty::Eviction { .. } => None,
        })
    }
}

/// A table features record, as reported (and overwritten) by the
/// table-features multipart exchange.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TableFeatures {
    /// Table id.
    pub table_id: u8,
    /// Human-readable table name.
    pub name: String,
    /// Bits of metadata the table can match on.
    pub metadata_match: u64,
    /// Bits of metadata the table can write.
    pub metadata_write: u64,
    /// Configuration flags mirror.
    pub config: TableConfig,
    /// Entry capacity.
    pub max_entries: u32,
}

impl TableFeatures {
    /// Features of a fresh table with the given capacity.
    #[must_use]
    pub fn new(table_id: u8, max_entries: u32) -> Self {
        Self {
            table_id,
            name: format!("table{table_id}"),
            metadata_match: u64::MAX,
            metadata_write: u64::MAX,
            config: TableConfig::empty(),
            max_entries,
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fresh_desc_is_fully_vacant() {
        let desc = TableDesc::new(7);
        let vac = desc.vacancy().unwrap();
        assert_eq!(vac.vacancy, 100);
        assert!(!vac.down_set);
    }

    #[test]
    fn vacancy_mut_reaches_the_same_property() {
        let mut desc = TableDesc::new(0);
        desc.vacancy_mut().unwrap().vacancy_up = 80;
        assert_eq!(desc.vacancy().unwrap().vacancy_up, 80);
    }
}
