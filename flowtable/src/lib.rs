// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! # Flow table store
//!
//! The per-table entry store of the datapath: an arena of flow entries with a
//! priority-ordered lookup index, flow-mod mutation, statistics accumulation
//! and idle/hard timeout eviction.
//!
//! Entries are addressed by [`EntryId`] arena indices. The cross-table
//! synchronization links between tables 62 and 63 are stored as peer
//! `EntryId`s rather than owning references; the deletion paths report the
//! peers of removed entries so the pipeline can null the other side of the
//! link.

#![deny(
    unsafe_code,
    clippy::all,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

mod entry;
mod table;

pub use entry::{EntryId, FlowEntry};
pub use table::{FlowModEffect, FlowTable};

/// Number of flow tables in the pipeline.
///
/// Must stay a multiple of 8: table-features replies pack tables in groups
/// of 8 and rely on the division being exact.
pub const PIPELINE_TABLES: usize = 64;

/// Entry capacity of one flow table; also the base of the vacancy
/// percentage arithmetic.
pub const FLOW_TABLE_MAX_ENTRIES: usize = 4096;

/// The longest-prefix-match table: IPv4 destination routes whose priority
/// encodes the prefix length.
pub const LPM_TABLE: u8 = 61;

/// Master side of the synchronized table pair.
pub const SYNC_MASTER_TABLE: u8 = 62;

/// Slave side of the synchronized table pair; mirrors table 62 with the
/// Ethernet addresses transposed.
pub const SYNC_SLAVE_TABLE: u8 = 63;

const _: () = assert!(PIPELINE_TABLES % 8 == 0);
const _: () = assert!((SYNC_SLAVE_TABLE as usize) < PIPELINE_TABLES);
