// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! # OpenFlow 1.3 protocol model
//!
//! Typed, in-memory representations of the OpenFlow 1.3 structures the
//! datapath pipeline operates on: OXM matches, actions, instructions, the
//! controller-facing messages (flow-mod, table-mod, multipart request/reply,
//! packet-in) and the per-table records (stats, description, features).
//!
//! Wire (de)serialization is out of scope for this crate; the connection
//! manager owns the framing and byte-level codecs. Everything here is the
//! already-parsed form.

#![deny(
    unsafe_code,
    missing_docs,
    clippy::all,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

pub mod action;
pub mod config;
pub mod error;
pub mod instruction;
pub mod mac;
pub mod message;
pub mod oxm;
pub mod table;

pub use action::{Action, ActionKind, PortNo};
pub use config::{ControllerRole, DpFlags, MissSendLen};
pub use error::OflError;
pub use instruction::{Instruction, InstructionKind};
pub use mac::Mac;
pub use message::{
    ALL_TABLES, AggregateStats, FlowMod, FlowModBuilder, FlowModCommand, FlowStats,
    FlowStatsRequest, Message, MultipartReply, MultipartReplyBody, MultipartRequest,
    MultipartRequestBody, PacketIn, PacketInReason, ReplyFlags, RequestFlags, TableMod,
    TableModProp,
};
pub use oxm::{FieldValues, Match, OxmField, OxmTlv, OxmValue};
pub use table::{TableConfig, TableDesc, TableFeatures, TableProperty, TableStats, VacancyProp};
