// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Controller-facing messages handled and emitted by the pipeline.

use crate::action::{GROUP_ANY, PortNo};
use crate::instruction::Instruction;
use crate::oxm::Match;
use crate::table::{TableConfig, TableDesc, TableFeatures, TableStats};
use bitflags::bitflags;
use derive_builder::Builder;

/// Command-level sentinel meaning "all tables".
///
/// Never a storage index; table array indices are dense `0..PIPELINE_TABLES`.
pub const ALL_TABLES: u8 = 0xff;

/// The flow-mod command.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum FlowModCommand {
    /// Insert a new entry.
    #[default]
    Add,
    /// Update instructions of matching entries.
    Modify,
    /// Update instructions of the entry with identical match and priority.
    ModifyStrict,
    /// Remove matching entries.
    Delete,
    /// Remove the entry with identical match and priority.
    DeleteStrict,
}

impl FlowModCommand {
    /// True for the two delete commands.
    #[must_use]
    pub fn is_delete(&self) -> bool {
        matches!(self, FlowModCommand::Delete | FlowModCommand::DeleteStrict)
    }
}

/// A flow-mod message.
#[derive(Debug, Clone, Builder)]
#[builder(default)]
pub struct FlowMod {
    /// Target table, or [`ALL_TABLES`] (delete only).
    pub table_id: u8,
    /// What to do.
    pub command: FlowModCommand,
    /// Entry priority.
    pub priority: u16,
    /// Seconds of inactivity before eviction; 0 disables.
    pub idle_timeout: u16,
    /// Seconds of lifetime before eviction; 0 disables.
    pub hard_timeout: u16,
    /// Opaque controller cookie.
    pub cookie: u64,
    /// Cookie bits considered by modify/delete filters.
    pub cookie_mask: u64,
    /// Buffered packet to re-inject after the mutation.
    pub buffer_id: Option<u32>,
    /// Delete filter: only entries forwarding to this port.
    #[builder(default = "PortNo::ANY")]
    pub out_port: PortNo,
    /// Delete filter: only entries forwarding to this group.
    #[builder(default = "GROUP_ANY")]
    pub out_group: u32,
    /// The match.
    pub match_fields: Match,
    /// The instruction list.
    pub instructions: Vec<Instruction>,
}

impl Default for FlowMod {
    fn default() -> Self {
        Self {
            table_id: 0,
            command: FlowModCommand::Add,
            priority: 0,
            idle_timeout: 0,
            hard_timeout: 0,
            cookie: 0,
            cookie_mask: 0,
            buffer_id: None,
            out_port: PortNo::ANY,
            out_group: GROUP_ANY,
            match_fields: Match::any(),
            instructions: Vec::new(),
        }
    }
}

/// A table-mod property update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableModProp {
    /// New vacancy thresholds.
    Vacancy {
        /// Percent-free threshold arming the down event.
        vacancy_down: u8,
        /// Percent-free threshold arming the up event.
        vacancy_up: u8,
    },
}

/// A table-mod message.
#[derive(Debug, Clone)]
pub struct TableMod {
    /// Target table, or [`ALL_TABLES`].
    pub table_id: u8,
    /// New configuration flags.
    pub config: TableConfig,
    /// Property updates.
    pub properties: Vec<TableModProp>,
}

bitflags! {
    /// Multipart request flags.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct RequestFlags: u16 {
        /// More fragments of this request follow.
        const REQ_MORE = 0b0000_0001;
    }
}

bitflags! {
    /// Multipart reply flags.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct ReplyFlags: u16 {
        /// More fragments of this reply follow.
        const REPLY_MORE = 0b0000_0001;
    }
}

/// The filter body shared by flow-stats and aggregate-stats requests.
#[derive(Debug, Clone)]
pub struct FlowStatsRequest {
    /// Table to read, or [`ALL_TABLES`].
    pub table_id: u8,
    /// Only entries forwarding to this port.
    pub out_port: PortNo,
    /// Only entries forwarding to this group.
    pub out_group: u32,
    /// Cookie filter value.
    pub cookie: u64,
    /// Cookie filter mask.
    pub cookie_mask: u64,
    /// Only entries matched by this match.
    pub match_fields: Match,
}

impl Default for FlowStatsRequest {
    fn default() -> Self {
        Self {
            table_id: ALL_TABLES,
            out_port: PortNo::ANY,
            out_group: GROUP_ANY,
            cookie: 0,
            cookie_mask: 0,
            match_fields: Match::any(),
        }
    }
}

/// One flow entry's statistics, as carried by the flow-stats reply.
#[derive(Debug, Clone)]
pub struct FlowStats {
    /// Table the entry lives in.
    pub table_id: u8,
    /// Entry priority.
    pub priority: u16,
    /// Idle timeout.
    pub idle_timeout: u16,
    /// Hard timeout.
    pub hard_timeout: u16,
    /// Controller cookie.
    pub cookie: u64,
    /// Packets that hit the entry.
    pub packet_count: u64,
    /// Bytes that hit the entry.
    pub byte_count: u64,
    /// The entry's match.
    pub match_fields: Match,
    /// The entry's instructions.
    pub instructions: Vec<Instruction>,
}

/// The body of a multipart request.
#[derive(Debug, Clone)]
pub enum MultipartRequestBody {
    /// Per-flow statistics.
    Flow(FlowStatsRequest),
    /// Per-table statistics.
    Table,
    /// Aggregate flow statistics.
    Aggregate(FlowStatsRequest),
    /// Table features read (empty body) or write (entries present).
    TableFeatures(Vec<TableFeatures>),
    /// Table descriptions.
    TableDesc,
}

/// A multipart request (possibly one fragment of a chain).
#[derive(Debug, Clone)]
pub struct MultipartRequest {
    /// Fragmentation flags.
    pub flags: RequestFlags,
    /// The request body.
    pub body: MultipartRequestBody,
}

/// Aggregated flow counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateStats {
    /// Total packets across matching entries.
    pub packet_count: u64,
    /// Total bytes across matching entries.
    pub byte_count: u64,
    /// Number of matching entries.
    pub flow_count: u32,
}

/// The body of a multipart reply.
#[derive(Debug, Clone)]
pub enum MultipartReplyBody {
    /// Per-flow statistics.
    Flow(Vec<FlowStats>),
    /// Per-table statistics.
    Table(Vec<TableStats>),
    /// Aggregate flow statistics.
    Aggregate(AggregateStats),
    /// Table features.
    TableFeatures(Vec<TableFeatures>),
    /// Table descriptions.
    TableDesc(Vec<TableDesc>),
}

/// A multipart reply (possibly one fragment of a chain).
#[derive(Debug, Clone)]
pub struct MultipartReply {
    /// Fragmentation flags.
    pub flags: ReplyFlags,
    /// The reply body.
    pub body: MultipartReplyBody,
}

/// Why a packet was punted to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketInReason {
    /// The packet hit a table-miss entry.
    TableMiss,
    /// An apply-actions output to the controller port.
    ApplyAction,
    /// The packet carried an invalid TTL.
    InvalidTtl,
    /// An action-set output to the controller port.
    ActionSet,
}

/// A packet-in message.
#[derive(Debug, Clone)]
pub struct PacketIn {
    /// Buffer pool id holding the full packet, if buffered.
    pub buffer_id: Option<u32>,
    /// Full length of the punted packet.
    pub total_len: usize,
    /// Why the packet was punted.
    pub reason: PacketInReason,
    /// The last table the packet visited.
    pub table_id: u8,
    /// Cookie of the flow that punted, or all-ones when unattributable.
    pub cookie: u64,
    /// The packet's parsed match fields.
    pub match_fields: Match,
    /// Packet bytes (possibly truncated to `miss_send_len`).
    pub data: Vec<u8>,
}

/// An outbound message emitted by the pipeline.
///
/// The connection manager owns routing and serialization; the pipeline only
/// enqueues these.
#[derive(Debug, Clone)]
pub enum Message {
    /// A punted packet.
    PacketIn(PacketIn),
    /// One fragment of a multipart reply.
    MultipartReply(MultipartReply),
}
