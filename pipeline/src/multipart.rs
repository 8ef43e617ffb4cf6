// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The multipart read protocols: flow / table / aggregate stats, table
//! features (with fragmented-request reassembly), and table descriptions.

use crate::pipeline::Pipeline;
use datapath::{Datapath, Reassembly, Sender};
use flowtable::PIPELINE_TABLES;
use openflow::error::OflError;
use openflow::message::{
    AggregateStats, FlowStatsRequest, Message, MultipartReply, MultipartReplyBody,
    MultipartRequest, MultipartRequestBody, ReplyFlags, RequestFlags, ALL_TABLES,
};
use openflow::table::{TableConfig, TableDesc, TableFeatures, TableStats};
use tracing::{debug, error, warn};

/// Tables per table-features reply fragment. `PIPELINE_TABLES` is a multiple
/// of this, so the chain always divides evenly.
const FEATURES_GROUP: usize = 8;

/// Tables per table-desc reply fragment.
const DESC_GROUP: usize = 16;

impl Pipeline {
    /// Dispatch a multipart request and emit its reply fragment(s).
    ///
    /// Replies for one request are emitted contiguously and in order; the
    /// connection manager forwards them before the sender's next request is
    /// processed.
    pub fn handle_multipart_request(
        &mut self,
        dp: &mut Datapath,
        req: MultipartRequest,
        sender: &mut Sender<'_>,
    ) -> Result<(), OflError> {
        match req.body {
            MultipartRequestBody::Flow(body) => self.flow_stats_request(dp, &body),
            MultipartRequestBody::Table => self.table_stats_request(dp),
            MultipartRequestBody::Aggregate(body) => self.aggregate_stats_request(dp, &body),
            MultipartRequestBody::TableFeatures(tables) => {
                self.table_features_request(dp, sender, req.flags, tables)
            }
            MultipartRequestBody::TableDesc => self.table_desc_request(dp),
        }
    }

    fn flow_stats_request(
        &self,
        dp: &mut Datapath,
        req: &FlowStatsRequest,
    ) -> Result<(), OflError> {
        let mut stats = Vec::new();
        if req.table_id == ALL_TABLES {
            for table in &self.tables {
                table.flow_stats(req, &mut stats);
            }
        } else {
            let idx = usize::from(req.table_id);
            if idx >= PIPELINE_TABLES {
                return Err(OflError::BadTableId);
            }
            self.tables[idx].flow_stats(req, &mut stats);
        }
        dp.send_message(Message::MultipartReply(MultipartReply {
            flags: ReplyFlags::empty(),
            body: MultipartReplyBody::Flow(stats),
        }));
        Ok(())
    }

    fn table_stats_request(&self, dp: &mut Datapath) -> Result<(), OflError> {
        let stats: Vec<TableStats> = self.tables.iter().map(|t| t.stats.clone()).collect();
        dp.send_message(Message::MultipartReply(MultipartReply {
            flags: ReplyFlags::empty(),
            body: MultipartReplyBody::Table(stats),
        }));
        Ok(())
    }

    fn aggregate_stats_request(
        &self,
        dp: &mut Datapath,
        req: &FlowStatsRequest,
    ) -> Result<(), OflError> {
        let mut acc = AggregateStats::default();
        if req.table_id == ALL_TABLES {
            for table in &self.tables {
                table.aggregate_stats(req, &mut acc);
            }
        } else {
            let idx = usize::from(req.table_id);
            if idx >= PIPELINE_TABLES {
                return Err(OflError::BadTableId);
            }
            self.tables[idx].aggregate_stats(req, &mut acc);
        }
        dp.send_message(Message::MultipartReply(MultipartReply {
            flags: ReplyFlags::empty(),
            body: MultipartReplyBody::Aggregate(acc),
        }));
        Ok(())
    }

    /// Table features: reassemble a possibly fragmented request, write any
    /// features it carries, and reply with the whole chain in groups of
    /// eight tables.
    fn table_features_request(
        &mut self,
        dp: &mut Datapath,
        sender: &mut Sender<'_>,
        flags: RequestFlags,
        body: Vec<TableFeatures>,
    ) -> Result<(), OflError> {
        let complete: Vec<TableFeatures>;
        if let Some(pending) = sender.remote.reassembly.as_mut() {
            // fragments of one request share their transaction id
            if sender.xid != pending.xid {
                error!(
                    "multipart request: wrong xid ({:#x} != {:#x})",
                    sender.xid, pending.xid
                );
                // one pending request per connection; a second one overflows
                return Err(OflError::MultipartBufferOverflow);
            }
            debug!(
                "multipart request: merging with previous fragments ({}+{})",
                pending.tables.len(),
                body.len()
            );
            pending.merge(body);
            if flags.contains(RequestFlags::REQ_MORE) {
                return Ok(());
            }
            let Some(pending) = sender.remote.reassembly.take() else {
                return Ok(());
            };
            debug!(
                "multipart request: reassembly complete ({})",
                pending.tables.len()
            );
            complete = pending.tables;
        } else if flags.contains(RequestFlags::REQ_MORE) {
            debug!(
                "multipart request: create reassembly buffer ({})",
                body.len()
            );
            let mut pending = Reassembly::new(sender.xid);
            pending.merge(body);
            sender.remote.reassembly = Some(pending);
            return Ok(());
        } else {
            debug!("multipart request: non-fragmented request ({})", body.len());
            complete = body;
        }

        if !complete.is_empty() {
            // tables absent from the request keep their current features
            debug!("table features request: updating features");
            for features in complete {
                let idx = usize::from(features.table_id);
                if idx < PIPELINE_TABLES {
                    self.tables[idx].features = features;
                } else {
                    warn!("table features for unknown table {idx} ignored");
                }
            }
        }

        let groups = PIPELINE_TABLES / FEATURES_GROUP;
        for (i, chunk) in self.tables.chunks(FEATURES_GROUP).enumerate() {
            let features: Vec<TableFeatures> = chunk.iter().map(|t| t.features.clone()).collect();
            let flags = if i + 1 == groups {
                ReplyFlags::empty()
            } else {
                ReplyFlags::REPLY_MORE
            };
            dp.send_message(Message::MultipartReply(MultipartReply {
                flags,
                body: MultipartReplyBody::TableFeatures(features),
            }));
        }
        Ok(())
    }

    /// Table descriptions, in groups of sixteen tables, with the vacancy
    /// percentage refreshed for tables that generate vacancy events.
    fn table_desc_request(&mut self, dp: &mut Datapath) -> Result<(), OflError> {
        let groups = PIPELINE_TABLES.div_ceil(DESC_GROUP);
        for (group, chunk) in self.tables.chunks_mut(DESC_GROUP).enumerate() {
            let mut descs: Vec<TableDesc> = Vec::with_capacity(chunk.len());
            for table in chunk {
                if table.desc.config.contains(TableConfig::VACANCY_EVENTS) {
                    let free = table.free_percent();
                    if let Some(vac) = table.desc.vacancy_mut() {
                        vac.vacancy = free;
                    }
                }
                descs.push(table.desc.clone());
            }
            let flags = if group + 1 == groups {
                ReplyFlags::empty()
            } else {
                ReplyFlags::REPLY_MORE
            };
            dp.send_message(Message::MultipartReply(MultipartReply {
                flags,
                body: MultipartReplyBody::TableDesc(descs),
            }));
        }
        Ok(())
    }
}
