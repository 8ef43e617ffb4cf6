// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Per-connection controller state the pipeline needs: the role and the
//! multipart reassembly slot.
//!
//! The connection manager owns the sockets and framing; it lends the pipeline
//! a [`Sender`] per incoming request.

use openflow::config::ControllerRole;
use openflow::table::TableFeatures;
use std::time::Instant;

/// An in-flight fragmented multipart request.
///
/// At most one per connection; all fragments must share the transaction id.
/// `last_seen` exists for an external janitor to sweep abandoned buffers; the
/// pipeline itself never expires them.
#[derive(Debug)]
pub struct Reassembly {
    /// Transaction id shared by all fragments.
    pub xid: u32,
    /// Table-features entries accumulated so far.
    pub tables: Vec<TableFeatures>,
    /// When the last fragment arrived.
    pub last_seen: Instant,
}

impl Reassembly {
    /// Start a reassembly buffer for transaction `xid`.
    #[must_use]
    pub fn new(xid: u32) -> Self {
        Self {
            xid,
            tables: Vec::new(),
            last_seen: Instant::now(),
        }
    }

    /// Fold one fragment's entries in and refresh the activity stamp.
    pub fn merge(&mut self, tables: Vec<TableFeatures>) {
        self.tables.extend(tables);
        self.last_seen = Instant::now();
    }
}

/// One controller connection as the pipeline sees it.
#[derive(Debug, Default)]
pub struct Remote {
    /// The role this controller holds.
    pub role: ControllerRole,
    /// Pending fragmented request, if any.
    pub reassembly: Option<Reassembly>,
}

impl Remote {
    /// A fresh connection with the default (equal) role.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A connection holding `role`.
    #[must_use]
    pub fn with_role(role: ControllerRole) -> Self {
        Self {
            role,
            reassembly: None,
        }
    }
}

/// The sender of one request: the connection plus the request's transaction
/// id.
#[derive(Debug)]
pub struct Sender<'a> {
    /// The connection the request arrived on.
    pub remote: &'a mut Remote,
    /// Transaction id of the request.
    pub xid: u32,
}

impl<'a> Sender<'a> {
    /// Wrap a connection and transaction id.
    pub fn new(remote: &'a mut Remote, xid: u32) -> Self {
        Self { remote, xid }
    }
}
