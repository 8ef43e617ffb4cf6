// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The OpenFlow error codes surfaced by the datapath pipeline.
//!
//! Each variant corresponds to one `(error type, error code)` pair of the
//! OpenFlow 1.3 error message; `wire_codes` recovers the numeric pair when an
//! error reply has to be serialized.

use thiserror::Error;

/// An OpenFlow protocol error, returned up-stack to the connection manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OflError {
    /// A slave controller issued a mutating request.
    #[error("sender holds the slave role")]
    IsSlave,

    /// A multipart fragment arrived with a transaction id different from the
    /// pending reassembly buffer's.
    #[error("multipart reassembly buffer already holds another transaction")]
    MultipartBufferOverflow,

    /// Flow-mod named a table that cannot take this command.
    #[error("bad flow-mod table id")]
    BadTableId,

    /// A goto-table instruction does not target a strictly later table.
    #[error("goto-table target is not a later table")]
    BadGotoTable,

    /// The IPv4 destination mask in a longest-prefix-match table is not a
    /// contiguous prefix.
    #[error("ipv4 destination mask is not a contiguous prefix")]
    BadNwAddrMask,

    /// The priority of a longest-prefix-match entry does not equal the
    /// prefix length.
    #[error("priority does not encode the prefix length")]
    BadPriority,

    /// Vacancy thresholds are inverted (`vacancy_down > vacancy_up`).
    #[error("vacancy thresholds are inverted")]
    BadVacancyArgument,

    /// An output action names a port the datapath does not have.
    #[error("unknown output port {0}")]
    BadOutPort(u32),

    /// A group action names a group the datapath does not have.
    #[error("unknown group {0}")]
    BadOutGroup(u32),

    /// A set-field action is masked or violates the prerequisites of the
    /// flow match it rides with.
    #[error("set-field action violates match prerequisites")]
    BadSetArgument,

    /// The target flow table has no free slot.
    #[error("flow table is full")]
    TableFull,
}

impl OflError {
    /// The `(error type, error code)` pair of the OpenFlow error message.
    #[must_use]
    pub fn wire_codes(&self) -> (u16, u16) {
        match self {
            OflError::IsSlave => (1, 10),
            OflError::MultipartBufferOverflow => (1, 13),
            OflError::BadGotoTable => (3, 3),
            OflError::BadOutPort(_) => (2, 4),
            OflError::BadOutGroup(_) => (2, 9),
            OflError::BadSetArgument => (2, 15),
            OflError::BadNwAddrMask => (4, 6),
            OflError::TableFull => (5, 1),
            OflError::BadTableId => (5, 2),
            OflError::BadPriority => (5, 8),
            OflError::BadVacancyArgument => (13, 5),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn flow_mod_errors_share_the_flow_mod_failed_type() {
        assert_eq!(OflError::TableFull.wire_codes().0, 5);
        assert_eq!(OflError::BadTableId.wire_codes().0, 5);
        assert_eq!(OflError::BadPriority.wire_codes().0, 5);
    }

    #[test]
    fn bad_request_errors() {
        assert_eq!(OflError::IsSlave.wire_codes(), (1, 10));
        assert_eq!(OflError::MultipartBufferOverflow.wire_codes(), (1, 13));
    }
}
