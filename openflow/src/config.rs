// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Datapath-level configuration and controller roles.

use bitflags::bitflags;

bitflags! {
    /// Datapath configuration flags (`OFPC_*`).
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct DpFlags: u16 {
        /// Punt packets with an invalid TTL to the controller instead of
        /// dropping them silently.
        const INVALID_TTL_TO_CONTROLLER = 0b0000_0100;
    }
}

/// How many bytes of a punted packet to ship to the controller.
///
/// The sentinel [`MissSendLen::NO_BUFFER`] means the complete packet is sent
/// and never parked in the buffer pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissSendLen(pub u16);

impl MissSendLen {
    /// Send everything, buffer nothing.
    pub const NO_BUFFER: MissSendLen = MissSendLen(0xffff);

    /// The protocol default (128 bytes).
    pub const DEFAULT: MissSendLen = MissSendLen(128);

    /// True when punted packets should be parked in the buffer pool.
    #[must_use]
    pub fn buffers(&self) -> bool {
        *self != Self::NO_BUFFER
    }
}

impl Default for MissSendLen {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// The role a controller connection holds on this datapath.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ControllerRole {
    /// Full access, shared with other equals.
    #[default]
    Equal,
    /// Full access, demotes other masters to slave.
    Master,
    /// Read-only access; mutating requests are refused.
    Slave,
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn miss_send_len_buffering() {
        assert!(MissSendLen::DEFAULT.buffers());
        assert!(!MissSendLen::NO_BUFFER.buffers());
    }
}
