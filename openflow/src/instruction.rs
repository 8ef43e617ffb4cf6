// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Flow-entry instructions and their canonical execution order.

use crate::action::Action;
use std::cmp::Ordering;

/// One instruction of a flow entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Rate-limit the packet through a meter. May drop the packet.
    Meter {
        /// Meter id.
        meter_id: u32,
    },
    /// Execute an action list immediately.
    ApplyActions(Vec<Action>),
    /// Empty the packet's action set.
    ClearActions,
    /// Merge actions into the packet's action set.
    WriteActions(Vec<Action>),
    /// Masked update of the metadata register.
    WriteMetadata {
        /// Bits to write.
        metadata: u64,
        /// Which bits to write.
        mask: u64,
    },
    /// Continue the pipeline at a later table.
    GotoTable {
        /// Target table; must be strictly greater than the entry's table.
        table_id: u8,
    },
    /// Experimenter extension instruction.
    Experimenter {
        /// Experimenter id.
        exp_id: u32,
        /// Opaque experimenter payload.
        data: Vec<u8>,
    },
}

impl Instruction {
    /// The kind discriminant of this instruction.
    #[must_use]
    pub fn kind(&self) -> InstructionKind {
        match self {
            Instruction::Meter { .. } => InstructionKind::Meter,
            Instruction::ApplyActions(_) => InstructionKind::ApplyActions,
            Instruction::ClearActions => InstructionKind::ClearActions,
            Instruction::WriteActions(_) => InstructionKind::WriteActions,
            Instruction::WriteMetadata { .. } => InstructionKind::WriteMetadata,
            Instruction::GotoTable { .. } => InstructionKind::GotoTable,
            Instruction::Experimenter { .. } => InstructionKind::Experimenter,
        }
    }
}

/// Instruction kinds, ranked by the order the standard mandates they execute
/// in: Meter, Apply-Actions, Clear-Actions, Write-Actions, Write-Metadata,
/// Goto-Table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstructionKind {
    /// Metering.
    Meter,
    /// Immediate action list.
    ApplyActions,
    /// Action-set clear.
    ClearActions,
    /// Action-set merge.
    WriteActions,
    /// Metadata update.
    WriteMetadata,
    /// Pipeline advance.
    GotoTable,
    /// Experimenter extension.
    Experimenter,
}

impl InstructionKind {
    fn execution_rank(self) -> u8 {
        match self {
            InstructionKind::Meter => 0,
            InstructionKind::ApplyActions => 1,
            InstructionKind::ClearActions => 2,
            InstructionKind::WriteActions => 3,
            InstructionKind::WriteMetadata => 4,
            InstructionKind::GotoTable => 5,
            InstructionKind::Experimenter => 6,
        }
    }

    /// Total order used to normalize instruction lists on insert.
    ///
    /// Apply-Actions before Clear-Actions is an explicit tie-break; all other
    /// pairs order by rank.
    #[must_use]
    pub fn cmp_execution(self, other: Self) -> Ordering {
        match (self, other) {
            (InstructionKind::ApplyActions, InstructionKind::ClearActions) => Ordering::Less,
            (InstructionKind::ClearActions, InstructionKind::ApplyActions) => Ordering::Greater,
            _ => self.execution_rank().cmp(&other.execution_rank()),
        }
    }
}

/// Sort an instruction list into canonical execution order.
///
/// Flow-mod normalizes on insert so the executor can walk the stored order.
pub fn sort_for_execution(instructions: &mut [Instruction]) {
    instructions.sort_by(|a, b| a.kind().cmp_execution(b.kind()));
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod test {
    use super::*;
    use crate::action::Action;

    #[test]
    fn canonical_order() {
        let mut insts = vec![
            Instruction::GotoTable { table_id: 3 },
            Instruction::WriteMetadata {
                metadata: 1,
                mask: 1,
            },
            Instruction::ClearActions,
            Instruction::WriteActions(vec![]),
            Instruction::ApplyActions(vec![]),
            Instruction::Meter { meter_id: 1 },
        ];
        sort_for_execution(&mut insts);
        let kinds: Vec<_> = insts.iter().map(Instruction::kind).collect();
        assert_eq!(
            kinds,
            vec![
                InstructionKind::Meter,
                InstructionKind::ApplyActions,
                InstructionKind::ClearActions,
                InstructionKind::WriteActions,
                InstructionKind::WriteMetadata,
                InstructionKind::GotoTable,
            ]
        );
    }

    #[test]
    fn apply_before_clear_tie_break() {
        assert_eq!(
            InstructionKind::ApplyActions.cmp_execution(InstructionKind::ClearActions),
            Ordering::Less
        );
        assert_eq!(
            InstructionKind::ClearActions.cmp_execution(InstructionKind::ApplyActions),
            Ordering::Greater
        );
    }

    #[test]
    fn sort_is_stable_for_repeated_kinds() {
        let mut insts = vec![
            Instruction::ApplyActions(vec![Action::PopVlan]),
            Instruction::Meter { meter_id: 7 },
            Instruction::ApplyActions(vec![Action::DecNwTtl]),
        ];
        sort_for_execution(&mut insts);
        assert_eq!(insts[0], Instruction::Meter { meter_id: 7 });
        assert_eq!(insts[1], Instruction::ApplyActions(vec![Action::PopVlan]));
        assert_eq!(insts[2], Instruction::ApplyActions(vec![Action::DecNwTtl]));
    }
}
