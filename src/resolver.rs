//! Module/cell index resolution for the generated per-module signal blocks.
//!
//! Each module contributes one voltage block and one temperature block of
//! [`SIGNALS_PER_BLOCK`] signals. A block starts with the valid-flags marker
//! of cells 0-2 (the module's anchor) followed by three cell signals, and
//! repeats that pattern for cells 3-5, 6-8 and 9-11.

use crate::config::{CELLS_PER_GROUP, CELLS_PER_MODULE, GROUPS_PER_MODULE};
use crate::error::CanSignalError;
use crate::message::CellQuantity;
use crate::signal::SignalIndex;
use serde::Serialize;

/// One marker plus three cells, four times.
pub const SIGNALS_PER_GROUP: usize = CELLS_PER_GROUP + 1;
pub const SIGNALS_PER_BLOCK: usize = GROUPS_PER_MODULE * SIGNALS_PER_GROUP;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CellSlot {
    /// Valid-flags marker of cells `3 * group .. 3 * group + 2`.
    ValidFlags { group: u8 },
    /// Cell index inside the module.
    Cell { cell: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModuleCellIndex {
    pub quantity: CellQuantity,
    pub module: u8,
    /// Offset of the signal behind the module anchor.
    pub local_offset: u8,
    pub slot: CellSlot,
}

impl ModuleCellIndex {
    pub fn group(&self) -> u8 {
        self.local_offset / SIGNALS_PER_GROUP as u8
    }

    /// Position in the flat cell array, `None` for valid-flags markers.
    pub fn array_offset(&self) -> Option<usize> {
        match self.slot {
            CellSlot::Cell { cell } => Some(usize::from(self.module) * CELLS_PER_MODULE + usize::from(cell)),
            CellSlot::ValidFlags { .. } => None,
        }
    }
}

/// Anchors of every module's voltage and temperature block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CellSignalResolver {
    voltage_anchors: Vec<SignalIndex>,
    temperature_anchors: Vec<SignalIndex>,
}

impl CellSignalResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the next module's anchors; modules must be added in order.
    pub fn push_module(&mut self, voltage_anchor: SignalIndex, temperature_anchor: SignalIndex) {
        debug_assert!(
            self.voltage_anchors.last().map_or(true, |&a| a < voltage_anchor),
            "voltage anchors must increase"
        );
        self.voltage_anchors.push(voltage_anchor);
        self.temperature_anchors.push(temperature_anchor);
    }

    pub fn module_count(&self) -> usize {
        self.voltage_anchors.len()
    }

    pub fn anchors(&self, quantity: CellQuantity) -> &[SignalIndex] {
        match quantity {
            CellQuantity::Voltage => &self.voltage_anchors,
            CellQuantity::Temperature => &self.temperature_anchors,
        }
    }

    /// Resolve `index` against the anchors of one quantity.
    ///
    /// Scans modules in increasing order and stops at the first anchor with
    /// `anchor <= index < anchor + SIGNALS_PER_BLOCK`.
    pub fn resolve(
        &self,
        quantity: CellQuantity,
        index: SignalIndex,
    ) -> Result<ModuleCellIndex, CanSignalError> {
        for (module, &anchor) in self.anchors(quantity).iter().enumerate() {
            if index < anchor {
                continue;
            }
            let local_offset = index - anchor;
            if local_offset < SIGNALS_PER_BLOCK {
                return Ok(Self::decode_local(quantity, module, local_offset));
            }
        }
        Err(CanSignalError::UnresolvedSignal(index))
    }

    /// Resolve `index` against both voltage and temperature blocks.
    pub fn resolve_any(&self, index: SignalIndex) -> Result<ModuleCellIndex, CanSignalError> {
        self.resolve(CellQuantity::Voltage, index)
            .or_else(|_| self.resolve(CellQuantity::Temperature, index))
    }

    fn decode_local(quantity: CellQuantity, module: usize, local_offset: usize) -> ModuleCellIndex {
        let group = local_offset / SIGNALS_PER_GROUP;
        let position = local_offset % SIGNALS_PER_GROUP;

        let slot = if position == 0 {
            CellSlot::ValidFlags { group: group as u8 }
        } else {
            // One marker precedes cell 0, plus one more per group passed
            CellSlot::Cell {
                cell: (local_offset - 1 - group) as u8,
            }
        };

        ModuleCellIndex {
            quantity,
            module: module as u8,
            local_offset: local_offset as u8,
            slot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_module_resolver() -> CellSignalResolver {
        let mut resolver = CellSignalResolver::new();
        resolver.push_module(10, 26);
        resolver.push_module(42, 58);
        resolver
    }

    #[test]
    fn test_group_markers_and_cells() {
        let resolver = two_module_resolver();

        let marker = resolver.resolve(CellQuantity::Voltage, 10 + 8).unwrap();
        assert_eq!(marker.slot, CellSlot::ValidFlags { group: 2 });
        assert_eq!(marker.array_offset(), None);

        let last = resolver.resolve(CellQuantity::Voltage, 10 + 15).unwrap();
        assert_eq!(last.slot, CellSlot::Cell { cell: 11 });
        assert_eq!(last.group(), 3);
    }

    #[test]
    fn test_block_end_is_exclusive() {
        let resolver = two_module_resolver();

        // anchor + 16 is the temperature anchor, never part of the voltage block
        assert_eq!(
            resolver.resolve(CellQuantity::Voltage, 26),
            Err(CanSignalError::UnresolvedSignal(26))
        );
        let temperature = resolver.resolve(CellQuantity::Temperature, 26).unwrap();
        assert_eq!(temperature.module, 0);
        assert_eq!(temperature.slot, CellSlot::ValidFlags { group: 0 });
    }

    #[test]
    fn test_second_module_offsets() {
        let resolver = two_module_resolver();
        let resolved = resolver.resolve(CellQuantity::Temperature, 58 + 1).unwrap();
        assert_eq!(resolved.module, 1);
        assert_eq!(resolved.array_offset(), Some(CELLS_PER_MODULE));
    }

    #[test]
    fn test_indices_before_first_anchor_fail() {
        let resolver = two_module_resolver();
        assert_eq!(
            resolver.resolve_any(3),
            Err(CanSignalError::UnresolvedSignal(3))
        );
    }
}
