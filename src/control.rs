//! Balancing and state-request interface of the surrounding firmware, plus
//! the module/column command carried by debug frames and by the safe state.

use crate::config::{MAX_COLUMNS, MAX_MODULES, MODULE_COLUMN_COMMAND_BITS};
use arrayvec::ArrayVec;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;

const_assert!(2 * MAX_MODULES + MAX_COLUMNS <= MODULE_COLUMN_COMMAND_BITS);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalancingRequest {
    GlobalEnable,
    GlobalDisable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    Ok,
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ModuleState {
    Bypass = 0,
    Enable = 1,
    Disable = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ColumnState {
    Off = 0,
    On = 1,
}

/// Per-module and per-column states sent to the balancing hardware.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleColumnCommand {
    pub modules: ArrayVec<ModuleState, MAX_MODULES>,
    pub columns: ArrayVec<ColumnState, MAX_COLUMNS>,
}

impl ModuleColumnCommand {
    /// Every module disabled and every column off.
    pub fn safe_state(module_count: usize, column_count: usize) -> Self {
        let mut modules = ArrayVec::new();
        for _ in 0..module_count.min(MAX_MODULES) {
            modules.push(ModuleState::Disable);
        }
        let mut columns = ArrayVec::new();
        for _ in 0..column_count.min(MAX_COLUMNS) {
            columns.push(ColumnState::Off);
        }
        Self { modules, columns }
    }

    pub fn is_safe_state(&self) -> bool {
        self.modules.iter().all(|&state| state == ModuleState::Disable)
            && self.columns.iter().all(|&state| state == ColumnState::Off)
    }

    /// Decode the bits following the debug sub-command byte.
    ///
    /// Module `i` uses two bits at `2i`, column `i` one bit at
    /// `2 * module_count + i`. The unused two-bit value 3 is read as disable.
    pub fn decode(payload: u64, module_count: usize, column_count: usize) -> Self {
        let config = payload >> 8;
        let module_count = module_count.min(MAX_MODULES);

        let mut modules = ArrayVec::new();
        for i in 0..module_count {
            let raw = ((config >> (2 * i)) & 0x03) as u8;
            let state = ModuleState::try_from(raw).unwrap_or(ModuleState::Disable);
            modules.push(state);
        }

        let mut columns = ArrayVec::new();
        for i in 0..column_count.min(MAX_COLUMNS) {
            let raw = ((config >> (2 * module_count + i)) & 0x01) as u8;
            columns.push(if raw == 1 { ColumnState::On } else { ColumnState::Off });
        }

        Self { modules, columns }
    }

    /// Debug payload carrying this command, sub-command byte included.
    pub fn encode(&self) -> u64 {
        let mut config = 0u64;
        for (i, &state) in self.modules.iter().enumerate() {
            config |= u64::from(u8::from(state)) << (2 * i);
        }
        let column_base = 2 * self.modules.len();
        for (i, &state) in self.columns.iter().enumerate() {
            config |= u64::from(u8::from(state)) << (column_base + i);
        }
        (config << 8) | u64::from(u8::from(DebugCommand::ModuleColumnConfig))
    }
}

/// Sub-commands selected by byte 0 of a debug frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum DebugCommand {
    SetSoc = 11,
    Balancing = 14,
    ModuleColumnConfig = 21,
    CurrentCalibration = 25,
    HeartbeatPulse = 30,
}

/// Requests the CAN layer forwards to the balancing and system state machines.
pub trait BmsControl {
    fn set_state_request(&mut self, request: BalancingRequest) -> RequestStatus;

    fn apply_module_column_state(&mut self, command: &ModuleColumnCommand);

    fn request_current_calibration(&mut self);

    fn send_boot_message(&mut self);

    /// Whether the hardware already reports every module and column disabled.
    fn is_all_disabled(&self) -> bool {
        false
    }
}
