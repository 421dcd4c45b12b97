use crate::store::DataBlockId;
use thiserror::Error;

/// Errors raised while building or validating the signal configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("module count {0} outside 1..={max}", max = crate::config::MAX_MODULES)]
    InvalidModuleCount(usize),
    #[error("column count {0} outside 1..={max}", max = crate::config::MAX_COLUMNS)]
    InvalidColumnCount(usize),
    #[error("{0} modules configured but extended modules are disabled")]
    ExtendedModulesDisabled(usize),
    #[error("{modules} modules and {columns} columns do not fit the 56-bit module/column command")]
    ModuleColumnOverflow { modules: usize, columns: usize },
    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },
    #[error("signal {index} ({name}) at bit {bit_offset} with length {bit_length} does not fit a 64-bit frame")]
    SignalOutOfFrame {
        index: usize,
        name: &'static str,
        bit_offset: u8,
        bit_length: u8,
    },
    #[error("signal {index} ({name}) overlaps another signal of message 0x{message_id:03X}")]
    OverlappingSignals {
        index: usize,
        name: &'static str,
        message_id: u16,
    },
    #[error("message 0x{message_id:03X} period {period_ms} ms is not a positive multiple of the {tick_ms} ms tick")]
    InvalidPeriod {
        message_id: u16,
        period_ms: u32,
        tick_ms: u32,
    },
    #[error("message 0x{message_id:03X} phase {phase_ms} ms is not a multiple of the {tick_ms} ms tick")]
    InvalidPhase {
        message_id: u16,
        phase_ms: u32,
        tick_ms: u32,
    },
    #[error("message id 0x{0:03X} exceeds the 11-bit identifier range")]
    InvalidMessageId(u16),
    #[error("message id 0x{0:03X} appears twice in the same direction")]
    DuplicateMessageId(u16),
    #[error("failed to read configuration: {0}")]
    Io(String),
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// Errors reported by a measurement store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("data block {0:?} is not present in the store")]
    MissingBlock(DataBlockId),
    #[error("expected data block {expected:?}, found {found:?}")]
    UnexpectedBlock {
        expected: DataBlockId,
        found: DataBlockId,
    },
    #[error("data block {id:?} holds {len} entries, entry {index} requested")]
    OutOfRange {
        id: DataBlockId,
        index: usize,
        len: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CanSignalError {
    #[error("signal index {0} does not resolve to any module")]
    UnresolvedSignal(usize),
    #[error("signal index {0} is not part of the signal table")]
    UnknownSignal(usize),
    #[error("message 0x{0:03X} is not part of the message table")]
    UnknownMessage(u16),
    #[error("message index {0} is not part of the tx message table")]
    UnknownMessageIndex(usize),
    #[error("frame 0x{id:03X} carries {len} bytes, at most 8 are allowed")]
    FrameTooLong { id: u16, len: usize },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
