//! Measurement store interface and the data blocks exchanged through it.
//!
//! The store itself belongs to the rest of the firmware. This module only
//! names the blocks the CAN layer touches, the two primitives it needs
//! (`read_block`, `write_block`) and an in-memory store for hosts and tests.

use crate::config::{CanSignalConfig, CELLS_PER_MODULE, TEMP_SENSORS_PER_MODULE};
use crate::error::StoreError;
use core::cell::Cell;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Moving average windows reported on the Power and Current messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AverageWindow {
    OneSecond,
    FiveSeconds,
    TenSeconds,
    ThirtySeconds,
    SixtySeconds,
    Configurable,
}

impl AverageWindow {
    pub const ALL: [AverageWindow; 6] = [
        AverageWindow::OneSecond,
        AverageWindow::FiveSeconds,
        AverageWindow::TenSeconds,
        AverageWindow::ThirtySeconds,
        AverageWindow::SixtySeconds,
        AverageWindow::Configurable,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Measurement channels of the external current sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorChannel {
    Current,
    Voltage1,
    Voltage2,
    Voltage3,
    Temperature,
    Power,
    CoulombCount,
    EnergyCount,
}

impl SensorChannel {
    pub const ALL: [SensorChannel; 8] = [
        SensorChannel::Current,
        SensorChannel::Voltage1,
        SensorChannel::Voltage2,
        SensorChannel::Voltage3,
        SensorChannel::Temperature,
        SensorChannel::Power,
        SensorChannel::CoulombCount,
        SensorChannel::EnergyCount,
    ];

    pub fn message_id(self) -> u16 {
        0x521 + self as u16
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellVoltageBlock {
    /// mV, `module * CELLS_PER_MODULE + cell`
    pub voltage: Vec<u16>,
    /// One bit per cell, per module.
    pub valid_pecs: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellTemperatureBlock {
    /// degC, `module * TEMP_SENSORS_PER_MODULE + sensor`
    pub temperature: Vec<i16>,
    pub valid_pecs: Vec<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CurrentSensorBlock {
    pub current: f32,
    pub voltage: [f32; 3],
    pub temperature: f32,
    pub power: f32,
    pub current_counter: f32,
    pub energy_counter: f32,
    pub state_current: u8,
    pub state_voltage: u8,
    pub state_temperature: u8,
    pub state_power: u8,
    pub state_cc: u8,
    pub state_ec: u8,
    pub new_current: u32,
    pub new_power: u32,
    pub timestamp_cur: u32,
    pub previous_timestamp_cur: u32,
    pub timestamp_cc: u32,
    pub previous_timestamp_cc: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SoxBlock {
    pub soc_mean: f32,
    pub soc_min: f32,
    pub soc_max: f32,
    pub soe: f32,
    pub soh: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MinMaxBlock {
    pub voltage_mean: u16,
    pub voltage_min: u16,
    pub voltage_max: u16,
    pub voltage_module_min: u16,
    pub voltage_module_max: u16,
    pub temperature_mean: f32,
    pub temperature_min: i16,
    pub temperature_max: i16,
    pub temperature_module_min: u16,
    pub temperature_module_max: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ErrorStateBlock {
    pub general_error: u8,
    pub mcu_die_temperature: u8,
    pub main_plus: u8,
    pub main_minus: u8,
    pub precharge: u8,
    pub charge_main_plus: u8,
    pub charge_main_minus: u8,
    pub charge_precharge: u8,
    pub can_timing: u8,
    pub can_timing_cc: u8,
    pub current_sensor_responding: u8,
    pub insulation_error: u8,
    pub fuse_state_normal: u8,
    pub fuse_state_charge: u8,
    pub low_coin_cell_voltage: u8,
    pub open_wire: u8,
    pub spi_error: u8,
    pub crc_error: u8,
    pub mux_error: u8,
}

/// Shared layout of the three limit levels (maximum safety, recommended
/// safety and maximum operating limit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LimitFlagsBlock {
    pub general: u8,
    pub over_temperature_charge: u8,
    pub under_temperature_charge: u8,
    pub over_temperature_discharge: u8,
    pub under_temperature_discharge: u8,
    pub over_current_charge: u8,
    pub over_current_discharge: u8,
    pub over_voltage: u8,
    pub under_voltage: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContactorFeedbackBlock {
    pub contactor_feedback: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InterlockFeedbackBlock {
    pub interlock_feedback: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BalancingControlBlock {
    pub enable_balancing: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SystemStateBlock {
    pub bms_state: u8,
}

/// Recommended operating currents in A.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SofBlock {
    pub continuous_charge: f32,
    pub peak_charge: f32,
    pub continuous_discharge: f32,
    pub peak_discharge: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MovingAverageBlock {
    /// Indexed by [`AverageWindow::index`].
    pub power: [f32; 6],
    pub current: [f32; 6],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IsometerBlock {
    pub state: u8,
    pub resistance_kohm: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StateRequestBlock {
    pub state_request: u8,
    pub previous_state_request: u8,
    pub state_request_pending: u8,
    /// Number of state requests received.
    pub state: u32,
    pub timestamp_ms: u32,
}

macro_rules! data_blocks {
    ($($variant:ident($ty:ty) => $accessor:ident),* $(,)?) => {
        /// Identifier of a store record.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum DataBlockId {
            $($variant),*
        }

        impl DataBlockId {
            pub const ALL: &'static [DataBlockId] = &[$(DataBlockId::$variant),*];
        }

        /// One store record.
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub enum DataBlock {
            $($variant($ty)),*
        }

        impl DataBlock {
            pub fn id(&self) -> DataBlockId {
                match self {
                    $(DataBlock::$variant(_) => DataBlockId::$variant),*
                }
            }

            $(
                pub fn $accessor(&self) -> Result<&$ty, StoreError> {
                    match self {
                        DataBlock::$variant(block) => Ok(block),
                        other => Err(StoreError::UnexpectedBlock {
                            expected: DataBlockId::$variant,
                            found: other.id(),
                        }),
                    }
                }
            )*
        }
    };
}

data_blocks! {
    CellVoltage(CellVoltageBlock) => as_cell_voltage,
    CellTemperature(CellTemperatureBlock) => as_cell_temperature,
    CurrentSensor(CurrentSensorBlock) => as_current_sensor,
    Sox(SoxBlock) => as_sox,
    MinMax(MinMaxBlock) => as_min_max,
    ErrorState(ErrorStateBlock) => as_error_state,
    MaximumSafetyLimits(LimitFlagsBlock) => as_maximum_safety_limits,
    RecommendedSafetyLimits(LimitFlagsBlock) => as_recommended_safety_limits,
    MaximumOperatingLimits(LimitFlagsBlock) => as_maximum_operating_limits,
    ContactorFeedback(ContactorFeedbackBlock) => as_contactor_feedback,
    InterlockFeedback(InterlockFeedbackBlock) => as_interlock_feedback,
    BalancingControl(BalancingControlBlock) => as_balancing_control,
    SystemState(SystemStateBlock) => as_system_state,
    Sof(SofBlock) => as_sof,
    MovingAverage(MovingAverageBlock) => as_moving_average,
    Isometer(IsometerBlock) => as_isometer,
    StateRequest(StateRequestBlock) => as_state_request,
}

impl DataBlock {
    /// Zeroed record sized for `config`.
    pub fn empty(id: DataBlockId, config: &CanSignalConfig) -> Self {
        match id {
            DataBlockId::CellVoltage => DataBlock::CellVoltage(CellVoltageBlock {
                voltage: vec![0; config.module_count * CELLS_PER_MODULE],
                valid_pecs: vec![0; config.module_count],
            }),
            DataBlockId::CellTemperature => DataBlock::CellTemperature(CellTemperatureBlock {
                temperature: vec![0; config.module_count * TEMP_SENSORS_PER_MODULE],
                valid_pecs: vec![0; config.module_count],
            }),
            DataBlockId::CurrentSensor => DataBlock::CurrentSensor(CurrentSensorBlock::default()),
            DataBlockId::Sox => DataBlock::Sox(SoxBlock::default()),
            DataBlockId::MinMax => DataBlock::MinMax(MinMaxBlock::default()),
            DataBlockId::ErrorState => DataBlock::ErrorState(ErrorStateBlock::default()),
            DataBlockId::MaximumSafetyLimits => {
                DataBlock::MaximumSafetyLimits(LimitFlagsBlock::default())
            }
            DataBlockId::RecommendedSafetyLimits => {
                DataBlock::RecommendedSafetyLimits(LimitFlagsBlock::default())
            }
            DataBlockId::MaximumOperatingLimits => {
                DataBlock::MaximumOperatingLimits(LimitFlagsBlock::default())
            }
            DataBlockId::ContactorFeedback => {
                DataBlock::ContactorFeedback(ContactorFeedbackBlock::default())
            }
            DataBlockId::InterlockFeedback => {
                DataBlock::InterlockFeedback(InterlockFeedbackBlock::default())
            }
            DataBlockId::BalancingControl => {
                DataBlock::BalancingControl(BalancingControlBlock::default())
            }
            DataBlockId::SystemState => DataBlock::SystemState(SystemStateBlock::default()),
            DataBlockId::Sof => DataBlock::Sof(SofBlock::default()),
            DataBlockId::MovingAverage => DataBlock::MovingAverage(MovingAverageBlock::default()),
            DataBlockId::Isometer => DataBlock::Isometer(IsometerBlock::default()),
            DataBlockId::StateRequest => DataBlock::StateRequest(StateRequestBlock::default()),
        }
    }
}

/// Read/write-block primitives of the measurement database.
///
/// A read returns the most recent committed record; a write is visible to
/// every later read.
pub trait MeasurementStore {
    fn read_block(&self, id: DataBlockId) -> Result<DataBlock, StoreError>;
    fn write_block(&mut self, block: DataBlock) -> Result<(), StoreError>;
}

/// Host-side store holding every block in a map.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    blocks: HashMap<DataBlockId, DataBlock>,
    reads: Cell<u32>,
    writes: u32,
}

impl InMemoryStore {
    /// Store pre-filled with a zeroed record for every block.
    pub fn new(config: &CanSignalConfig) -> Self {
        let blocks = DataBlockId::ALL
            .iter()
            .map(|&id| (id, DataBlock::empty(id, config)))
            .collect();
        Self {
            blocks,
            reads: Cell::new(0),
            writes: 0,
        }
    }

    /// Store without any record; every read fails until a block is written.
    pub fn empty() -> Self {
        Self {
            blocks: HashMap::new(),
            reads: Cell::new(0),
            writes: 0,
        }
    }

    pub fn read_count(&self) -> u32 {
        self.reads.get()
    }

    pub fn write_count(&self) -> u32 {
        self.writes
    }

    pub fn reset_counters(&mut self) {
        self.reads.set(0);
        self.writes = 0;
    }
}

impl MeasurementStore for InMemoryStore {
    fn read_block(&self, id: DataBlockId) -> Result<DataBlock, StoreError> {
        self.reads.set(self.reads.get().saturating_add(1));
        self.blocks
            .get(&id)
            .cloned()
            .ok_or(StoreError::MissingBlock(id))
    }

    fn write_block(&mut self, block: DataBlock) -> Result<(), StoreError> {
        self.writes = self.writes.saturating_add(1);
        self.blocks.insert(block.id(), block);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_store_sizes_cell_tables() {
        let config = CanSignalConfig::standard(4);
        let store = InMemoryStore::new(&config);

        let block = store.read_block(DataBlockId::CellVoltage).unwrap();
        let voltages = block.as_cell_voltage().unwrap();
        assert_eq!(voltages.voltage.len(), 48);
        assert_eq!(voltages.valid_pecs.len(), 4);
        assert_eq!(store.read_count(), 1);
    }

    #[test]
    fn test_write_is_visible_to_next_read() {
        let mut store = InMemoryStore::new(&CanSignalConfig::default());
        let sox = SoxBlock {
            soc_mean: 55.5,
            ..SoxBlock::default()
        };
        store.write_block(DataBlock::Sox(sox)).unwrap();

        let block = store.read_block(DataBlockId::Sox).unwrap();
        assert_eq!(block.as_sox().unwrap().soc_mean, 55.5);
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn test_accessor_reports_block_mismatch() {
        let block = DataBlock::Sox(SoxBlock::default());
        assert_eq!(
            block.as_min_max(),
            Err(StoreError::UnexpectedBlock {
                expected: DataBlockId::MinMax,
                found: DataBlockId::Sox,
            })
        );
    }

    #[test]
    fn test_empty_store_reports_missing_block() {
        let store = InMemoryStore::empty();
        assert_eq!(
            store.read_block(DataBlockId::Isometer),
            Err(StoreError::MissingBlock(DataBlockId::Isometer))
        );
    }
}
