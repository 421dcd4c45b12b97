//! Getter/setter dispatch between signals and the measurement store.
//!
//! Every table entry names its handler as a [`Getter`] or [`Setter`]
//! variant. Getters read through a [`BurstContext`] so all signals of one
//! outgoing message see the same store snapshot; setters write through to
//! the store immediately.

use crate::config::CanSignalConfig;
use crate::control::{BalancingRequest, BmsControl, DebugCommand, ModuleColumnCommand, RequestStatus};
use crate::error::{CanSignalError, StoreError};
use crate::heartbeat::HeartbeatMonitor;
use crate::message::CellQuantity;
use crate::resolver::{CellSignalResolver, CellSlot};
use crate::signal::{SignalDescriptor, SignalIndex};
use crate::store::{
    AverageWindow, CurrentSensorBlock, DataBlock, DataBlockId, LimitFlagsBlock, MeasurementStore,
    SensorChannel,
};
use heapless::Vec;
use tracing::{debug, warn};

/// Enough for the widest burst (the system state messages).
const MAX_BURST_BLOCKS: usize = 8;

/// Bit-field word sent on the current-sensor trigger message.
pub const CURRENT_TRIGGER_WORD: u64 = 0x00FF_FF31;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusField {
    GeneralError,
    CurrentState,
    OverTemperatureCharge,
    UnderTemperatureCharge,
    OverTemperatureDischarge,
    UnderTemperatureDischarge,
    OverCurrentCharge,
    OverCurrentDischarge,
    OverVoltage,
    UnderVoltage,
    McuDieTemperature,
    Contactor,
    Selftest,
    CanTiming,
    CurrentSensor,
    BalancingActive,
    ContactorInterlock,
    Insulation,
    FuseState,
    LowCoinCellVoltage,
    OpenWire,
    DaisyChain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateOfChargeField {
    Mean,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingCurrentField {
    ContinuousCharge,
    PeakCharge,
    ContinuousDischarge,
    PeakDischarge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinMaxField {
    Mean,
    Min,
    Max,
    ModuleOfMin,
    ModuleOfMax,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsulationField {
    Status,
    Resistance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackVoltageTap {
    Battery,
    PowerNet,
}

/// Source of a transmitted signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Getter {
    Status(StatusField),
    RecommendedCurrent(OperatingCurrentField),
    MaxAllowedPower,
    Soc(StateOfChargeField),
    CellVoltageMinMax(MinMaxField),
    CellTemperatureMinMax(MinMaxField),
    Tempering,
    Insulation(InsulationField),
    MovingAveragePower(AverageWindow),
    MovingAverageCurrent(AverageWindow),
    PackVoltage(PackVoltageTap),
    /// Module and cell come from the resolver.
    CellVoltage,
    CellTemperature,
    CurrentTrigger,
}

/// Sink of a received signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setter {
    StateRequest,
    SensorStatus(SensorChannel),
    SensorMeasurement(SensorChannel),
    Debug,
    ReleaseVersion,
}

/// Value produced by a getter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SignalValue {
    /// Measurement in physical units; clamped and scaled before packing.
    Physical(f64),
    /// Ready-made bit field, only masked to the signal length.
    Raw(u64),
}

/// Store snapshots shared by the signals of one message build.
///
/// A block is read on first use and reused until [`reset`](Self::reset)
/// starts the next burst.
#[derive(Debug, Default)]
pub struct BurstContext {
    snapshots: Vec<DataBlock, MAX_BURST_BLOCKS>,
}

impl BurstContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.snapshots.clear();
    }

    pub fn snapshot_taken(&self, id: DataBlockId) -> bool {
        self.snapshots.iter().any(|block| block.id() == id)
    }

    pub fn block<S>(&mut self, store: &S, id: DataBlockId) -> Result<&DataBlock, StoreError>
    where
        S: MeasurementStore + ?Sized,
    {
        if let Some(position) = self.snapshots.iter().position(|block| block.id() == id) {
            return Ok(&self.snapshots[position]);
        }

        let block = store.read_block(id)?;
        if self.snapshots.is_full() {
            self.snapshots.remove(0);
        }
        let _ = self.snapshots.push(block);
        self.snapshots.last().ok_or(StoreError::MissingBlock(id))
    }
}

/// Read-side collaborators of a getter.
pub struct TxEnv<'a, S: ?Sized> {
    pub store: &'a S,
    pub resolver: &'a CellSignalResolver,
    pub config: &'a CanSignalConfig,
}

/// Write-side collaborators of a setter.
pub struct RxEnv<'a, S: ?Sized, C: ?Sized> {
    pub store: &'a mut S,
    pub control: &'a mut C,
    pub heartbeat: &'a mut HeartbeatMonitor,
    pub config: &'a CanSignalConfig,
    pub now_ms: u32,
}

impl Getter {
    pub fn produce<S>(
        &self,
        env: &TxEnv<'_, S>,
        ctx: &mut BurstContext,
        index: SignalIndex,
    ) -> Result<SignalValue, CanSignalError>
    where
        S: MeasurementStore + ?Sized,
    {
        let store = env.store;
        let value = match *self {
            Getter::Status(field) => SignalValue::Raw(status_bits(field, env, ctx)?),
            Getter::RecommendedCurrent(field) => {
                let sof = ctx.block(store, DataBlockId::Sof)?.as_sof()?;
                let amps = match field {
                    OperatingCurrentField::ContinuousCharge => sof.continuous_charge,
                    OperatingCurrentField::PeakCharge => sof.peak_charge,
                    OperatingCurrentField::ContinuousDischarge => sof.continuous_discharge,
                    OperatingCurrentField::PeakDischarge => sof.peak_discharge,
                };
                SignalValue::Physical(f64::from(amps))
            }
            Getter::MaxAllowedPower | Getter::Tempering => SignalValue::Raw(0),
            Getter::Soc(field) => {
                let sox = ctx.block(store, DataBlockId::Sox)?.as_sox()?;
                let percent = match field {
                    StateOfChargeField::Mean => sox.soc_mean,
                    StateOfChargeField::Min => sox.soc_min,
                    StateOfChargeField::Max => sox.soc_max,
                };
                SignalValue::Physical(f64::from(percent))
            }
            Getter::CellVoltageMinMax(field) => {
                let min_max = ctx.block(store, DataBlockId::MinMax)?.as_min_max()?;
                let value = match field {
                    MinMaxField::Mean => min_max.voltage_mean,
                    MinMaxField::Min => min_max.voltage_min,
                    MinMaxField::Max => min_max.voltage_max,
                    MinMaxField::ModuleOfMin => min_max.voltage_module_min,
                    MinMaxField::ModuleOfMax => min_max.voltage_module_max,
                };
                SignalValue::Physical(f64::from(value))
            }
            Getter::CellTemperatureMinMax(field) => {
                let min_max = ctx.block(store, DataBlockId::MinMax)?.as_min_max()?;
                let value = match field {
                    MinMaxField::Mean => f64::from(min_max.temperature_mean),
                    MinMaxField::Min => f64::from(min_max.temperature_min),
                    MinMaxField::Max => f64::from(min_max.temperature_max),
                    MinMaxField::ModuleOfMin => f64::from(min_max.temperature_module_min),
                    MinMaxField::ModuleOfMax => f64::from(min_max.temperature_module_max),
                };
                SignalValue::Physical(value)
            }
            Getter::Insulation(field) => {
                let isometer = ctx.block(store, DataBlockId::Isometer)?.as_isometer()?;
                let value = match field {
                    InsulationField::Status => f64::from(isometer.state),
                    InsulationField::Resistance => f64::from(isometer.resistance_kohm),
                };
                SignalValue::Physical(value)
            }
            Getter::MovingAveragePower(window) => {
                let averages = ctx.block(store, DataBlockId::MovingAverage)?.as_moving_average()?;
                SignalValue::Physical(f64::from(averages.power[window.index()]))
            }
            Getter::MovingAverageCurrent(window) => {
                let averages = ctx.block(store, DataBlockId::MovingAverage)?.as_moving_average()?;
                SignalValue::Physical(f64::from(averages.current[window.index()]))
            }
            Getter::PackVoltage(tap) => {
                let sensor = ctx.block(store, DataBlockId::CurrentSensor)?.as_current_sensor()?;
                let volts = match tap {
                    PackVoltageTap::Battery => sensor.voltage[0],
                    PackVoltageTap::PowerNet => sensor.voltage[2],
                };
                SignalValue::Physical(f64::from(volts))
            }
            Getter::CellVoltage => {
                let resolved = env.resolver.resolve(CellQuantity::Voltage, index)?;
                let block = ctx.block(store, DataBlockId::CellVoltage)?.as_cell_voltage()?;
                match resolved.slot {
                    CellSlot::ValidFlags { group } => SignalValue::Raw(valid_flags(
                        &block.valid_pecs,
                        usize::from(resolved.module),
                        group,
                        DataBlockId::CellVoltage,
                    )?),
                    CellSlot::Cell { .. } => {
                        let offset = resolved.array_offset().unwrap_or_default();
                        let millivolts = entry(&block.voltage, offset, DataBlockId::CellVoltage)?;
                        SignalValue::Physical(f64::from(millivolts))
                    }
                }
            }
            Getter::CellTemperature => {
                let resolved = env.resolver.resolve(CellQuantity::Temperature, index)?;
                let block = ctx.block(store, DataBlockId::CellTemperature)?.as_cell_temperature()?;
                match resolved.slot {
                    CellSlot::ValidFlags { group } => SignalValue::Raw(valid_flags(
                        &block.valid_pecs,
                        usize::from(resolved.module),
                        group,
                        DataBlockId::CellTemperature,
                    )?),
                    CellSlot::Cell { .. } => {
                        let offset = resolved.array_offset().unwrap_or_default();
                        let celsius = entry(&block.temperature, offset, DataBlockId::CellTemperature)?;
                        SignalValue::Physical(f64::from(celsius))
                    }
                }
            }
            Getter::CurrentTrigger => SignalValue::Raw(CURRENT_TRIGGER_WORD),
        };
        Ok(value)
    }
}

impl Setter {
    pub fn consume<S, C>(
        &self,
        signal: &SignalDescriptor,
        raw: u64,
        env: &mut RxEnv<'_, S, C>,
    ) -> Result<(), CanSignalError>
    where
        S: MeasurementStore + ?Sized,
        C: BmsControl + ?Sized,
    {
        match *self {
            Setter::StateRequest => set_state_request(raw, env),
            Setter::SensorStatus(channel) => {
                let mut sensor = *env.store.read_block(DataBlockId::CurrentSensor)?.as_current_sensor()?;
                apply_sensor_status(&mut sensor, channel, raw as u8);
                env.store.write_block(DataBlock::CurrentSensor(sensor))?;
                Ok(())
            }
            Setter::SensorMeasurement(channel) => {
                let mut sensor = *env.store.read_block(DataBlockId::CurrentSensor)?.as_current_sensor()?;
                apply_sensor_measurement(&mut sensor, channel, raw, signal.factor, env.now_ms);
                env.store.write_block(DataBlock::CurrentSensor(sensor))?;
                Ok(())
            }
            Setter::Debug => apply_debug_command(raw, env),
            Setter::ReleaseVersion => {
                env.control.send_boot_message();
                Ok(())
            }
        }
    }
}

/// `MOL << 2 | RSL << 1 | MSL`
fn limit_levels(msl: u8, rsl: u8, mol: u8) -> u64 {
    (u64::from(mol) << 2) | (u64::from(rsl) << 1) | u64::from(msl)
}

fn limit_flag(field: StatusField, flags: &LimitFlagsBlock) -> u8 {
    match field {
        StatusField::OverTemperatureCharge => flags.over_temperature_charge,
        StatusField::UnderTemperatureCharge => flags.under_temperature_charge,
        StatusField::OverTemperatureDischarge => flags.over_temperature_discharge,
        StatusField::UnderTemperatureDischarge => flags.under_temperature_discharge,
        StatusField::OverCurrentCharge => flags.over_current_charge,
        StatusField::OverCurrentDischarge => flags.over_current_discharge,
        StatusField::OverVoltage => flags.over_voltage,
        StatusField::UnderVoltage => flags.under_voltage,
        _ => flags.general,
    }
}

fn status_bits<S>(
    field: StatusField,
    env: &TxEnv<'_, S>,
    ctx: &mut BurstContext,
) -> Result<u64, CanSignalError>
where
    S: MeasurementStore + ?Sized,
{
    let store = env.store;
    let bits = match field {
        StatusField::GeneralError => {
            let error = ctx.block(store, DataBlockId::ErrorState)?.as_error_state()?.general_error;
            let rsl = ctx
                .block(store, DataBlockId::RecommendedSafetyLimits)?
                .as_recommended_safety_limits()?
                .general;
            let mol = ctx
                .block(store, DataBlockId::MaximumOperatingLimits)?
                .as_maximum_operating_limits()?
                .general;
            limit_levels(error, rsl, mol)
        }
        StatusField::OverTemperatureCharge
        | StatusField::UnderTemperatureCharge
        | StatusField::OverTemperatureDischarge
        | StatusField::UnderTemperatureDischarge
        | StatusField::OverCurrentCharge
        | StatusField::OverCurrentDischarge
        | StatusField::OverVoltage
        | StatusField::UnderVoltage => {
            let msl = *ctx
                .block(store, DataBlockId::MaximumSafetyLimits)?
                .as_maximum_safety_limits()?;
            let rsl = *ctx
                .block(store, DataBlockId::RecommendedSafetyLimits)?
                .as_recommended_safety_limits()?;
            let mol = *ctx
                .block(store, DataBlockId::MaximumOperatingLimits)?
                .as_maximum_operating_limits()?;
            limit_levels(
                limit_flag(field, &msl),
                limit_flag(field, &rsl),
                limit_flag(field, &mol),
            )
        }
        StatusField::CurrentState => {
            u64::from(ctx.block(store, DataBlockId::SystemState)?.as_system_state()?.bms_state)
        }
        StatusField::BalancingActive => u64::from(
            ctx.block(store, DataBlockId::BalancingControl)?
                .as_balancing_control()?
                .enable_balancing,
        ),
        StatusField::ContactorInterlock => {
            let feedback = ctx
                .block(store, DataBlockId::ContactorFeedback)?
                .as_contactor_feedback()?
                .contactor_feedback;
            let interlock = ctx
                .block(store, DataBlockId::InterlockFeedback)?
                .as_interlock_feedback()?
                .interlock_feedback;
            u64::from((feedback & !(1 << 9)) | (u32::from(interlock) << 9))
        }
        StatusField::Selftest => 0,
        _ => {
            let errors = *ctx.block(store, DataBlockId::ErrorState)?.as_error_state()?;
            match field {
                StatusField::McuDieTemperature => u64::from(errors.mcu_die_temperature),
                StatusField::Contactor => u64::from(
                    errors.main_plus
                        | errors.main_minus
                        | errors.precharge
                        | errors.charge_main_plus
                        | errors.charge_main_minus
                        | errors.charge_precharge,
                ),
                StatusField::CanTiming => u64::from(errors.can_timing),
                StatusField::CurrentSensor => {
                    u64::from(errors.current_sensor_responding | errors.can_timing_cc)
                }
                StatusField::Insulation => u64::from(errors.insulation_error),
                StatusField::FuseState => {
                    let mut fuse = 0u64;
                    if errors.fuse_state_normal != 0 {
                        fuse |= if env.config.fuse_in_normal_path { 0x01 } else { 0x02 };
                    }
                    if errors.fuse_state_charge != 0 {
                        fuse |= if env.config.fuse_in_charge_path { 0x04 } else { 0x08 };
                    }
                    fuse
                }
                StatusField::LowCoinCellVoltage => u64::from(errors.low_coin_cell_voltage),
                StatusField::OpenWire => u64::from(errors.open_wire),
                StatusField::DaisyChain => {
                    u64::from(errors.spi_error)
                        | (u64::from(errors.crc_error) << 1)
                        | (u64::from(errors.mux_error) << 2)
                }
                _ => 0,
            }
        }
    };
    Ok(bits)
}

/// Three valid bits of one cell group.
fn valid_flags(
    valid_pecs: &[u16],
    module: usize,
    group: u8,
    id: DataBlockId,
) -> Result<u64, StoreError> {
    let pecs = entry(valid_pecs, module, id)?;
    Ok((u64::from(pecs) >> (3 * u32::from(group))) & 0x07)
}

fn entry<T: Copy>(values: &[T], index: usize, id: DataBlockId) -> Result<T, StoreError> {
    values.get(index).copied().ok_or(StoreError::OutOfRange {
        id,
        index,
        len: values.len(),
    })
}

fn set_state_request<S, C>(raw: u64, env: &mut RxEnv<'_, S, C>) -> Result<(), CanSignalError>
where
    S: MeasurementStore + ?Sized,
    C: BmsControl + ?Sized,
{
    let mut block = *env.store.read_block(DataBlockId::StateRequest)?.as_state_request()?;
    let request = raw as u8;

    block.previous_state_request = block.state_request;
    block.state_request = request;
    let repeated_late =
        env.now_ms.wrapping_sub(block.timestamp_ms) > env.config.state_request_repeat_ms;
    if block.state_request != block.previous_state_request || repeated_late {
        block.state_request_pending = request;
    }
    block.state = block.state.wrapping_add(1);
    block.timestamp_ms = env.now_ms;

    env.store.write_block(DataBlock::StateRequest(block))?;
    Ok(())
}

fn apply_sensor_status(sensor: &mut CurrentSensorBlock, channel: SensorChannel, status: u8) {
    // Only the high nibble carries diagnostics
    let status = status & 0xF0;

    if status & 0x20 != 0 {
        match channel {
            SensorChannel::Current => sensor.state_current = 1,
            SensorChannel::Voltage1 | SensorChannel::Voltage2 | SensorChannel::Voltage3 => {
                sensor.state_voltage = 1;
            }
            SensorChannel::Temperature => sensor.state_temperature = 1,
            SensorChannel::Power => sensor.state_power = 1,
            SensorChannel::CoulombCount => sensor.state_cc = 1,
            SensorChannel::EnergyCount => sensor.state_ec = 1,
        }
    } else {
        set_all_sensor_states(sensor, 0);
    }

    if status & 0xC0 != 0 {
        set_all_sensor_states(sensor, 1);
    }
}

fn set_all_sensor_states(sensor: &mut CurrentSensorBlock, state: u8) {
    sensor.state_current = state;
    sensor.state_voltage = state;
    sensor.state_temperature = state;
    sensor.state_power = state;
    sensor.state_cc = state;
    sensor.state_ec = state;
}

/// Sensor measurements are sent MSB first.
pub fn sensor_measurement_value(raw: u64) -> i32 {
    (raw as u32).swap_bytes() as i32
}

/// Raw bits a sensor frame carries for `value`.
pub fn sensor_measurement_raw(value: i32) -> u64 {
    u64::from((value as u32).swap_bytes())
}

fn apply_sensor_measurement(
    sensor: &mut CurrentSensorBlock,
    channel: SensorChannel,
    raw: u64,
    factor: f64,
    now_ms: u32,
) {
    let value = (f64::from(sensor_measurement_value(raw)) * factor) as f32;

    match channel {
        SensorChannel::Current => {
            sensor.current = value;
            sensor.new_current = sensor.new_current.wrapping_add(1);
            sensor.previous_timestamp_cur = sensor.timestamp_cur;
            sensor.timestamp_cur = now_ms;
        }
        SensorChannel::Voltage1 => sensor.voltage[0] = value,
        SensorChannel::Voltage2 => sensor.voltage[1] = value,
        SensorChannel::Voltage3 => sensor.voltage[2] = value,
        SensorChannel::Temperature => sensor.temperature = value,
        SensorChannel::Power => {
            sensor.power = value;
            sensor.new_power = sensor.new_power.wrapping_add(1);
        }
        SensorChannel::CoulombCount => {
            sensor.previous_timestamp_cc = sensor.timestamp_cc;
            sensor.timestamp_cc = now_ms;
            sensor.current_counter = value;
        }
        SensorChannel::EnergyCount => sensor.energy_counter = value,
    }
}

fn apply_debug_command<S, C>(raw: u64, env: &mut RxEnv<'_, S, C>) -> Result<(), CanSignalError>
where
    S: MeasurementStore + ?Sized,
    C: BmsControl + ?Sized,
{
    let bytes = raw.to_le_bytes();

    match DebugCommand::try_from(bytes[0]) {
        Ok(DebugCommand::SetSoc) => {
            // 0.01 % per bit, high byte first
            let soc = f32::from(u16::from_be_bytes([bytes[1], bytes[2]])) / 100.0;
            let mut sox = *env.store.read_block(DataBlockId::Sox)?.as_sox()?;
            sox.soc_mean = soc;
            sox.soc_min = soc;
            sox.soc_max = soc;
            env.store.write_block(DataBlock::Sox(sox))?;
            debug!("SOC set to {:.2} % over CAN", soc);
        }
        Ok(DebugCommand::Balancing) => {
            let request = if bytes[1] == 0 {
                BalancingRequest::GlobalDisable
            } else {
                BalancingRequest::GlobalEnable
            };
            if env.control.set_state_request(request) == RequestStatus::Busy {
                warn!("balancing request {:?} rejected, state machine busy", request);
            }
        }
        Ok(DebugCommand::ModuleColumnConfig) => {
            let command =
                ModuleColumnCommand::decode(raw, env.config.module_count, env.config.column_count);
            env.control.apply_module_column_state(&command);
        }
        Ok(DebugCommand::CurrentCalibration) => env.control.request_current_calibration(),
        Ok(DebugCommand::HeartbeatPulse) => {
            if env.config.has_heartbeat {
                env.heartbeat.pulse_received(env.now_ms);
            } else {
                debug!("heartbeat pulse ignored, heartbeat monitoring disabled");
            }
        }
        Err(_) => debug!("ignoring unknown debug sub-command {}", bytes[0]),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CanSignalConfig;
    use crate::store::{InMemoryStore, SoxBlock};

    #[test]
    fn test_burst_context_reads_each_block_once() {
        let config = CanSignalConfig::standard(2);
        let store = InMemoryStore::new(&config);
        let mut ctx = BurstContext::new();

        assert!(!ctx.snapshot_taken(DataBlockId::Sox));
        ctx.block(&store, DataBlockId::Sox).unwrap();
        ctx.block(&store, DataBlockId::Sox).unwrap();
        assert!(ctx.snapshot_taken(DataBlockId::Sox));
        assert_eq!(store.read_count(), 1);

        ctx.reset();
        ctx.block(&store, DataBlockId::Sox).unwrap();
        assert_eq!(store.read_count(), 2);
    }

    #[test]
    fn test_snapshot_is_stable_within_a_burst() {
        let config = CanSignalConfig::standard(1);
        let mut store = InMemoryStore::new(&config);
        let mut ctx = BurstContext::new();

        ctx.block(&store, DataBlockId::Sox).unwrap();
        store
            .write_block(DataBlock::Sox(SoxBlock {
                soc_mean: 80.0,
                ..SoxBlock::default()
            }))
            .unwrap();

        let cached = ctx.block(&store, DataBlockId::Sox).unwrap().as_sox().unwrap().soc_mean;
        assert_eq!(cached, 0.0);
    }

    #[test]
    fn test_sensor_measurement_byte_order() {
        // 1000 sent MSB first: 00 00 03 E8
        let raw = u64::from(u32::from_le_bytes([0x00, 0x00, 0x03, 0xE8]));
        assert_eq!(sensor_measurement_value(raw), 1000);
        assert_eq!(sensor_measurement_raw(1000), raw);
        assert_eq!(sensor_measurement_value(sensor_measurement_raw(-42)), -42);
    }

    #[test]
    fn test_sensor_status_nibble() {
        let mut sensor = CurrentSensorBlock::default();

        apply_sensor_status(&mut sensor, SensorChannel::Power, 0x2F);
        assert_eq!(sensor.state_power, 1);
        assert_eq!(sensor.state_current, 0);

        // Low nibble alone clears every channel
        apply_sensor_status(&mut sensor, SensorChannel::Power, 0x0F);
        assert_eq!(sensor.state_power, 0);

        apply_sensor_status(&mut sensor, SensorChannel::Current, 0x80);
        assert_eq!(sensor.state_voltage, 1);
        assert_eq!(sensor.state_ec, 1);
    }

    #[test]
    fn test_limit_level_composition() {
        assert_eq!(limit_levels(1, 0, 0), 0b001);
        assert_eq!(limit_levels(0, 1, 1), 0b110);
    }
}
