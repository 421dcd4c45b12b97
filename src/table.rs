//! Generated tx/rx message and signal tables.
//!
//! The fixed messages are listed once; the per-module cell messages are
//! stamped out from one template per quantity, in the order the receiving
//! side expects: standard modules, optional trigger signal, extended modules.

use crate::config::{CanSignalConfig, FRAME_BYTES, GROUPS_PER_MODULE, STANDARD_MODULES};
use crate::dispatch::{
    Getter, InsulationField, MinMaxField, OperatingCurrentField, PackVoltageTap, Setter,
    StateOfChargeField, StatusField,
};
use crate::error::{CanSignalError, ConfigError};
use crate::message::{CellQuantity, Direction, MessageDescriptor, MessageKind};
use crate::resolver::CellSignalResolver;
use crate::signal::{SignalDescriptor, SignalIndex};
use crate::store::{AverageWindow, SensorChannel};
use serde::Serialize;

pub const CELL_PERIOD_MS: u32 = 520;
pub const CELL_PHASE_START_MS: u32 = 20;
pub const CELL_PHASE_STEP_MS: u32 = 10;

pub const STATE_REQUEST_ID: u16 = 0x120;
pub const SOFTWARE_RESET_ID: u16 = 0x095;
pub const DEBUG_ID: u16 = 0x100;
pub const RELEASE_VERSION_ID: u16 = 0x777;
pub const CURRENT_TRIGGER_ID: u16 = 0x35B;

const MAX_STANDARD_ID: u16 = 0x7FF;

const TEMPERATURE_MIN: f64 = -128.0;
const TEMPERATURE_MAX: f64 = 527.35;
const TEMPERATURE_FACTOR: f64 = 100.0;
const TEMPERATURE_OFFSET: f64 = 128.0;

const AVERAGE_MIN: f64 = -2_500_000.0;
const AVERAGE_MAX: f64 = 4_292_467_295.0;
const AVERAGE_OFFSET: f64 = 2_500_000.0;

pub fn cell_message_id(quantity: CellQuantity, module: usize, group: usize) -> u16 {
    let base = if module < STANDARD_MODULES {
        0x200 + 0x20 * module
    } else {
        0x400 + 0x20 * (module - STANDARD_MODULES)
    };
    let quantity_offset = match quantity {
        CellQuantity::Voltage => 0,
        CellQuantity::Temperature => 0x10,
    };
    (base + quantity_offset + group) as u16
}

/// Modules are spread over the cell period, voltage first, temperature one step later.
pub fn cell_phase_ms(quantity: CellQuantity, module: usize) -> u32 {
    let slot = match quantity {
        CellQuantity::Voltage => 2 * module,
        CellQuantity::Temperature => 2 * module + 1,
    };
    CELL_PHASE_START_MS + CELL_PHASE_STEP_MS * slot as u32
}

#[derive(Debug, Clone, Serialize)]
pub struct SignalTable {
    pub direction: Direction,
    pub messages: Vec<MessageDescriptor>,
    pub signals: Vec<SignalDescriptor>,
}

impl SignalTable {
    fn new(direction: Direction) -> Self {
        Self {
            direction,
            messages: Vec::new(),
            signals: Vec::new(),
        }
    }

    fn push_message<I>(&mut self, id: u16, kind: MessageKind, period_ms: u32, phase_ms: u32, signals: I)
    where
        I: IntoIterator<Item = SignalDescriptor>,
    {
        let start = self.signals.len();
        self.signals.extend(signals.into_iter().map(|mut signal| {
            signal.message_id = id;
            signal
        }));
        self.messages.push(MessageDescriptor {
            id,
            kind,
            direction: self.direction,
            length: FRAME_BYTES as u8,
            period_ms,
            phase_ms,
            signals: start..self.signals.len(),
            frame_builder: None,
        });
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn signal(&self, index: SignalIndex) -> Result<&SignalDescriptor, CanSignalError> {
        self.signals
            .get(index)
            .ok_or(CanSignalError::UnknownSignal(index))
    }

    pub fn message_index_by_id(&self, id: u16) -> Option<usize> {
        self.messages.iter().position(|message| message.id == id)
    }

    pub fn message_by_id(&self, id: u16) -> Option<&MessageDescriptor> {
        self.messages.iter().find(|message| message.id == id)
    }

    /// Message owning signal `index`.
    pub fn message_of(&self, index: SignalIndex) -> Option<&MessageDescriptor> {
        let position = self
            .messages
            .partition_point(|message| message.signals.end <= index);
        self.messages
            .get(position)
            .filter(|message| message.signals.contains(&index))
    }

    /// Whether `index` starts its message, i.e. opens a new burst.
    pub fn is_first_signal(&self, index: SignalIndex) -> bool {
        self.message_of(index)
            .map_or(false, |message| message.signals.start == index)
    }

    fn validate(&self, tick_ms: u32) -> Result<(), ConfigError> {
        for (position, message) in self.messages.iter().enumerate() {
            if message.id > MAX_STANDARD_ID {
                return Err(ConfigError::InvalidMessageId(message.id));
            }
            if self.messages[..position].iter().any(|other| other.id == message.id) {
                return Err(ConfigError::DuplicateMessageId(message.id));
            }
            if message.direction == Direction::Tx {
                if message.period_ms == 0 || message.period_ms % tick_ms != 0 {
                    return Err(ConfigError::InvalidPeriod {
                        message_id: message.id,
                        period_ms: message.period_ms,
                        tick_ms,
                    });
                }
                if message.phase_ms % tick_ms != 0 {
                    return Err(ConfigError::InvalidPhase {
                        message_id: message.id,
                        phase_ms: message.phase_ms,
                        tick_ms,
                    });
                }
            }

            let mut occupied = 0u64;
            for index in message.signals.clone() {
                let signal = &self.signals[index];
                if !signal.fits_frame() {
                    return Err(ConfigError::SignalOutOfFrame {
                        index,
                        name: signal.name,
                        bit_offset: signal.bit_offset,
                        bit_length: signal.bit_length,
                    });
                }
                if occupied & signal.frame_mask() != 0 {
                    return Err(ConfigError::OverlappingSignals {
                        index,
                        name: signal.name,
                        message_id: message.id,
                    });
                }
                occupied |= signal.frame_mask();
            }
        }
        Ok(())
    }
}

/// Both directions plus the cell anchors, generated for one configuration.
#[derive(Debug, Clone, Serialize)]
pub struct CanSignalTables {
    pub tx: SignalTable,
    pub rx: SignalTable,
    pub resolver: CellSignalResolver,
}

impl CanSignalTables {
    pub fn build(config: &CanSignalConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let (tx, resolver) = build_tx(config);
        let rx = build_rx();
        tx.validate(config.tick_ms)?;
        rx.validate(config.tick_ms)?;

        Ok(Self { tx, rx, resolver })
    }

    /// Identifiers used by both directions.
    pub fn overlapping_ids(&self) -> Vec<u16> {
        self.tx
            .messages
            .iter()
            .map(|message| message.id)
            .filter(|&id| self.rx.message_by_id(id).is_some())
            .collect()
    }
}

fn status(name: &'static str, bit_offset: u8, field: StatusField) -> SignalDescriptor {
    SignalDescriptor::raw(name, bit_offset, 8).with_getter(Getter::Status(field))
}

fn temperature(name: &'static str, bit_offset: u8, getter: Getter) -> SignalDescriptor {
    SignalDescriptor::scaled(
        name,
        bit_offset,
        16,
        TEMPERATURE_MIN,
        TEMPERATURE_MAX,
        TEMPERATURE_FACTOR,
        TEMPERATURE_OFFSET,
    )
    .with_getter(getter)
}

fn moving_average(name: &'static str, bit_offset: u8, getter: Getter) -> SignalDescriptor {
    SignalDescriptor::scaled(name, bit_offset, 32, AVERAGE_MIN, AVERAGE_MAX, 1.0, AVERAGE_OFFSET)
        .with_getter(getter)
}

fn cell_group_signals(quantity: CellQuantity) -> [SignalDescriptor; 4] {
    match quantity {
        CellQuantity::Voltage => {
            let cell = |bit_offset| {
                SignalDescriptor::scaled("cell_voltage", bit_offset, 16, 0.0, 65535.0, 1.0, 0.0)
                    .with_getter(Getter::CellVoltage)
            };
            [
                SignalDescriptor::raw("cell_voltage_valid", 0, 8).with_getter(Getter::CellVoltage),
                cell(8),
                cell(24),
                cell(40),
            ]
        }
        CellQuantity::Temperature => [
            SignalDescriptor::raw("cell_temperature_valid", 0, 8)
                .with_getter(Getter::CellTemperature),
            temperature("cell_temperature", 8, Getter::CellTemperature),
            temperature("cell_temperature", 24, Getter::CellTemperature),
            temperature("cell_temperature", 40, Getter::CellTemperature),
        ],
    }
}

fn push_cell_module(table: &mut SignalTable, resolver: &mut CellSignalResolver, module: usize) {
    let mut anchors = [0; 2];
    for (anchor, quantity) in anchors
        .iter_mut()
        .zip([CellQuantity::Voltage, CellQuantity::Temperature])
    {
        *anchor = table.len();
        for group in 0..GROUPS_PER_MODULE {
            table.push_message(
                cell_message_id(quantity, module, group),
                MessageKind::CellGroup {
                    quantity,
                    module: module as u8,
                    group: group as u8,
                },
                CELL_PERIOD_MS,
                cell_phase_ms(quantity, module),
                cell_group_signals(quantity),
            );
        }
    }
    resolver.push_module(anchors[0], anchors[1]);
}

fn build_tx(config: &CanSignalConfig) -> (SignalTable, CellSignalResolver) {
    use StatusField::*;

    let mut table = SignalTable::new(Direction::Tx);
    let mut resolver = CellSignalResolver::new();

    table.push_message(
        0x110,
        MessageKind::SystemState(0),
        100,
        0,
        [
            status("general_error", 0, GeneralError),
            status("current_state", 8, CurrentState),
            status("error_overtemp_charge", 16, OverTemperatureCharge),
            status("error_undertemp_charge", 24, UnderTemperatureCharge),
            status("error_overtemp_discharge", 32, OverTemperatureDischarge),
            status("error_undertemp_discharge", 40, UnderTemperatureDischarge),
            status("error_overcurrent_charge", 48, OverCurrentCharge),
            status("error_overcurrent_discharge", 56, OverCurrentDischarge),
        ],
    );
    table.push_message(
        0x111,
        MessageKind::SystemState(1),
        100,
        0,
        [
            status("error_overvoltage", 0, OverVoltage),
            status("error_undervoltage", 8, UnderVoltage),
            status("error_temperature_mcu", 16, McuDieTemperature),
            status("error_contactor", 24, Contactor),
            status("error_selftest", 32, Selftest),
            status("error_cantiming", 40, CanTiming),
            status("current_sensor", 48, CurrentSensor),
            status("balancing_active", 56, BalancingActive),
        ],
    );
    table.push_message(
        0x112,
        MessageKind::SystemState(2),
        100,
        0,
        [
            SignalDescriptor::raw("state_contactor_interlock", 0, 16)
                .with_getter(Getter::Status(ContactorInterlock)),
            status("error_insulation", 16, Insulation),
            status("fuse_state", 24, FuseState),
            status("low_coin_cell_voltage", 32, LowCoinCellVoltage),
            status("error_open_wire", 40, OpenWire),
            status("daisy_chain", 48, DaisyChain),
        ],
    );
    table.push_message(
        0x115,
        MessageKind::SlaveState(0),
        100,
        0,
        [SignalDescriptor::raw("slave_states_0", 0, 64)],
    );
    table.push_message(
        0x116,
        MessageKind::SlaveState(1),
        100,
        0,
        [SignalDescriptor::raw("slave_states_1", 0, 64)],
    );

    let current = |name, bit_offset, field| {
        SignalDescriptor::scaled(name, bit_offset, 16, 0.0, 6553.5, 10.0, 0.0)
            .with_getter(Getter::RecommendedCurrent(field))
    };
    table.push_message(
        0x130,
        MessageKind::RecommendedCurrent,
        100,
        30,
        [
            current("continuous_charge_current", 0, OperatingCurrentField::ContinuousCharge),
            current("peak_charge_current", 16, OperatingCurrentField::PeakCharge),
            current("continuous_discharge_current", 32, OperatingCurrentField::ContinuousDischarge),
            current("peak_discharge_current", 48, OperatingCurrentField::PeakDischarge),
        ],
    );

    let power = |name, bit_offset| {
        SignalDescriptor::scaled(name, bit_offset, 16, 0.0, 6553.5, 10.0, 0.0)
            .with_getter(Getter::MaxAllowedPower)
    };
    table.push_message(
        0x131,
        MessageKind::MaxAllowedPower,
        100,
        30,
        [
            power("max_continuous_charge_power", 0),
            power("max_peak_charge_power", 16),
            power("max_continuous_discharge_power", 32),
            power("max_peak_discharge_power", 48),
        ],
    );

    let soc = |name, bit_offset, field| {
        SignalDescriptor::scaled(name, bit_offset, 16, 0.0, 100.0, 100.0, 0.0)
            .with_getter(Getter::Soc(field))
    };
    table.push_message(
        0x140,
        MessageKind::Soc,
        1000,
        30,
        [
            soc("soc_mean", 0, StateOfChargeField::Mean),
            soc("soc_min", 16, StateOfChargeField::Min),
            soc("soc_max", 32, StateOfChargeField::Max),
        ],
    );

    let percent = |name, bit_offset| SignalDescriptor::scaled(name, bit_offset, 16, 0.0, 100.0, 100.0, 0.0);
    table.push_message(
        0x150,
        MessageKind::Soh,
        5000,
        30,
        [percent("soh_mean", 0), percent("soh_min", 16), percent("soh_max", 32)],
    );
    table.push_message(
        0x160,
        MessageKind::Soe,
        1000,
        30,
        [percent("soe", 0), SignalDescriptor::raw("remaining_energy", 16, 32)],
    );

    let min_max_voltage = |name, bit_offset, bit_length, field| {
        SignalDescriptor::raw(name, bit_offset, bit_length)
            .with_getter(Getter::CellVoltageMinMax(field))
    };
    table.push_message(
        0x170,
        MessageKind::MinMaxCellVoltage,
        100,
        30,
        [
            min_max_voltage("mean_cell_voltage", 0, 16, MinMaxField::Mean),
            min_max_voltage("min_cell_voltage", 16, 16, MinMaxField::Min),
            min_max_voltage("max_cell_voltage", 32, 16, MinMaxField::Max),
            min_max_voltage("module_of_min_cell_voltage", 48, 8, MinMaxField::ModuleOfMin),
            min_max_voltage("module_of_max_cell_voltage", 56, 8, MinMaxField::ModuleOfMax),
        ],
    );
    table.push_message(0x171, MessageKind::Sov, 100, 30, [SignalDescriptor::raw("sov", 0, 16)]);

    table.push_message(
        0x180,
        MessageKind::MinMaxCellTemperature,
        100,
        30,
        [
            temperature("mean_cell_temperature", 0, Getter::CellTemperatureMinMax(MinMaxField::Mean)),
            temperature("min_cell_temperature", 16, Getter::CellTemperatureMinMax(MinMaxField::Min)),
            temperature("max_cell_temperature", 32, Getter::CellTemperatureMinMax(MinMaxField::Max)),
            SignalDescriptor::raw("module_of_min_cell_temperature", 48, 8)
                .with_getter(Getter::CellTemperatureMinMax(MinMaxField::ModuleOfMin)),
            SignalDescriptor::raw("module_of_max_cell_temperature", 56, 8)
                .with_getter(Getter::CellTemperatureMinMax(MinMaxField::ModuleOfMax)),
        ],
    );
    table.push_message(
        0x190,
        MessageKind::Tempering,
        1000,
        30,
        [
            SignalDescriptor::raw("cooling_active", 0, 8).with_getter(Getter::Tempering),
            SignalDescriptor::raw("heating_active", 8, 8).with_getter(Getter::Tempering),
            SignalDescriptor::raw("tempering_demand", 16, 32).with_getter(Getter::Tempering),
        ],
    );
    table.push_message(
        0x1A0,
        MessageKind::Insulation,
        1000,
        30,
        [
            SignalDescriptor::raw("insulation_status", 0, 8)
                .with_getter(Getter::Insulation(InsulationField::Status)),
            SignalDescriptor::raw("insulation_resistance", 8, 16)
                .with_getter(Getter::Insulation(InsulationField::Resistance)),
        ],
    );

    let windows = [
        (AverageWindow::OneSecond, AverageWindow::FiveSeconds),
        (AverageWindow::TenSeconds, AverageWindow::ThirtySeconds),
        (AverageWindow::SixtySeconds, AverageWindow::Configurable),
    ];
    for (n, &(first, second)) in windows.iter().enumerate() {
        table.push_message(
            0x1D0 + n as u16,
            MessageKind::MovingAveragePower(n as u8),
            1000,
            40,
            [
                moving_average("moving_average_power", 0, Getter::MovingAveragePower(first)),
                moving_average("moving_average_power", 32, Getter::MovingAveragePower(second)),
            ],
        );
    }
    for (n, &(first, second)) in windows.iter().enumerate() {
        table.push_message(
            0x1E0 + n as u16,
            MessageKind::MovingAverageCurrent(n as u8),
            1000,
            40,
            [
                moving_average("moving_average_current", 0, Getter::MovingAverageCurrent(first)),
                moving_average("moving_average_current", 32, Getter::MovingAverageCurrent(second)),
            ],
        );
    }
    table.push_message(
        0x1F0,
        MessageKind::PackVoltage,
        1000,
        40,
        [
            SignalDescriptor::raw("pack_voltage_battery", 0, 32)
                .with_getter(Getter::PackVoltage(PackVoltageTap::Battery)),
            SignalDescriptor::raw("pack_voltage_power_net", 32, 32)
                .with_getter(Getter::PackVoltage(PackVoltageTap::PowerNet)),
        ],
    );

    for module in 0..config.standard_module_count() {
        push_cell_module(&mut table, &mut resolver, module);
    }

    if config.has_trigger_sensor {
        table.push_message(
            CURRENT_TRIGGER_ID,
            MessageKind::CurrentTrigger,
            100,
            20,
            [SignalDescriptor::raw("current_sensor_trigger", 0, 32).with_getter(Getter::CurrentTrigger)],
        );
    }

    if config.has_extended_modules {
        for module in STANDARD_MODULES..config.module_count {
            push_cell_module(&mut table, &mut resolver, module);
        }
    }

    (table, resolver)
}

fn build_rx() -> SignalTable {
    let mut table = SignalTable::new(Direction::Rx);

    table.push_message(
        STATE_REQUEST_ID,
        MessageKind::StateRequest,
        0,
        0,
        [SignalDescriptor::raw("state_request", 8, 8).with_setter(Setter::StateRequest)],
    );
    table.push_message(SOFTWARE_RESET_ID, MessageKind::SoftwareReset, 0, 0, []);

    for channel in SensorChannel::ALL {
        let (min, max, factor) = match channel {
            SensorChannel::Voltage1 | SensorChannel::Voltage2 | SensorChannel::Voltage3 => {
                (0.0, f64::from(i32::MAX), 1.0)
            }
            SensorChannel::Temperature => (f64::from(i32::MIN), f64::from(i32::MAX), 0.1),
            _ => (f64::from(i32::MIN), f64::from(i32::MAX), 1.0),
        };
        table.push_message(
            channel.message_id(),
            MessageKind::CurrentSensor(channel),
            0,
            0,
            [
                SignalDescriptor::raw("mux_id", 0, 8),
                SignalDescriptor::raw("status", 8, 8).with_setter(Setter::SensorStatus(channel)),
                SignalDescriptor::scaled("measurement", 16, 32, min, max, factor, 0.0)
                    .with_setter(Setter::SensorMeasurement(channel)),
            ],
        );
    }

    table.push_message(
        DEBUG_ID,
        MessageKind::Debug,
        0,
        0,
        [SignalDescriptor::raw("debug_data", 0, 64).with_setter(Setter::Debug)],
    );
    table.push_message(
        RELEASE_VERSION_ID,
        MessageKind::ReleaseVersion,
        0,
        0,
        [SignalDescriptor::raw("release_version_request", 0, 64).with_setter(Setter::ReleaseVersion)],
    );

    table
}
