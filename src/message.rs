use crate::config::FRAME_BYTES;
use crate::signal::{payload_from_bytes, payload_to_bytes};
use crate::store::SensorChannel;
use core::fmt;
use core::ops::Range;
use serde::{Deserialize, Serialize};

/// Hook applied to a tx payload after all signals are packed.
pub type FrameBuilder = fn(&mut [u8; FRAME_BYTES]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Tx,
    Rx,
}

/// Which per-module measurement a cell message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellQuantity {
    Voltage,
    Temperature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    SystemState(u8),
    SlaveState(u8),
    RecommendedCurrent,
    MaxAllowedPower,
    Soc,
    Soh,
    Soe,
    MinMaxCellVoltage,
    Sov,
    MinMaxCellTemperature,
    Tempering,
    Insulation,
    MovingAveragePower(u8),
    MovingAverageCurrent(u8),
    PackVoltage,
    CellGroup {
        quantity: CellQuantity,
        module: u8,
        group: u8,
    },
    CurrentTrigger,
    StateRequest,
    SoftwareReset,
    CurrentSensor(SensorChannel),
    Debug,
    ReleaseVersion,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::SystemState(n) => write!(f, "SystemState_{}", n),
            MessageKind::SlaveState(n) => write!(f, "SlaveState_{}", n),
            MessageKind::RecommendedCurrent => write!(f, "RecOperatingCurrent"),
            MessageKind::MaxAllowedPower => write!(f, "SOP"),
            MessageKind::Soc => write!(f, "SOC"),
            MessageKind::Soh => write!(f, "SOH"),
            MessageKind::Soe => write!(f, "SOE"),
            MessageKind::MinMaxCellVoltage => write!(f, "MinMaxCellVolt"),
            MessageKind::Sov => write!(f, "SOV"),
            MessageKind::MinMaxCellTemperature => write!(f, "MinMaxCellTemp"),
            MessageKind::Tempering => write!(f, "Tempering"),
            MessageKind::Insulation => write!(f, "Insulation"),
            MessageKind::MovingAveragePower(n) => write!(f, "Power_{}", n),
            MessageKind::MovingAverageCurrent(n) => write!(f, "Current_{}", n),
            MessageKind::PackVoltage => write!(f, "PackVoltage"),
            MessageKind::CellGroup {
                quantity: CellQuantity::Voltage,
                module,
                group,
            } => write!(f, "Mod{}_Cellvolt_{}", module, group),
            MessageKind::CellGroup {
                quantity: CellQuantity::Temperature,
                module,
                group,
            } => write!(f, "Mod{}_Celltemp_{}", module, group),
            MessageKind::CurrentTrigger => write!(f, "CurrentTrigger"),
            MessageKind::StateRequest => write!(f, "StateRequest"),
            MessageKind::SoftwareReset => write!(f, "SoftwareReset"),
            MessageKind::CurrentSensor(channel) => write!(f, "CurrentSensor_{:?}", channel),
            MessageKind::Debug => write!(f, "Debug"),
            MessageKind::ReleaseVersion => write!(f, "GetReleaseVersion"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageDescriptor {
    pub id: u16,
    pub kind: MessageKind,
    pub direction: Direction,
    pub length: u8,
    /// Zero for received messages.
    pub period_ms: u32,
    pub phase_ms: u32,
    /// Contiguous slice of the direction's signal table.
    pub signals: Range<usize>,
    #[serde(skip)]
    pub frame_builder: Option<FrameBuilder>,
}

impl MessageDescriptor {
    pub fn is_periodic(&self) -> bool {
        self.direction == Direction::Tx && self.period_ms > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanFrame {
    pub id: u16,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

impl CanFrame {
    pub fn new(id: u16, data: &[u8]) -> Self {
        Self {
            id,
            data: data.to_vec(),
        }
    }

    pub fn from_payload(id: u16, payload: u64) -> Self {
        Self::new(id, &payload_to_bytes(payload))
    }

    pub fn payload(&self) -> u64 {
        payload_from_bytes(&self.data)
    }
}

impl fmt::Display for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:03X} [{}]", self.id, self.data.len())?;
        for byte in &self.data {
            write!(f, " {:02X}", byte)?;
        }
        Ok(())
    }
}
