#![allow(dead_code)]

use bms_cansignal::control::{BalancingRequest, BmsControl, ModuleColumnCommand, RequestStatus};
use bms_cansignal::message::CanFrame;
use bms_cansignal::{CanSignalConfig, CanSignalLayer, InMemoryStore, SignalIndex};

/// Balancing control double recording every request it receives.
#[derive(Debug, Default)]
pub struct RecordingControl {
    pub state_requests: Vec<BalancingRequest>,
    pub module_column_commands: Vec<ModuleColumnCommand>,
    pub calibrations: u32,
    pub boot_messages: u32,
    pub all_disabled: bool,
    pub busy: bool,
}

impl RecordingControl {
    pub fn safe_state_commands(&self) -> usize {
        self.module_column_commands
            .iter()
            .filter(|command| command.is_safe_state())
            .count()
    }
}

impl BmsControl for RecordingControl {
    fn set_state_request(&mut self, request: BalancingRequest) -> RequestStatus {
        self.state_requests.push(request);
        if self.busy {
            RequestStatus::Busy
        } else {
            RequestStatus::Ok
        }
    }

    fn apply_module_column_state(&mut self, command: &ModuleColumnCommand) {
        self.module_column_commands.push(command.clone());
    }

    fn request_current_calibration(&mut self) {
        self.calibrations += 1;
    }

    fn send_boot_message(&mut self) {
        self.boot_messages += 1;
    }

    fn is_all_disabled(&self) -> bool {
        self.all_disabled
    }
}

pub type TestLayer = CanSignalLayer<InMemoryStore, RecordingControl>;

pub fn layer_with(config: CanSignalConfig) -> TestLayer {
    let store = InMemoryStore::new(&config);
    CanSignalLayer::new(config, store, RecordingControl::default()).unwrap()
}

/// Index of the `n`th signal of tx message `id`.
pub fn tx_signal(layer: &TestLayer, id: u16, n: usize) -> SignalIndex {
    layer.tables().tx.message_by_id(id).unwrap().signals.start + n
}

/// Index of the `n`th signal of rx message `id`.
pub fn rx_signal(layer: &TestLayer, id: u16, n: usize) -> SignalIndex {
    layer.tables().rx.message_by_id(id).unwrap().signals.start + n
}

pub fn build(layer: &TestLayer, id: u16) -> CanFrame {
    let index = layer.tables().tx.message_index_by_id(id).unwrap();
    layer.build_frame(index).unwrap()
}
