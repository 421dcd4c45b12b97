mod common;

use bms_cansignal::control::{BalancingRequest, ColumnState, DebugCommand, ModuleState};
use bms_cansignal::dispatch::sensor_measurement_raw;
use bms_cansignal::store::{DataBlock, DataBlockId, SensorChannel};
use bms_cansignal::table::{DEBUG_ID, RELEASE_VERSION_ID, SOFTWARE_RESET_ID, STATE_REQUEST_ID};
use bms_cansignal::*;
use common::*;

fn debug_frame(command: DebugCommand, rest: &[u8]) -> [u8; 8] {
    let mut data = [0u8; 8];
    data[0] = u8::from(command);
    data[1..=rest.len()].copy_from_slice(rest);
    data
}

/// `(time, id)` of every frame sent during `ticks` ticks.
fn run(layer: &mut TestLayer, ticks: u32) -> Vec<(u32, u16)> {
    let tick_ms = layer.config().tick_ms;
    let mut sent = Vec::new();
    for tick in 0..ticks {
        let now = tick * tick_ms;
        for frame in layer.tick(now).unwrap() {
            sent.push((now, frame.id));
        }
    }
    sent
}

fn times_of(sent: &[(u32, u16)], id: u16) -> Vec<u32> {
    sent.iter()
        .filter(|(_, frame_id)| *frame_id == id)
        .map(|(now, _)| *now)
        .collect()
}

#[test]
fn test_tick_follows_period_and_phase() {
    let mut layer = layer_with(CanSignalConfig::standard(1));
    let sent = run(&mut layer, 110);

    assert_eq!(times_of(&sent, 0x110), (0..1100).step_by(100).collect::<Vec<u32>>());
    assert_eq!(times_of(&sent, 0x140), vec![30, 1030]);
    assert_eq!(times_of(&sent, 0x150), vec![30]);
    assert_eq!(times_of(&sent, 0x1F0), vec![40, 1040]);
    assert_eq!(times_of(&sent, 0x200), vec![20, 540, 1060]);
    assert_eq!(times_of(&sent, 0x213), vec![30, 550, 1070]);

    let stats = layer.get_stats();
    assert_eq!(stats.frames_sent, sent.len() as u64);
    assert_eq!(layer.scheduler_stats().ticks, 110);
}

#[test]
fn test_heartbeat_loss_forces_safe_state_on_tick() {
    let mut layer = layer_with(CanSignalConfig::standard(4));

    let pulse = debug_frame(DebugCommand::HeartbeatPulse, &[]);
    assert_eq!(layer.receive(DEBUG_ID, &pulse, 0), Ok(true));
    assert!(layer.heartbeat().is_connected());

    layer.tick(1000).unwrap();
    assert!(layer.heartbeat().is_connected());
    assert!(layer.control().module_column_commands.is_empty());

    layer.tick(3200).unwrap();
    assert!(!layer.heartbeat().is_connected());
    assert_eq!(layer.control().safe_state_commands(), 1);
    assert_eq!(layer.get_stats().heartbeat_timeouts, 1);

    let command = &layer.control().module_column_commands[0];
    assert_eq!(command.modules.len(), 4);
    assert!(command.is_safe_state());
}

#[test]
fn test_pulse_ignored_without_heartbeat() {
    let config = CanSignalConfig {
        has_heartbeat: false,
        ..CanSignalConfig::standard(1)
    };
    let mut layer = layer_with(config);

    let pulse = debug_frame(DebugCommand::HeartbeatPulse, &[]);
    layer.receive(DEBUG_ID, &pulse, 0).unwrap();
    assert!(!layer.heartbeat().is_connected());

    layer.tick(10_000).unwrap();
    assert!(layer.control().module_column_commands.is_empty());
}

#[test]
fn test_debug_set_soc() {
    let mut layer = layer_with(CanSignalConfig::standard(1));

    // 0x190F = 6415 -> 64.15 %
    let frame = debug_frame(DebugCommand::SetSoc, &[0x19, 0x0F]);
    layer.receive(DEBUG_ID, &frame, 0).unwrap();

    let block = layer.store().read_block(DataBlockId::Sox).unwrap();
    let sox = block.as_sox().unwrap();
    assert!((sox.soc_mean - 64.15).abs() < 1e-4);
    assert_eq!(sox.soc_min, sox.soc_mean);
    assert_eq!(sox.soc_max, sox.soc_mean);
}

#[test]
fn test_debug_balancing_requests() {
    let mut layer = layer_with(CanSignalConfig::standard(1));

    layer
        .receive(DEBUG_ID, &debug_frame(DebugCommand::Balancing, &[1]), 0)
        .unwrap();
    layer
        .receive(DEBUG_ID, &debug_frame(DebugCommand::Balancing, &[0]), 0)
        .unwrap();

    // A busy state machine is logged, not an error
    layer.control_mut().busy = true;
    assert_eq!(
        layer.receive(DEBUG_ID, &debug_frame(DebugCommand::Balancing, &[1]), 0),
        Ok(true)
    );

    assert_eq!(
        layer.control().state_requests,
        vec![
            BalancingRequest::GlobalEnable,
            BalancingRequest::GlobalDisable,
            BalancingRequest::GlobalEnable
        ]
    );
}

#[test]
fn test_debug_module_column_configuration() {
    let mut layer = layer_with(CanSignalConfig::standard(3));

    // Module 0 enable, module 1 disable, module 2 bypass, column 0 on
    let config: u64 = 0b01 | (0b10 << 2) | (1 << 6);
    let payload = (config << 8) | u64::from(u8::from(DebugCommand::ModuleColumnConfig));
    layer.receive(DEBUG_ID, &payload.to_le_bytes(), 0).unwrap();

    let commands = &layer.control().module_column_commands;
    assert_eq!(commands.len(), 1);
    assert_eq!(
        commands[0].modules.as_slice(),
        &[ModuleState::Enable, ModuleState::Disable, ModuleState::Bypass]
    );
    assert_eq!(commands[0].columns[0], ColumnState::On);
    assert!(commands[0].columns[1..].iter().all(|&c| c == ColumnState::Off));
}

#[test]
fn test_debug_calibration_and_release_version() {
    let mut layer = layer_with(CanSignalConfig::standard(1));

    layer
        .receive(DEBUG_ID, &debug_frame(DebugCommand::CurrentCalibration, &[]), 0)
        .unwrap();
    layer.receive(RELEASE_VERSION_ID, &[0; 8], 0).unwrap();

    assert_eq!(layer.control().calibrations, 1);
    assert_eq!(layer.control().boot_messages, 1);
}

#[test]
fn test_unknown_debug_command_is_ignored() {
    let mut layer = layer_with(CanSignalConfig::standard(1));
    let writes = layer.store().write_count();

    assert_eq!(layer.receive(DEBUG_ID, &[99, 1, 2, 3, 4, 5, 6, 7], 0), Ok(true));
    assert_eq!(layer.store().write_count(), writes);
    assert!(layer.control().state_requests.is_empty());
}

#[test]
fn test_state_request_rearm() {
    let mut layer = layer_with(CanSignalConfig::standard(1));
    let read_request = |layer: &TestLayer| {
        *layer
            .store()
            .read_block(DataBlockId::StateRequest)
            .unwrap()
            .as_state_request()
            .unwrap()
    };

    // Short frame, missing bytes read as zero
    layer.receive(STATE_REQUEST_ID, &[0, 3], 0).unwrap();
    let request = read_request(&layer);
    assert_eq!(request.state_request, 3);
    assert_eq!(request.state_request_pending, 3);
    assert_eq!(request.state, 1);

    // Consumer takes the pending request
    let mut taken = request;
    taken.state_request_pending = 0;
    layer
        .store_mut()
        .write_block(DataBlock::StateRequest(taken))
        .unwrap();

    // Same request repeated quickly does not re-arm
    layer.receive(STATE_REQUEST_ID, &[0, 3], 1000).unwrap();
    assert_eq!(read_request(&layer).state_request_pending, 0);

    // Repeated after the repeat window it does
    layer.receive(STATE_REQUEST_ID, &[0, 3], 5000).unwrap();
    assert_eq!(read_request(&layer).state_request_pending, 3);

    // A different request always re-arms
    layer.receive(STATE_REQUEST_ID, &[0, 4], 5010).unwrap();
    let request = read_request(&layer);
    assert_eq!(request.state_request_pending, 4);
    assert_eq!(request.previous_state_request, 3);
    assert_eq!(request.state, 4);
}

#[test]
fn test_sensor_frames_update_store() {
    let mut layer = layer_with(CanSignalConfig::standard(1));

    let payload = (sensor_measurement_raw(3971) << 16) | (0x20 << 8);
    let frame = CanFrame::from_payload(SensorChannel::Voltage3.message_id(), payload);
    layer.receive(frame.id, &frame.data, 0).unwrap();

    let block = layer.store().read_block(DataBlockId::CurrentSensor).unwrap();
    let sensor = block.as_current_sensor().unwrap();
    assert_eq!(sensor.voltage[2], 3971.0);
    assert_eq!(sensor.state_voltage, 1);
    assert_eq!(sensor.state_current, 0);

    // Power net voltage follows on the next pack voltage frame
    let pack = build(&layer, 0x1F0).payload();
    assert_eq!(pack >> 32, 3971);
}

#[test]
fn test_sensor_error_bits_invalidate_every_channel() {
    let mut layer = layer_with(CanSignalConfig::standard(1));

    let frame = CanFrame::from_payload(SensorChannel::Power.message_id(), 0x80 << 8);
    layer.receive(frame.id, &frame.data, 0).unwrap();

    let block = layer.store().read_block(DataBlockId::CurrentSensor).unwrap();
    let sensor = block.as_current_sensor().unwrap();
    assert_eq!(sensor.state_current, 1);
    assert_eq!(sensor.state_temperature, 1);
    assert_eq!(sensor.state_ec, 1);
}

#[test]
fn test_software_reset_has_no_signals() {
    let mut layer = layer_with(CanSignalConfig::standard(1));
    let writes = layer.store().write_count();

    assert_eq!(layer.receive(SOFTWARE_RESET_ID, &[], 0), Ok(true));
    assert_eq!(layer.store().write_count(), writes);
    assert_eq!(layer.get_stats().frames_received, 1);
}

#[test]
fn test_shared_ids_are_received_as_sensor_frames() {
    let mut layer = layer_with(CanSignalConfig::default());
    assert_eq!(layer.tables().overlapping_ids(), vec![0x521, 0x522, 0x523]);

    let frame = CanFrame::from_payload(0x521, sensor_measurement_raw(-250) << 16);
    assert_eq!(layer.receive(frame.id, &frame.data, 0), Ok(true));

    let block = layer.store().read_block(DataBlockId::CurrentSensor).unwrap();
    assert_eq!(block.as_current_sensor().unwrap().current, -250.0);
}

#[test]
fn test_invalid_configuration_is_rejected() {
    let config = CanSignalConfig::standard(12);
    let result = CanSignalLayer::new(
        config,
        InMemoryStore::empty(),
        RecordingControl::default(),
    );
    assert!(matches!(
        result,
        Err(CanSignalError::Config(ConfigError::ExtendedModulesDisabled(12)))
    ));
}
