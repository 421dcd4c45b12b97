use bms_cansignal::control::{BalancingRequest, BmsControl, DebugCommand, ModuleColumnCommand, RequestStatus};
use bms_cansignal::dispatch::sensor_measurement_raw;
use bms_cansignal::store::SensorChannel;
use bms_cansignal::table::DEBUG_ID;
use bms_cansignal::{CanFrame, CanSignalConfig, CanSignalLayer, InMemoryStore};
use clap::{App, Arg};
use std::time::Duration;
use tokio::time;
use tracing::{debug, error, info, warn};

const PULSE_PERIOD_MS: u32 = 500;
const SENSOR_PERIOD_MS: u32 = 100;

/// Balancing control double that logs requests and remembers the last command.
#[derive(Default)]
struct LoggingControl {
    all_disabled: bool,
    commands: u32,
}

impl BmsControl for LoggingControl {
    fn set_state_request(&mut self, request: BalancingRequest) -> RequestStatus {
        info!("⚖️  balancing request {:?}", request);
        RequestStatus::Ok
    }

    fn apply_module_column_state(&mut self, command: &ModuleColumnCommand) {
        self.commands += 1;
        self.all_disabled = command.is_safe_state();
        if self.all_disabled {
            warn!("🛡️  safe state applied: {} modules disabled, {} columns off", command.modules.len(), command.columns.len());
        } else {
            info!("⚖️  module/column configuration {:?} / {:?}", command.modules, command.columns);
        }
    }

    fn request_current_calibration(&mut self) {
        info!("🔧 current sensor calibration requested");
    }

    fn send_boot_message(&mut self) {
        info!("📣 boot message requested");
    }

    fn is_all_disabled(&self) -> bool {
        self.all_disabled
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let matches = App::new("cansim")
        .version("0.1.0")
        .author("BMS Firmware Team")
        .about("🔋 Drives the CAN signal layer against a simulated bus peer")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON configuration")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("pulse-for")
                .short("p")
                .long("pulse-for")
                .value_name("SECONDS")
                .help("How long the peer keeps sending heartbeat pulses")
                .takes_value(true)
                .default_value("3"),
        )
        .arg(
            Arg::with_name("duration")
                .short("d")
                .long("duration")
                .value_name("SECONDS")
                .help("Total simulated time")
                .takes_value(true)
                .default_value("6"),
        )
        .get_matches();

    let config = match matches.value_of("config") {
        Some(path) => CanSignalConfig::load(path)?,
        None => CanSignalConfig::default(),
    };
    let pulse_for_ms = matches.value_of("pulse-for").unwrap_or("3").parse::<u32>()? * 1000;
    let duration_ms = matches.value_of("duration").unwrap_or("6").parse::<u32>()? * 1000;

    println!("🔋 BMS CAN Signal Simulator");
    println!("===========================");
    println!("   Modules: {}", config.module_count);
    println!("   Heartbeat timeout: {} ms", config.heartbeat_timeout_ms);
    println!("   Peer pulses for: {} ms", pulse_for_ms);

    let tick_ms = config.tick_ms;
    let store = InMemoryStore::new(&config);
    let mut layer = CanSignalLayer::new(config, store, LoggingControl::default())?;

    let mut interval = time::interval(Duration::from_millis(u64::from(tick_ms)));
    let mut now_ms = 0u32;
    let mut frames_sent = 0usize;
    let mut was_connected = false;

    while now_ms < duration_ms {
        interval.tick().await;

        if now_ms < pulse_for_ms && now_ms % PULSE_PERIOD_MS == 0 {
            let pulse = [u8::from(DebugCommand::HeartbeatPulse), 0, 0, 0, 0, 0, 0, 0];
            layer.receive(DEBUG_ID, &pulse, now_ms)?;
        }

        if now_ms % SENSOR_PERIOD_MS == 0 {
            // Pack current in mA, drifting slowly
            let current_ma = -12_500 + (now_ms / SENSOR_PERIOD_MS) as i32;
            let frame = CanFrame::from_payload(
                SensorChannel::Current.message_id(),
                sensor_measurement_raw(current_ma) << 16,
            );
            layer.receive(frame.id, &frame.data, now_ms)?;
        }

        match layer.tick(now_ms) {
            Ok(frames) => {
                for frame in &frames {
                    debug!("📡 {}", frame);
                }
                frames_sent += frames.len();
            }
            Err(e) => {
                error!("❌ Layer error: {}", e);
                break;
            }
        }

        let connected = layer.heartbeat().is_connected();
        if connected != was_connected {
            if connected {
                info!("💓 peer connected at {} ms", now_ms);
            } else {
                warn!("🛑 peer lost at {} ms", now_ms);
            }
            was_connected = connected;
        }

        now_ms += tick_ms;
    }

    println!("🏁 Simulation finished after {} ms", now_ms);
    println!("   Frames sent: {}", frames_sent);
    println!("   Module/column commands applied: {}", layer.control().commands);
    println!("{}", serde_json::to_string_pretty(layer.heartbeat().get_state())?);
    println!("{}", serde_json::to_string_pretty(layer.get_stats())?);

    Ok(())
}
