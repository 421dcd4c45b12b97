use bms_cansignal::control::{BalancingRequest, BmsControl, ModuleColumnCommand, RequestStatus};
use bms_cansignal::message::{Direction, MessageKind};
use bms_cansignal::resolver::CellSlot;
use bms_cansignal::store::{
    CellTemperatureBlock, CellVoltageBlock, CurrentSensorBlock, DataBlock, DataBlockId,
    IsometerBlock, MinMaxBlock, MovingAverageBlock, SofBlock, SoxBlock,
};
use bms_cansignal::{
    CanSignalConfig, CanSignalError, CanSignalLayer, CanSignalTables, InMemoryStore,
    MeasurementStore, StoreError,
};
use clap::{App, Arg, ArgMatches, SubCommand};
use colored::*;

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Prints every control request instead of touching hardware.
struct ConsoleControl;

impl BmsControl for ConsoleControl {
    fn set_state_request(&mut self, request: BalancingRequest) -> RequestStatus {
        println!("{} balancing request {:?}", "→".bright_cyan(), request);
        RequestStatus::Ok
    }

    fn apply_module_column_state(&mut self, command: &ModuleColumnCommand) {
        println!("{} modules {:?}", "→".bright_cyan(), command.modules);
        println!("{} columns {:?}", "→".bright_cyan(), command.columns);
    }

    fn request_current_calibration(&mut self) {
        println!("{} current sensor calibration requested", "→".bright_cyan());
    }

    fn send_boot_message(&mut self) {
        println!("{} boot message requested", "→".bright_cyan());
    }
}

fn main() -> CliResult {
    let matches = App::new("cansig")
        .version("0.1.0")
        .author("BMS Firmware Team")
        .about("🔋 BMS CAN signal tables - inspect, resolve, encode and decode")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON configuration (defaults to 25 modules, 6 columns)")
                .takes_value(true)
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("signals")
                .about("📋 List the signal table")
                .arg(
                    Arg::with_name("kind")
                        .short("k")
                        .long("kind")
                        .value_name("KIND")
                        .help("Table direction")
                        .takes_value(true)
                        .possible_values(&["tx", "rx"])
                        .default_value("tx"),
                ),
        )
        .subcommand(SubCommand::with_name("messages").about("📨 List tx and rx messages with timing"))
        .subcommand(
            SubCommand::with_name("resolve")
                .about("🔎 Resolve a tx signal index to module and cell")
                .arg(
                    Arg::with_name("index")
                        .help("Flat tx signal index")
                        .required(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("encode")
                .about("📤 Build one tx frame from a demo measurement store")
                .arg(
                    Arg::with_name("id")
                        .help("Message id in hex, e.g. 0x140")
                        .required(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("decode")
                .about("📥 Apply one rx frame to a demo measurement store")
                .arg(
                    Arg::with_name("id")
                        .help("Message id in hex, e.g. 0x100")
                        .required(true),
                )
                .arg(
                    Arg::with_name("data")
                        .help("Payload bytes in hex, e.g. 1E00000000000000")
                        .required(true),
                ),
        )
        .get_matches();

    let config = match matches.value_of("config") {
        Some(path) => CanSignalConfig::load(path)?,
        None => CanSignalConfig::default(),
    };

    match matches.subcommand() {
        ("signals", Some(sub)) => handle_signals(&config, sub),
        ("messages", Some(_)) => handle_messages(&config),
        ("resolve", Some(sub)) => handle_resolve(&config, sub),
        ("encode", Some(sub)) => handle_encode(config, sub),
        ("decode", Some(sub)) => handle_decode(config, sub),
        _ => {
            println!("{}", "No command specified. Use --help for usage information.".yellow());
            println!("{}", "Quick start:".bright_green());
            println!("  {} List the transmitted signals", "cansig signals".bright_cyan());
            println!("  {} Build the SOC frame", "cansig encode 0x140".bright_cyan());
            println!("  {} Send a heartbeat pulse", "cansig decode 0x100 1E".bright_cyan());
            Ok(())
        }
    }
}

fn handle_signals(config: &CanSignalConfig, matches: &ArgMatches<'_>) -> CliResult {
    let tables = CanSignalTables::build(config)?;
    let table = match matches.value_of("kind") {
        Some("rx") => &tables.rx,
        _ => &tables.tx,
    };

    println!(
        "{} {:?} signals ({})",
        "📋".bright_blue(),
        table.direction,
        table.len().to_string().bright_white().bold()
    );
    for (index, signal) in table.signals.iter().enumerate() {
        let handler = match (signal.getter, signal.setter) {
            (Some(getter), _) => format!("{:?}", getter),
            (None, Some(setter)) => format!("{:?}", setter),
            (None, None) => "-".to_string(),
        };
        println!(
            "{:>5} {} {:<32} {:>2}/{:<2} [{} .. {}] x{} +{} {}",
            index,
            format!("0x{:03X}", signal.message_id).bright_cyan(),
            signal.name,
            signal.bit_offset,
            signal.bit_length,
            signal.min,
            signal.max,
            signal.factor,
            signal.offset,
            handler.dimmed()
        );
    }
    Ok(())
}

fn handle_messages(config: &CanSignalConfig) -> CliResult {
    let tables = CanSignalTables::build(config)?;

    for table in [&tables.tx, &tables.rx] {
        println!("{} {:?} messages", "📨".bright_blue(), table.direction);
        for message in &table.messages {
            let timing = if message.direction == Direction::Tx {
                format!("{:>5} ms @ {:>3} ms", message.period_ms, message.phase_ms)
            } else {
                "on reception".to_string()
            };
            println!(
                "  {} {:<24} {} {:>2} signals",
                format!("0x{:03X}", message.id).bright_cyan(),
                message.kind.to_string(),
                timing,
                message.signals.len()
            );
        }
    }

    let shared = tables.overlapping_ids();
    if !shared.is_empty() {
        println!(
            "{} identifiers used in both directions: {:03X?}",
            "⚠️ ".yellow(),
            shared
        );
    }
    Ok(())
}

fn handle_resolve(config: &CanSignalConfig, matches: &ArgMatches<'_>) -> CliResult {
    let tables = CanSignalTables::build(config)?;
    let index: usize = matches.value_of("index").unwrap_or_default().parse()?;

    match tables.resolver.resolve_any(index) {
        Ok(resolved) => {
            let message = tables.tx.message_of(index).map(|m| m.kind.to_string());
            println!(
                "{} signal {} ({})",
                "🔎".bright_blue(),
                index.to_string().bright_white().bold(),
                message.unwrap_or_default()
            );
            println!("{} {:?}", "Quantity:".bright_white(), resolved.quantity);
            println!("{} {}", "Module:".bright_white(), resolved.module);
            println!("{} {}", "Group:".bright_white(), resolved.group());
            match resolved.slot {
                CellSlot::ValidFlags { group } => {
                    println!("{} valid flags of cells {}-{}", "Slot:".bright_white(), 3 * group, 3 * group + 2);
                }
                CellSlot::Cell { cell } => {
                    println!("{} cell {}", "Slot:".bright_white(), cell);
                    if let Some(offset) = resolved.array_offset() {
                        println!("{} {}", "Array offset:".bright_white(), offset);
                    }
                }
            }
            Ok(())
        }
        Err(e) => {
            println!("{} {}", "❌".red(), e.to_string().bright_red());
            Err(e.into())
        }
    }
}

fn handle_encode(config: CanSignalConfig, matches: &ArgMatches<'_>) -> CliResult {
    let id = parse_id(matches.value_of("id").unwrap_or_default())?;
    let store = demo_store(&config)?;
    let layer = CanSignalLayer::new(config, store, ConsoleControl)?;

    let message_index = layer
        .tables()
        .tx
        .message_index_by_id(id)
        .ok_or(CanSignalError::UnknownMessage(id))?;
    let frame = layer.build_frame(message_index)?;
    let message = &layer.tables().tx.messages[message_index];

    println!("{} {} {}", "📤".bright_blue(), message.kind.to_string().bold(), frame);
    let payload = frame.payload();
    for index in message.signals.clone() {
        let signal = layer.tables().tx.signal(index)?;
        let raw = signal.extract(payload);
        println!(
            "  {:<32} raw {:>10} -> {}",
            signal.name,
            raw,
            signal.decode(raw).to_string().bright_green()
        );
    }
    Ok(())
}

fn handle_decode(config: CanSignalConfig, matches: &ArgMatches<'_>) -> CliResult {
    let id = parse_id(matches.value_of("id").unwrap_or_default())?;
    let data = parse_hex(matches.value_of("data").unwrap_or_default())?;
    let store = demo_store(&config)?;
    let mut layer = CanSignalLayer::new(config, store, ConsoleControl)?;

    if !layer.receive(id, &data, 0)? {
        println!("{} 0x{:03X} is not an rx message", "⚠️ ".yellow(), id);
        return Ok(());
    }

    let kind = layer
        .tables()
        .rx
        .message_by_id(id)
        .map(|message| message.kind);
    let block = match kind {
        Some(MessageKind::StateRequest) => Some(DataBlockId::StateRequest),
        Some(MessageKind::CurrentSensor(_)) => Some(DataBlockId::CurrentSensor),
        Some(MessageKind::Debug) => Some(DataBlockId::Sox),
        _ => None,
    };

    println!("{} 0x{:03X} applied", "📥".bright_blue(), id);
    if let Some(block) = block {
        let record = layer.store().read_block(block)?;
        println!("{}", serde_json::to_string_pretty(&record)?);
    }
    if layer.heartbeat().is_connected() {
        println!("{} heartbeat peer connected", "💓".bright_green());
    }
    Ok(())
}

fn parse_id(text: &str) -> Result<u16, std::num::ParseIntError> {
    let digits = text.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16)
}

fn parse_hex(text: &str) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err("payload needs an even number of hex digits".into());
    }
    let mut bytes = Vec::with_capacity(digits.len() / 2);
    for pair in digits.as_bytes().chunks(2) {
        let pair = std::str::from_utf8(pair)?;
        bytes.push(u8::from_str_radix(pair, 16)?);
    }
    Ok(bytes)
}

/// Plausible pack readings so encoded frames are not all zero.
fn demo_store(config: &CanSignalConfig) -> Result<InMemoryStore, StoreError> {
    let mut store = InMemoryStore::new(config);
    let modules = config.module_count;

    store.write_block(DataBlock::CellVoltage(CellVoltageBlock {
        voltage: (0..config.cell_count()).map(|i| 3600 + (i % 12) as u16 * 10).collect(),
        valid_pecs: vec![0x0FFF; modules],
    }))?;
    store.write_block(DataBlock::CellTemperature(CellTemperatureBlock {
        temperature: (0..config.temperature_sensor_count())
            .map(|i| 20 + (i / 12) as i16)
            .collect(),
        valid_pecs: vec![0x0FFF; modules],
    }))?;
    store.write_block(DataBlock::Sox(SoxBlock {
        soc_mean: 64.2,
        soc_min: 61.0,
        soc_max: 66.8,
        soe: 63.0,
        soh: 98.5,
    }))?;
    store.write_block(DataBlock::MinMax(MinMaxBlock {
        voltage_mean: 3655,
        voltage_min: 3600,
        voltage_max: 3710,
        voltage_module_min: 0,
        voltage_module_max: 3,
        temperature_mean: 24.5,
        temperature_min: 20,
        temperature_max: 28,
        temperature_module_min: 0,
        temperature_module_max: 7,
    }))?;
    store.write_block(DataBlock::Sof(SofBlock {
        continuous_charge: 120.0,
        peak_charge: 240.0,
        continuous_discharge: 150.0,
        peak_discharge: 300.0,
    }))?;
    store.write_block(DataBlock::CurrentSensor(CurrentSensorBlock {
        current: -12.5,
        voltage: [398.5, 0.0, 397.2],
        ..CurrentSensorBlock::default()
    }))?;
    store.write_block(DataBlock::MovingAverage(MovingAverageBlock {
        power: [4980.0, 5010.0, 4995.0, 5002.0, 4999.0, 5000.0],
        current: [12.5, 12.6, 12.4, 12.5, 12.5, 12.5],
    }))?;
    store.write_block(DataBlock::Isometer(IsometerBlock {
        state: 1,
        resistance_kohm: 5000,
    }))?;
    Ok(store)
}
