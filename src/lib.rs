//! # BMS CAN Signal Layer
//!
//! Signal tables and dispatch for the CAN interface of a battery management
//! system, plus the heartbeat watchdog that forces the balancing hardware
//! into a safe state when the bus peer goes quiet.
//!
//! ## Features
//!
//! - **Generated tables**: per-module cell messages stamped from one template,
//!   sized by a runtime [`CanSignalConfig`]
//! - **Index resolution**: flat signal index to module and cell
//! - **Limit clamp**: saturation to the signal range before scaling
//! - **Getter/setter dispatch**: one store snapshot per outgoing message,
//!   immediate write-through for received signals
//! - **Heartbeat monitor**: connected/disconnected tracking with a
//!   module/column safe-state command on timeout
//!
//! ## Quick Start
//!
//! ```rust
//! use bms_cansignal::{CanSignalConfig, CanSignalLayer, InMemoryStore};
//! # use bms_cansignal::control::{BalancingRequest, BmsControl, ModuleColumnCommand, RequestStatus};
//! # struct Hardware;
//! # impl BmsControl for Hardware {
//! #     fn set_state_request(&mut self, _: BalancingRequest) -> RequestStatus { RequestStatus::Ok }
//! #     fn apply_module_column_state(&mut self, _: &ModuleColumnCommand) {}
//! #     fn request_current_calibration(&mut self) {}
//! #     fn send_boot_message(&mut self) {}
//! # }
//!
//! let config = CanSignalConfig::standard(4);
//! let store = InMemoryStore::new(&config);
//! let mut layer = CanSignalLayer::new(config, store, Hardware).unwrap();
//!
//! // Heartbeat pulse on the debug message
//! layer.receive(0x100, &[30, 0, 0, 0, 0, 0, 0, 0], 0).unwrap();
//!
//! // Frames due on the first tick
//! for frame in layer.tick(0).unwrap() {
//!     println!("{}", frame);
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`layer`] - Orchestrator: scheduled tx builds and rx consumption
//! - [`table`] - Generated tx/rx message and signal tables
//! - [`resolver`] - Module/cell index resolution
//! - [`signal`] - Descriptors, clamp and bit packing
//! - [`dispatch`] - Getter/setter handlers and the per-burst snapshot cache
//! - [`heartbeat`] - Peer heartbeat watchdog
//! - [`scheduler`] - Period/phase tx scheduling
//! - [`store`] / [`control`] - Interfaces to the measurement database and balancing control

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]

pub mod config;
pub mod control;
pub mod dispatch;
pub mod error;
pub mod heartbeat;
pub mod layer;
pub mod message;
pub mod resolver;
pub mod scheduler;
pub mod signal;
pub mod store;
pub mod table;

// Re-export main public types for convenience
pub use config::CanSignalConfig;
pub use control::{BmsControl, ModuleColumnCommand};
pub use error::{CanSignalError, ConfigError, StoreError};
pub use heartbeat::{HeartbeatCheck, HeartbeatMonitor, PeerState};
pub use layer::CanSignalLayer;
pub use message::CanFrame;
pub use resolver::CellSignalResolver;
pub use signal::{clamp, SignalDescriptor, SignalIndex};
pub use store::{InMemoryStore, MeasurementStore};
pub use table::CanSignalTables;
