use crate::config::{CanSignalConfig, FRAME_BYTES};
use crate::control::BmsControl;
use crate::dispatch::{BurstContext, RxEnv, SignalValue, TxEnv};
use crate::error::CanSignalError;
use crate::heartbeat::{HeartbeatCheck, HeartbeatMonitor};
use crate::message::{CanFrame, MessageKind};
use crate::resolver::CellSignalResolver;
use crate::scheduler::{SchedulerStats, TxScheduler};
use crate::signal::{payload_from_bytes, payload_to_bytes, value_mask, SignalIndex};
use crate::store::MeasurementStore;
use crate::table::CanSignalTables;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct LayerStats {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub frames_ignored: u64,
    pub signals_dispatched: u64,
    pub heartbeat_timeouts: u32,
}

/// CAN signal layer of the BMS.
///
/// Owns the generated tables and drives both directions: [`tick`](Self::tick)
/// builds every tx message due on the schedule, [`receive`](Self::receive)
/// hands incoming frames to the setters. The measurement store and the
/// balancing control stay external collaborators behind their traits.
pub struct CanSignalLayer<S, C> {
    config: CanSignalConfig,
    tables: CanSignalTables,
    heartbeat: HeartbeatMonitor,
    scheduler: TxScheduler,
    store: S,
    control: C,
    stats: LayerStats,
}

impl<S, C> CanSignalLayer<S, C>
where
    S: MeasurementStore,
    C: BmsControl,
{
    pub fn new(config: CanSignalConfig, store: S, control: C) -> Result<Self, CanSignalError> {
        let tables = CanSignalTables::build(&config)?;

        let shared = tables.overlapping_ids();
        if !shared.is_empty() {
            warn!(
                "tx and rx tables share identifiers {:03X?}, frames on these ids are ambiguous on the bus",
                shared
            );
        }

        info!(
            "CAN signal layer ready: {} modules, {} tx messages / {} signals, {} rx messages",
            config.module_count,
            tables.tx.messages.len(),
            tables.tx.len(),
            tables.rx.messages.len()
        );

        Ok(Self {
            heartbeat: HeartbeatMonitor::new(&config),
            scheduler: TxScheduler::new(config.tick_ms),
            config,
            tables,
            store,
            control,
            stats: LayerStats::default(),
        })
    }

    /// One scheduler tick: heartbeat check, then every tx message due now.
    pub fn tick(&mut self, now_ms: u32) -> Result<Vec<CanFrame>, CanSignalError> {
        if self.config.has_heartbeat {
            let check = self.heartbeat.periodic_check(now_ms, &mut self.control);
            if let HeartbeatCheck::TimedOut { .. } = check {
                self.stats.heartbeat_timeouts = self.stats.heartbeat_timeouts.saturating_add(1);
            }
        }

        let due = self.scheduler.due_messages(&self.tables.tx.messages);
        let mut frames = Vec::with_capacity(due.len());
        for message_index in due {
            frames.push(self.build_frame(message_index)?);
        }

        self.stats.frames_sent += frames.len() as u64;
        Ok(frames)
    }

    /// Pack all signals of tx message `message_index` from one store snapshot.
    pub fn build_frame(&self, message_index: usize) -> Result<CanFrame, CanSignalError> {
        let message = self
            .tables
            .tx
            .messages
            .get(message_index)
            .ok_or(CanSignalError::UnknownMessageIndex(message_index))?;

        let mut ctx = BurstContext::new();
        let mut payload = 0u64;
        for index in message.signals.clone() {
            let raw = self.get(&mut ctx, index)?;
            self.tables.tx.signal(index)?.insert(&mut payload, raw);
        }

        let mut bytes = payload_to_bytes(payload);
        if let Some(frame_builder) = message.frame_builder {
            frame_builder(&mut bytes);
        }

        let frame = CanFrame::new(message.id, &bytes[..usize::from(message.length).min(FRAME_BYTES)]);
        debug!("{} {}", message.kind, frame);
        Ok(frame)
    }

    /// Raw bits for tx signal `index`.
    ///
    /// The first signal of a message starts a new burst and drops any
    /// snapshot left in `ctx`.
    pub fn get(&self, ctx: &mut BurstContext, index: SignalIndex) -> Result<u64, CanSignalError> {
        let signal = self.tables.tx.signal(index)?;
        if self.tables.tx.is_first_signal(index) {
            ctx.reset();
        }

        let getter = match signal.getter {
            Some(getter) => getter,
            None => return Ok(0),
        };

        let env = TxEnv {
            store: &self.store,
            resolver: &self.tables.resolver,
            config: &self.config,
        };
        let raw = match getter.produce(&env, ctx, index)? {
            SignalValue::Physical(value) => signal.encode(value),
            SignalValue::Raw(bits) => bits & value_mask(signal.bit_length),
        };
        Ok(raw)
    }

    /// Hand the extracted bits of rx signal `index` to its setter.
    pub fn set(&mut self, index: SignalIndex, raw: u64, now_ms: u32) -> Result<(), CanSignalError> {
        let signal = *self.tables.rx.signal(index)?;
        let setter = match signal.setter {
            Some(setter) => setter,
            None => return Ok(()),
        };

        let mut env = RxEnv {
            store: &mut self.store,
            control: &mut self.control,
            heartbeat: &mut self.heartbeat,
            config: &self.config,
            now_ms,
        };
        setter.consume(&signal, raw, &mut env)?;
        self.stats.signals_dispatched += 1;
        Ok(())
    }

    /// Consume one received frame. Returns `false` for identifiers the rx
    /// table does not know.
    pub fn receive(&mut self, id: u16, data: &[u8], now_ms: u32) -> Result<bool, CanSignalError> {
        if data.len() > FRAME_BYTES {
            return Err(CanSignalError::FrameTooLong { id, len: data.len() });
        }

        let message = match self.tables.rx.message_by_id(id) {
            Some(message) => message,
            None => {
                debug!("ignoring frame 0x{:03X}, not an rx message", id);
                self.stats.frames_ignored += 1;
                return Ok(false);
            }
        };

        if message.kind == MessageKind::SoftwareReset {
            info!("software reset requested over CAN");
        }

        let signals = message.signals.clone();
        let payload = payload_from_bytes(data);
        for index in signals {
            let raw = self.tables.rx.signal(index)?.extract(payload);
            self.set(index, raw, now_ms)?;
        }

        self.stats.frames_received += 1;
        Ok(true)
    }

    pub fn config(&self) -> &CanSignalConfig {
        &self.config
    }

    pub fn tables(&self) -> &CanSignalTables {
        &self.tables
    }

    pub fn resolver(&self) -> &CellSignalResolver {
        &self.tables.resolver
    }

    pub fn heartbeat(&self) -> &HeartbeatMonitor {
        &self.heartbeat
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn control(&self) -> &C {
        &self.control
    }

    pub fn control_mut(&mut self) -> &mut C {
        &mut self.control
    }

    pub fn get_stats(&self) -> &LayerStats {
        &self.stats
    }

    pub fn scheduler_stats(&self) -> &SchedulerStats {
        self.scheduler.get_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{BalancingRequest, ModuleColumnCommand, RequestStatus};
    use crate::store::InMemoryStore;

    struct NullControl;

    impl BmsControl for NullControl {
        fn set_state_request(&mut self, _request: BalancingRequest) -> RequestStatus {
            RequestStatus::Ok
        }

        fn apply_module_column_state(&mut self, _command: &ModuleColumnCommand) {}

        fn request_current_calibration(&mut self) {}

        fn send_boot_message(&mut self) {}
    }

    fn layer() -> CanSignalLayer<InMemoryStore, NullControl> {
        let config = CanSignalConfig::standard(2);
        let store = InMemoryStore::new(&config);
        CanSignalLayer::new(config, store, NullControl).unwrap()
    }

    #[test]
    fn test_first_tick_sends_phase_zero_messages() {
        let mut layer = layer();
        let frames = layer.tick(0).unwrap();

        let ids: Vec<u16> = frames.iter().map(|frame| frame.id).collect();
        assert_eq!(ids, vec![0x110, 0x111, 0x112, 0x115, 0x116]);
        assert!(frames.iter().all(|frame| frame.data.len() == 8));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut layer = layer();
        let result = layer.receive(0x100, &[0; 9], 0);
        assert_eq!(result, Err(CanSignalError::FrameTooLong { id: 0x100, len: 9 }));
    }

    #[test]
    fn test_unknown_rx_id_is_ignored() {
        let mut layer = layer();
        assert_eq!(layer.receive(0x7AB, &[1, 2, 3], 0), Ok(false));
        assert_eq!(layer.get_stats().frames_ignored, 1);
    }

    #[test]
    fn test_unknown_message_index() {
        let layer = layer();
        let count = layer.tables().tx.messages.len();
        assert!(matches!(
            layer.build_frame(count),
            Err(CanSignalError::UnknownMessageIndex(_))
        ));
    }
}
