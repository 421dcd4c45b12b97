use crate::config::CanSignalConfig;
use crate::control::{BmsControl, ModuleColumnCommand};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerState {
    Disconnected,
    Connected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatState {
    pub peer_state: PeerState,
    pub last_seen_ms: u32,
    /// Largest elapsed time seen while connected; cleared once disconnected.
    pub max_elapsed_ms: u32,
    pub timeout_count: u32,
    pub safe_state_commands: u32,
}

/// Outcome of one periodic check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatCheck {
    /// Monitoring disabled or peer not connected.
    Idle,
    Alive { elapsed_ms: u32 },
    TimedOut { elapsed_ms: u32, safe_state_issued: bool },
}

impl HeartbeatCheck {
    pub fn timed_out(&self) -> bool {
        matches!(self, HeartbeatCheck::TimedOut { .. })
    }
}

/// Watches heartbeat pulses from the bus peer and forces the balancing
/// hardware into its safe state once they stop.
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    state: HeartbeatState,
    enabled: bool,
    timeout_ms: u32,
    module_count: usize,
    column_count: usize,
    skip_if_disabled: bool,
}

impl HeartbeatMonitor {
    pub fn new(config: &CanSignalConfig) -> Self {
        Self {
            state: HeartbeatState {
                peer_state: PeerState::Disconnected,
                last_seen_ms: 0,
                max_elapsed_ms: 0,
                timeout_count: 0,
                safe_state_commands: 0,
            },
            enabled: config.has_heartbeat,
            timeout_ms: config.heartbeat_timeout_ms,
            module_count: config.module_count,
            column_count: config.column_count,
            skip_if_disabled: config.skip_safe_state_if_disabled,
        }
    }

    pub fn pulse_received(&mut self, now_ms: u32) {
        if self.state.peer_state == PeerState::Disconnected {
            info!("heartbeat peer connected at {} ms", now_ms);
        }
        self.state.peer_state = PeerState::Connected;
        self.state.last_seen_ms = now_ms;
    }

    pub fn periodic_check<C>(&mut self, now_ms: u32, control: &mut C) -> HeartbeatCheck
    where
        C: BmsControl + ?Sized,
    {
        if !self.enabled || self.state.peer_state == PeerState::Disconnected {
            self.state.max_elapsed_ms = 0;
            return HeartbeatCheck::Idle;
        }

        let elapsed_ms = now_ms.wrapping_sub(self.state.last_seen_ms);
        if elapsed_ms > self.state.max_elapsed_ms {
            self.state.max_elapsed_ms = elapsed_ms;
        }

        if elapsed_ms <= self.timeout_ms {
            return HeartbeatCheck::Alive { elapsed_ms };
        }

        warn!(
            "heartbeat lost after {} ms (timeout {} ms), forcing balancing safe state",
            elapsed_ms, self.timeout_ms
        );
        let safe_state_issued = self.issue_safe_state(control);
        self.state.peer_state = PeerState::Disconnected;
        self.state.timeout_count = self.state.timeout_count.saturating_add(1);

        HeartbeatCheck::TimedOut {
            elapsed_ms,
            safe_state_issued,
        }
    }

    /// Disable every module and switch every column off.
    ///
    /// Safe to repeat; skipped when the hardware already reports all disabled.
    pub fn issue_safe_state<C>(&mut self, control: &mut C) -> bool
    where
        C: BmsControl + ?Sized,
    {
        if self.skip_if_disabled && control.is_all_disabled() {
            info!("balancing hardware already disabled, safe state not re-sent");
            return false;
        }

        let command = ModuleColumnCommand::safe_state(self.module_count, self.column_count);
        control.apply_module_column_state(&command);
        self.state.safe_state_commands = self.state.safe_state_commands.saturating_add(1);
        true
    }

    pub fn is_connected(&self) -> bool {
        self.state.peer_state == PeerState::Connected
    }

    pub fn get_state(&self) -> &HeartbeatState {
        &self.state
    }

    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{BalancingRequest, RequestStatus};

    #[derive(Default)]
    struct CountingControl {
        commands: u32,
        all_disabled: bool,
    }

    impl BmsControl for CountingControl {
        fn set_state_request(&mut self, _request: BalancingRequest) -> RequestStatus {
            RequestStatus::Ok
        }

        fn apply_module_column_state(&mut self, _command: &ModuleColumnCommand) {
            self.commands += 1;
        }

        fn request_current_calibration(&mut self) {}

        fn send_boot_message(&mut self) {}

        fn is_all_disabled(&self) -> bool {
            self.all_disabled
        }
    }

    #[test]
    fn test_monitor_starts_disconnected() {
        let monitor = HeartbeatMonitor::new(&CanSignalConfig::default());
        assert!(!monitor.is_connected());
        assert_eq!(monitor.get_state().timeout_count, 0);
    }

    #[test]
    fn test_max_elapsed_cleared_while_disconnected() {
        let mut monitor = HeartbeatMonitor::new(&CanSignalConfig::default());
        let mut control = CountingControl::default();

        monitor.pulse_received(0);
        monitor.periodic_check(1500, &mut control);
        assert_eq!(monitor.get_state().max_elapsed_ms, 1500);

        monitor.periodic_check(5000, &mut control);
        assert_eq!(monitor.get_state().max_elapsed_ms, 5000);

        monitor.periodic_check(5010, &mut control);
        assert_eq!(monitor.get_state().max_elapsed_ms, 0);
    }

    #[test]
    fn test_safe_state_skipped_when_already_disabled() {
        let mut monitor = HeartbeatMonitor::new(&CanSignalConfig::default());
        let mut control = CountingControl {
            all_disabled: true,
            ..CountingControl::default()
        };

        monitor.pulse_received(0);
        let check = monitor.periodic_check(3000, &mut control);
        assert_eq!(
            check,
            HeartbeatCheck::TimedOut {
                elapsed_ms: 3000,
                safe_state_issued: false
            }
        );
        assert_eq!(control.commands, 0);
        assert!(!monitor.is_connected());
    }

    #[test]
    fn test_elapsed_time_survives_clock_wrap() {
        let mut monitor = HeartbeatMonitor::new(&CanSignalConfig::default());
        let mut control = CountingControl::default();

        monitor.pulse_received(u32::MAX - 500);
        let check = monitor.periodic_check(499, &mut control);
        assert_eq!(check, HeartbeatCheck::Alive { elapsed_ms: 1000 });
    }
}
