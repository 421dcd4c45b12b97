use crate::message::MessageDescriptor;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub frames_scheduled: u64,
    pub busiest_tick: u32,
}

/// Decides which periodic tx messages are due on each fixed-rate tick.
#[derive(Debug)]
pub struct TxScheduler {
    tick_ms: u32,
    counter_ms: u64,
    stats: SchedulerStats,
}

impl TxScheduler {
    pub fn new(tick_ms: u32) -> Self {
        // Tables are validated against the tick, zero never gets here
        debug_assert!(tick_ms > 0, "scheduler tick must be positive");

        Self {
            tick_ms,
            counter_ms: 0,
            stats: SchedulerStats::default(),
        }
    }

    /// Whether `message` is due at the current counter value.
    pub fn is_due(&self, message: &MessageDescriptor) -> bool {
        if !message.is_periodic() {
            return false;
        }
        let phase = u64::from(message.phase_ms);
        self.counter_ms >= phase && (self.counter_ms - phase) % u64::from(message.period_ms) == 0
    }

    /// Indices of the messages due this tick; advances the counter by one tick.
    pub fn due_messages(&mut self, messages: &[MessageDescriptor]) -> Vec<usize> {
        let due: Vec<usize> = messages
            .iter()
            .enumerate()
            .filter(|(_, message)| self.is_due(message))
            .map(|(index, _)| index)
            .collect();

        self.counter_ms += u64::from(self.tick_ms);
        self.stats.ticks += 1;
        self.stats.frames_scheduled += due.len() as u64;
        self.stats.busiest_tick = self.stats.busiest_tick.max(due.len() as u32);

        due
    }

    /// Milliseconds of schedule already walked.
    pub fn elapsed_ms(&self) -> u64 {
        self.counter_ms
    }

    pub fn tick_ms(&self) -> u32 {
        self.tick_ms
    }

    /// Get scheduler statistics
    pub fn get_stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Restart the schedule from phase zero
    pub fn reset(&mut self) {
        self.counter_ms = 0;
        self.stats = SchedulerStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Direction, MessageKind};

    fn message(period_ms: u32, phase_ms: u32, direction: Direction) -> MessageDescriptor {
        MessageDescriptor {
            id: 0x110,
            kind: MessageKind::Soc,
            direction,
            length: 8,
            period_ms,
            phase_ms,
            signals: 0..1,
            frame_builder: None,
        }
    }

    #[test]
    fn test_phase_delays_first_transmission() {
        let mut scheduler = TxScheduler::new(10);
        let messages = [message(100, 30, Direction::Tx)];

        let mut due_at = Vec::new();
        for _ in 0..25 {
            let now = scheduler.elapsed_ms();
            if !scheduler.due_messages(&messages).is_empty() {
                due_at.push(now);
            }
        }

        assert_eq!(due_at, vec![30, 130, 230]);
    }

    #[test]
    fn test_rx_messages_are_never_due() {
        let mut scheduler = TxScheduler::new(10);
        let messages = [message(0, 0, Direction::Rx)];

        assert!(scheduler.due_messages(&messages).is_empty());
        assert_eq!(scheduler.get_stats().ticks, 1);
    }

    #[test]
    fn test_stats_and_reset() {
        let mut scheduler = TxScheduler::new(10);
        let messages = [message(10, 0, Direction::Tx), message(20, 0, Direction::Tx)];

        scheduler.due_messages(&messages);
        scheduler.due_messages(&messages);
        assert_eq!(scheduler.get_stats().frames_scheduled, 3);
        assert_eq!(scheduler.get_stats().busiest_tick, 2);

        scheduler.reset();
        assert_eq!(scheduler.elapsed_ms(), 0);
        assert_eq!(scheduler.get_stats().ticks, 0);
    }
}
