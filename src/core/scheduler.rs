//! Auto-start scheduler - tick-driven launch countdown

use tracing::info;

/// Result of one one-second tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerTick {
    /// No countdown armed.
    Disabled,
    /// Counting down; the contained value is the remaining seconds.
    Counting(u32),
    /// The countdown just reached zero; fire the launch exactly once.
    Fire,
}

/// Countdown that triggers one automatic launch after a configurable delay.
///
/// Re-enabling while counting restarts from the configured delay; firing
/// disarms the scheduler (no auto-repeat).
#[derive(Debug, Default)]
pub struct AutoStartScheduler {
    remaining: Option<u32>,
}

impl AutoStartScheduler {
    /// Arm (or re-arm) the countdown.
    pub fn enable(&mut self, delay_secs: u32) {
        self.remaining = Some(delay_secs);
        info!("Auto-start armed: launching in {}s", delay_secs);
    }

    /// Cancel any in-flight countdown.
    pub fn disable(&mut self) {
        if self.remaining.take().is_some() {
            info!("Auto-start cancelled");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.remaining.is_some()
    }

    /// Advance the countdown by one second.
    pub fn tick(&mut self) -> SchedulerTick {
        match self.remaining {
            None => SchedulerTick::Disabled,
            Some(remaining) => {
                let next = remaining.saturating_sub(1);
                if next == 0 {
                    self.remaining = None;
                    SchedulerTick::Fire
                } else {
                    self.remaining = Some(next);
                    SchedulerTick::Counting(next)
                }
            }
        }
    }
}
