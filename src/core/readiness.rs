//! Readiness detection - resident-memory threshold heuristic
//!
//! A launcher whose working set has grown past the configured threshold is
//! treated as "fully loaded". This is a proxy, not a guarantee; running out
//! of the attempt or time budget is a warning, never a fatal error.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::platform::ProcessQuery;

const POLL_INTERVAL: Duration = Duration::from_secs(2);
const MAX_ATTEMPTS: u32 = 60;

/// Result of one readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessOutcome {
    /// Resident memory crossed the threshold.
    Ready { elapsed: Duration },
    /// The process was seen but never crossed the threshold in budget.
    TimedOut,
    /// The process was never observed at all.
    ProcessNeverAppeared,
}

/// Progress reported while waiting, for display purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessProgress {
    Searching {
        attempt: u32,
        max_attempts: u32,
    },
    Loading {
        /// Capped at 99 until the threshold is actually crossed
        percent: u8,
        resident_bytes: u64,
        threshold_bytes: u64,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct ReadinessDetector {
    poll_interval: Duration,
    max_attempts: u32,
}

impl Default for ReadinessDetector {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            max_attempts: MAX_ATTEMPTS,
        }
    }
}

impl ReadinessDetector {
    /// Wait until the process named by `variants` exceeds `threshold_bytes`
    /// of resident memory, up to the attempt budget and `max_wait`.
    pub async fn await_ready(
        &self,
        query: &mut dyn ProcessQuery,
        variants: &[String],
        threshold_bytes: u64,
        max_wait: Duration,
        mut progress: impl FnMut(ReadinessProgress),
    ) -> ReadinessOutcome {
        info!(
            "Waiting for launcher readiness (threshold {} MB, max {}s)",
            threshold_bytes / 1024 / 1024,
            max_wait.as_secs()
        );

        let started = Instant::now();
        let mut seen = false;
        let mut attempt = 0;

        while attempt < self.max_attempts {
            attempt += 1;
            if started.elapsed() > max_wait {
                warn!(
                    "Readiness wait exceeded {}s, giving up",
                    max_wait.as_secs()
                );
                break;
            }

            query.refresh();
            match query.find_by_name(variants) {
                Some(info) => {
                    seen = true;
                    if info.resident_bytes > threshold_bytes {
                        let elapsed = started.elapsed();
                        info!(
                            "Launcher fully loaded: {} MB resident after {:.1}s",
                            info.resident_bytes / 1024 / 1024,
                            elapsed.as_secs_f64()
                        );
                        return ReadinessOutcome::Ready { elapsed };
                    }

                    let percent =
                        (info.resident_bytes.saturating_mul(100) / threshold_bytes).min(99) as u8;
                    debug!(
                        "Launcher loading: {} MB of {} MB ({}%), attempt {}/{}",
                        info.resident_bytes / 1024 / 1024,
                        threshold_bytes / 1024 / 1024,
                        percent,
                        attempt,
                        self.max_attempts
                    );
                    progress(ReadinessProgress::Loading {
                        percent,
                        resident_bytes: info.resident_bytes,
                        threshold_bytes,
                    });
                }
                None => {
                    debug!(
                        "Launcher process not found yet, attempt {}/{}",
                        attempt, self.max_attempts
                    );
                    progress(ReadinessProgress::Searching {
                        attempt,
                        max_attempts: self.max_attempts,
                    });
                }
            }

            sleep(self.poll_interval).await;
        }

        if seen {
            warn!(
                "Launcher never crossed the readiness threshold within {} attempts",
                self.max_attempts
            );
            ReadinessOutcome::TimedOut
        } else {
            warn!("Launcher process never appeared during the readiness wait");
            ReadinessOutcome::ProcessNeverAppeared
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testutil::{process, ScriptedQuery};

    const MB: u64 = 1024 * 1024;

    fn launcher_names() -> Vec<String> {
        vec!["launcher".to_string()]
    }

    #[tokio::test(start_paused = true)]
    async fn ready_as_soon_as_threshold_is_first_exceeded() {
        // 30 MB, 50 MB, then 71 MB: crossing happens on the third poll
        let mut query = ScriptedQuery::new(vec![
            vec![process("launcher", 10, 30 * MB)],
            vec![process("launcher", 10, 50 * MB)],
            vec![process("launcher", 10, 71 * MB)],
        ]);

        let mut percents = Vec::new();
        let outcome = ReadinessDetector::default()
            .await_ready(
                &mut query,
                &launcher_names(),
                70 * MB,
                Duration::from_secs(120),
                |p| {
                    if let ReadinessProgress::Loading { percent, .. } = p {
                        percents.push(percent);
                    }
                },
            )
            .await;

        assert!(matches!(outcome, ReadinessOutcome::Ready { elapsed } if elapsed >= Duration::from_secs(4)));
        // Progress is monotone and capped below 100
        assert_eq!(percents, vec![42, 71]);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_memory_plateaus_below_threshold() {
        // Capped at 50 MB forever: the 60-attempt budget runs dry
        let mut query = ScriptedQuery::new(vec![vec![process("launcher", 10, 50 * MB)]]);

        let outcome = ReadinessDetector::default()
            .await_ready(
                &mut query,
                &launcher_names(),
                70 * MB,
                Duration::from_secs(600),
                |_| {},
            )
            .await;

        assert_eq!(outcome, ReadinessOutcome::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn reports_process_never_appeared() {
        let mut query = ScriptedQuery::new(vec![vec![]]);

        let mut searches = 0;
        let outcome = ReadinessDetector::default()
            .await_ready(
                &mut query,
                &launcher_names(),
                70 * MB,
                Duration::from_secs(600),
                |p| {
                    if matches!(p, ReadinessProgress::Searching { .. }) {
                        searches += 1;
                    }
                },
            )
            .await;

        assert_eq!(outcome, ReadinessOutcome::ProcessNeverAppeared);
        assert_eq!(searches, 60);
    }

    #[tokio::test(start_paused = true)]
    async fn wall_clock_bound_cuts_the_attempt_budget() {
        let mut query = ScriptedQuery::new(vec![vec![process("launcher", 10, 50 * MB)]]);

        let outcome = ReadinessDetector::default()
            .await_ready(
                &mut query,
                &launcher_names(),
                70 * MB,
                Duration::from_secs(10),
                |_| {},
            )
            .await;

        assert_eq!(outcome, ReadinessOutcome::TimedOut);
    }
}
