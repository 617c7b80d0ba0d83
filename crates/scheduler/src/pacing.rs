//! Delay math for the cluster loop, kept separate from the code that
//! actually sleeps so the distributions can be tested directly.

use std::time::Duration;

use driftbot_core::PacingConfig;
use rand::Rng;

/// Spread applied around `task_interval_secs` for inter-task delays.
const TASK_INTERVAL_JITTER_SECS: f64 = 5.0;

/// Scale range applied to `grouping_interval_secs` for the idle wait.
const IDLE_SCALE_MIN: f64 = 0.8;
const IDLE_SCALE_MAX: f64 = 1.2;

/// Idle waits are sliced into chunks of this size so the loop stays
/// responsive to interrupts and can log progress.
pub const IDLE_CHUNK_SECS: u64 = 30;

/// "Thinking" pause before each task starts.
pub fn pre_task_delay(pacing: &PacingConfig, rng: &mut impl Rng) -> Duration {
    let min = pacing.pre_task_delay_min_secs.min(pacing.pre_task_delay_max_secs) as f64;
    let max = pacing.pre_task_delay_max_secs.max(pacing.pre_task_delay_min_secs) as f64;
    Duration::from_secs_f64(rng.gen_range(min..=max))
}

/// Gap between consecutive tasks in a cluster, jittered around the
/// configured interval and clamped at zero.
pub fn inter_task_delay(pacing: &PacingConfig, rng: &mut impl Rng) -> Duration {
    let interval = pacing.task_interval_secs as f64;
    let lo = (interval - TASK_INTERVAL_JITTER_SECS).max(0.0);
    let hi = interval + TASK_INTERVAL_JITTER_SECS;
    Duration::from_secs_f64(rng.gen_range(lo..=hi))
}

/// Total idle time between clusters: the grouping interval scaled by a
/// uniform factor in [0.8, 1.2].
pub fn idle_wait(pacing: &PacingConfig, rng: &mut impl Rng) -> Duration {
    let base = pacing.grouping_interval_secs as f64;
    Duration::from_secs_f64(base * rng.gen_range(IDLE_SCALE_MIN..=IDLE_SCALE_MAX))
}

/// An idle wait decomposed into full 30s chunks plus a partial remainder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdlePlan {
    pub full_chunks: u64,
    pub remainder: Duration,
}

impl IdlePlan {
    pub fn for_wait(wait: Duration) -> Self {
        let chunk = IDLE_CHUNK_SECS as f64;
        let total = wait.as_secs_f64();
        let full_chunks = (total / chunk) as u64;
        let remainder = total - (full_chunks as f64) * chunk;
        Self {
            full_chunks,
            remainder: Duration::from_secs_f64(remainder.max(0.0)),
        }
    }

    /// Seconds left after `completed` full chunks have elapsed.
    pub fn remaining_after(&self, completed: u64, total: Duration) -> Duration {
        total.saturating_sub(Duration::from_secs(completed * IDLE_CHUNK_SECS))
    }
}

/// Whether a "time remaining" status line is due after this chunk.
/// Fires on every 4th chunk (roughly every two minutes) as long as more
/// than one chunk of waiting is still ahead.
pub fn status_due(chunk_index: u64, remaining: Duration) -> bool {
    remaining.as_secs_f64() > IDLE_CHUNK_SECS as f64 && chunk_index % 4 == 3
}
