use std::time::Duration;

use crate::config::Stage;

#[derive(Debug, Clone)]
pub struct StageSnapshot {
    pub index: usize,
    pub count: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: u64,
}

/// Target-VU-count-over-time curve for a ramping executor.
///
/// The target interpolates linearly from the previous stage's end target (or
/// `start` for the first stage) to the current stage's target. Stages with a
/// zero duration jump the target instantly.
#[derive(Debug, Clone)]
pub struct RampSchedule {
    start: u64,
    stages: Vec<Stage>,
    cumulative_ends: Vec<Duration>,
}

impl RampSchedule {
    pub fn new(start: u64, stages: Vec<Stage>) -> Self {
        let mut cumulative_ends = Vec::with_capacity(stages.len());
        let mut acc = Duration::ZERO;
        for s in &stages {
            acc = acc.saturating_add(s.duration);
            cumulative_ends.push(acc);
        }

        Self {
            start,
            stages,
            cumulative_ends,
        }
    }

    pub fn total_duration(&self) -> Duration {
        self.cumulative_ends
            .last()
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_done(&self, elapsed: Duration) -> bool {
        elapsed >= self.total_duration()
    }

    /// Index of the stage covering `elapsed`, which must be within the total
    /// duration. An elapsed time exactly on a stage boundary belongs to the
    /// stage ending there, so the boundary target is the stage's own target.
    fn stage_index_at(&self, elapsed: Duration) -> usize {
        match self
            .cumulative_ends
            .binary_search_by(|end| end.cmp(&elapsed))
        {
            Ok(i) => i,
            Err(i) => i,
        }
    }

    /// (stage start offset, stage end offset, start target, end target).
    fn stage_bounds(&self, idx: usize) -> (Duration, Duration, u64, u64) {
        let stage_end = self.cumulative_ends[idx];
        let stage_start = if idx == 0 {
            Duration::ZERO
        } else {
            self.cumulative_ends[idx - 1]
        };
        let start_target = if idx == 0 {
            self.start
        } else {
            self.stages[idx - 1].target
        };
        (stage_start, stage_end, start_target, self.stages[idx].target)
    }

    pub fn target_at(&self, elapsed: Duration) -> u64 {
        if self.stages.is_empty() || elapsed == Duration::ZERO {
            return self.start;
        }

        if elapsed >= self.total_duration() {
            return self.stages.last().map(|s| s.target).unwrap_or(self.start);
        }

        let idx = self.stage_index_at(elapsed);
        let (stage_start, stage_end, start_target, end_target) = self.stage_bounds(idx);
        let stage_duration = stage_end.saturating_sub(stage_start);
        if stage_duration.is_zero() {
            return end_target;
        }

        interpolate(
            start_target,
            end_target,
            elapsed.saturating_sub(stage_start),
            stage_duration,
        )
    }

    pub fn stage_snapshot_at(&self, elapsed: Duration) -> Option<StageSnapshot> {
        if self.stages.is_empty() {
            return None;
        }

        let total = self.total_duration();
        let clamped = elapsed.min(total);
        let idx = if clamped >= total {
            self.stages.len().saturating_sub(1)
        } else {
            self.stage_index_at(clamped)
        };

        let (stage_start, stage_end, start_target, end_target) = self.stage_bounds(idx);
        let stage_duration = stage_end.saturating_sub(stage_start);
        let stage_elapsed = clamped.saturating_sub(stage_start);

        Some(StageSnapshot {
            index: idx,
            count: self.stages.len(),
            stage_elapsed,
            stage_remaining: stage_duration.saturating_sub(stage_elapsed),
            start_target,
            end_target,
            current_target: self.target_at(clamped),
        })
    }

    /// How long a parked VU (1-based index `vu_index` within its scenario)
    /// should sleep before re-checking whether the ramp has reached it.
    pub fn next_recheck_in(&self, elapsed: Duration, vu_index: u64) -> Duration {
        // Conservative default.
        let default_sleep = Duration::from_millis(50);

        if self.stages.is_empty() {
            return default_sleep;
        }

        if elapsed >= self.total_duration() {
            return Duration::ZERO;
        }

        // If we're already active, a short sleep is fine to pick up ramp-down promptly.
        if vu_index <= self.target_at(elapsed) {
            return Duration::from_millis(1);
        }

        let idx = self.stage_index_at(elapsed);
        let (stage_start, stage_end, start_target, end_target) = self.stage_bounds(idx);

        // If target is decreasing, this VU can't become active within this stage.
        if end_target <= start_target {
            return stage_end.saturating_sub(elapsed).min(default_sleep);
        }

        if vu_index > end_target {
            return stage_end.saturating_sub(elapsed).min(default_sleep);
        }

        // Target is increasing: solve for the t where the ramp reaches this
        // VU index, i.e. start + (end - start) * t / dur >= vu_index.
        let stage_duration = stage_end.saturating_sub(stage_start);
        let stage_elapsed = elapsed.saturating_sub(stage_start);

        let delta = (end_target - start_target) as i128;
        let needed = (vu_index.saturating_sub(start_target)) as i128;
        let stage_ns = stage_duration.as_nanos() as i128;
        let elapsed_ns = stage_elapsed.as_nanos() as i128;

        let needed_ns = needed.saturating_mul(stage_ns) / delta.max(1);
        let wait_ns = needed_ns.saturating_sub(elapsed_ns).max(0);
        let wait = Duration::from_nanos(wait_ns.min(u64::MAX as i128) as u64);

        wait.min(default_sleep)
    }
}

fn interpolate(start: u64, end: u64, elapsed: Duration, duration: Duration) -> u64 {
    let start_i = start as i128;
    let delta = end as i128 - start_i;
    let num = elapsed.as_nanos() as i128;
    let den = (duration.as_nanos() as i128).max(1);

    let cur = start_i + delta.saturating_mul(num) / den;
    cur.clamp(0, u64::MAX as i128) as u64
}
