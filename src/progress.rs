//! Progress notifications around every script and image attempt.
//!
//! Each attempt is reported as `inc_step` → `update(0)` → `update(100)` →
//! `step_completed`, whether it succeeded or not. Observers must read
//! "step completed" as "attempt finished".

use tracing::info;

pub trait ProgressReporter {
    /// A new step starts for `file`, handled by `handler`.
    fn inc_step(&mut self, file: &str, handler: &str);

    /// Percentage of the current step.
    fn update(&mut self, percent: u8);

    fn step_completed(&mut self);
}

/// Reports progress through `tracing`.
#[derive(Debug, Default)]
pub struct LogProgress {
    step: u32,
    current: String,
}

impl LogProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> u32 {
        self.step
    }
}

impl ProgressReporter for LogProgress {
    fn inc_step(&mut self, file: &str, handler: &str) {
        self.step += 1;
        self.current = file.to_string();
        info!("[step {}] {} ({})", self.step, file, handler);
    }

    fn update(&mut self, percent: u8) {
        info!("[step {}] {}: {}%", self.step, self.current, percent.min(100));
    }

    fn step_completed(&mut self) {
        info!("[step {}] {}: done", self.step, self.current);
    }
}

/// Discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn inc_step(&mut self, _file: &str, _handler: &str) {}
    fn update(&mut self, _percent: u8) {}
    fn step_completed(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_progress_counts_steps() {
        let mut p = LogProgress::new();
        p.inc_step("a", "raw");
        p.update(0);
        p.update(100);
        p.step_completed();
        p.inc_step("b", "raw");
        assert_eq!(p.steps(), 2);
    }
}
