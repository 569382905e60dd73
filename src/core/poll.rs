use std::time::Duration;

/// Default number of status polls before giving up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 60;

/// Default wait between status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Progress shown once the request is queued
pub const QUEUED_PERCENT: u8 = 30;

/// Ceiling while still polling
pub const POLLING_CAP_PERCENT: u8 = 90;

const PHASE_MESSAGES: [&str; 6] = [
    "AI is analyzing your image...",
    "Applying creative transformations...",
    "Adding magical touches...",
    "Refining the details...",
    "Almost there, finalizing...",
    "Just a few more moments...",
];

const ATTEMPTS_PER_PHASE: u32 = 5;

/// How the wait grows between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    #[default]
    None,
    /// Add `step` to the wait after every attempt
    Linear { step: Duration },
}

/// Bounded polling schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval: DEFAULT_POLL_INTERVAL,
            backoff: Backoff::None,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
            backoff: Backoff::None,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn is_last(&self, attempt: u32) -> bool {
        attempt + 1 >= self.max_attempts
    }

    /// Wait after a non-terminal status on `attempt` (zero-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::None => self.interval,
            Backoff::Linear { step } => self.interval.saturating_add(step.saturating_mul(attempt)),
        }
    }

    /// Progress for `attempt`: linear from 30% to 90% across the budget
    pub fn progress_for(&self, attempt: u32) -> u8 {
        let span = u64::from(POLLING_CAP_PERCENT - QUEUED_PERCENT);
        let step = u64::from(attempt) * span / u64::from(self.max_attempts.max(1));
        (u64::from(QUEUED_PERCENT) + step).min(u64::from(POLLING_CAP_PERCENT)) as u8
    }

    /// Upper bound on time spent waiting, ignoring request latency
    pub fn worst_case_wait(&self) -> Duration {
        (0..self.max_attempts.saturating_sub(1))
            .map(|a| self.delay_after(a))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

/// Rotating phase message, advancing every five attempts
pub fn phase_message(attempt: u32) -> &'static str {
    let idx = (attempt / ATTEMPTS_PER_PHASE) as usize;
    PHASE_MESSAGES[idx.min(PHASE_MESSAGES.len() - 1)]
}

/// A progress report: percentage plus a human-readable line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub percent: u8,
    pub message: String,
}

impl Progress {
    pub fn new(percent: u8, message: impl Into<String>) -> Self {
        Self {
            percent: percent.min(100),
            message: message.into(),
        }
    }
}

/// Receives advisory progress updates
pub trait ProgressSink: Send {
    fn report(&mut self, progress: Progress);
}

impl ProgressSink for indicatif::ProgressBar {
    fn report(&mut self, progress: Progress) {
        self.set_position(u64::from(progress.percent));
        self.set_message(progress.message);
    }
}

/// Sink that drops every update
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _progress: Progress) {}
}

impl ProgressSink for Vec<Progress> {
    fn report(&mut self, progress: Progress) {
        self.push(progress);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_matches_budget() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 60);
        assert_eq!(policy.interval, Duration::from_secs(2));
        assert_eq!(policy.worst_case_wait(), Duration::from_secs(118));
    }

    #[test]
    fn progress_is_linear_and_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.progress_for(0), 30);
        assert_eq!(policy.progress_for(30), 60);
        assert_eq!(policy.progress_for(59), 89);
        assert_eq!(policy.progress_for(500), 90);

        let mut last = 0;
        for attempt in 0..policy.max_attempts {
            let p = policy.progress_for(attempt);
            assert!(p >= last);
            assert!(p <= 90);
            last = p;
        }
    }

    #[test]
    fn phase_message_rotates_every_five_attempts() {
        assert_eq!(phase_message(0), "AI is analyzing your image...");
        assert_eq!(phase_message(4), "AI is analyzing your image...");
        assert_eq!(phase_message(5), "Applying creative transformations...");
        assert_eq!(phase_message(25), "Just a few more moments...");
        assert_eq!(phase_message(59), "Just a few more moments...");
    }

    #[test]
    fn linear_backoff_grows_wait() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100)).with_backoff(Backoff::Linear {
            step: Duration::from_millis(50),
        });
        assert_eq!(policy.delay_after(0), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert!(policy.is_last(2));
        assert!(!policy.is_last(1));
    }

    #[test]
    fn huge_backoff_saturates_instead_of_overflowing() {
        let policy = RetryPolicy::new(60, Duration::from_millis(2000)).with_backoff(Backoff::Linear {
            step: Duration::from_millis(u64::MAX),
        });
        assert_eq!(policy.delay_after(59), Duration::MAX);
        assert_eq!(policy.worst_case_wait(), Duration::MAX);
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        assert_eq!(policy.max_attempts, 1);
        assert!(policy.is_last(0));
    }
}
