//! Time-based primitives used by the classifiers.
//!
//! All three types are evaluated against a caller-supplied `now` (normally
//! the monitoring timestamp of the round being classified), never against
//! the wall clock, so classification stays deterministic.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};

/// One-shot detector for "a condition has held continuously for at least
/// `interval`".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalTracker {
    interval: Duration,
    started_at: Option<DateTime<Utc>>,
}

impl IntervalTracker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: clamp_non_negative(interval),
            started_at: None,
        }
    }

    /// Record `now` as the start of the window unless one is already running.
    pub fn start(&mut self, now: DateTime<Utc>) {
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
    }

    /// `true` once `now - start >= interval`. Always `false` before `start`.
    pub fn elapsed(&self, now: DateTime<Utc>) -> bool {
        match self.started_at {
            Some(start) => now.signed_duration_since(start) >= self.interval,
            None => false,
        }
    }

    pub fn reset(&mut self) {
        self.started_at = None;
    }

    pub fn started(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Takes effect on the next `elapsed` call; a running window keeps its start.
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = clamp_non_negative(interval);
    }
}

/// Gate for "at least `interval` has passed since the last permitted action".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimiter {
    interval: Duration,
    last_permitted_at: Option<DateTime<Utc>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: clamp_non_negative(interval),
            last_permitted_at: None,
        }
    }

    pub fn can_run(&self, now: DateTime<Utc>) -> bool {
        match self.last_permitted_at {
            Some(last) => now.signed_duration_since(last) >= self.interval,
            None => true,
        }
    }

    pub fn mark_run(&mut self, now: DateTime<Utc>) {
        self.last_permitted_at = Some(now);
    }

    pub fn reset(&mut self) {
        self.last_permitted_at = None;
    }

    pub fn last_permitted_at(&self) -> Option<DateTime<Utc>> {
        self.last_permitted_at
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = clamp_non_negative(interval);
    }
}

/// Sliding-window counter for "N occurrences within the last `window`".
///
/// Events are stored as `(timestamp, count)` buckets, one per accepted
/// recording. A recording whose timestamp is not strictly newer than the
/// last accepted one is dropped, which makes replaying a monitoring round
/// harmless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccurrenceWindowCounter {
    window: Duration,
    events: VecDeque<(DateTime<Utc>, u64)>,
    last_recorded_at: Option<DateTime<Utc>>,
}

impl OccurrenceWindowCounter {
    pub fn new(window: Duration) -> Self {
        Self {
            window: clamp_non_negative(window),
            events: VecDeque::new(),
            last_recorded_at: None,
        }
    }

    /// Record `occurrences` events at `now`. Returns `false` when the
    /// recording was ignored as stale or replayed.
    pub fn record(&mut self, now: DateTime<Utc>, occurrences: u64) -> bool {
        if self.last_recorded_at.is_some_and(|last| now <= last) {
            return false;
        }
        self.last_recorded_at = Some(now);
        if occurrences > 0 {
            self.events.push_back((now, occurrences));
        }
        self.prune(now);
        true
    }

    /// Number of events with `timestamp > now - window`. A window reaching
    /// past the representable range counts every event.
    pub fn count(&mut self, now: DateTime<Utc>) -> u64 {
        self.prune(now);
        let cutoff = self.cutoff(now);
        self.events
            .iter()
            .filter(|(at, _)| cutoff.map_or(true, |cutoff| *at > cutoff))
            .map(|(_, n)| *n)
            .sum()
    }

    /// Forget every recorded event. The replay guard is kept.
    pub fn reset(&mut self) {
        self.events.clear();
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn set_window(&mut self, window: Duration) {
        self.window = clamp_non_negative(window);
    }

    fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        now.checked_sub_signed(self.window)
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let Some(cutoff) = self.cutoff(now) else {
            return;
        };
        while self.events.front().is_some_and(|(at, _)| *at <= cutoff) {
            self.events.pop_front();
        }
    }
}

fn clamp_non_negative(d: Duration) -> Duration {
    if d < Duration::zero() {
        Duration::zero()
    } else {
        d
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    // ---- IntervalTracker ----

    #[test]
    fn elapsed_is_false_before_start() {
        let tracker = IntervalTracker::new(Duration::seconds(5));
        assert!(!tracker.elapsed(at(100)));
        assert!(!tracker.started());
    }

    #[test]
    fn elapsed_once_interval_has_passed() {
        let mut tracker = IntervalTracker::new(Duration::seconds(5));
        tracker.start(at(0));
        assert!(!tracker.elapsed(at(4)));
        assert!(tracker.elapsed(at(5)));
        assert!(tracker.elapsed(at(60)));
    }

    #[test]
    fn start_does_not_move_a_running_window() {
        let mut tracker = IntervalTracker::new(Duration::seconds(5));
        tracker.start(at(0));
        tracker.start(at(4));
        assert_eq!(tracker.started_at(), Some(at(0)));
        assert!(tracker.elapsed(at(5)));
    }

    #[test]
    fn reset_then_start_begins_a_fresh_window() {
        let mut tracker = IntervalTracker::new(Duration::seconds(5));
        tracker.start(at(0));
        tracker.reset();
        assert!(!tracker.elapsed(at(10)));
        tracker.start(at(10));
        assert!(!tracker.elapsed(at(14)));
        assert!(tracker.elapsed(at(15)));
    }

    #[test]
    fn set_interval_applies_to_running_window() {
        let mut tracker = IntervalTracker::new(Duration::seconds(10));
        tracker.start(at(0));
        assert!(!tracker.elapsed(at(6)));
        tracker.set_interval(Duration::seconds(5));
        assert!(tracker.elapsed(at(6)));
    }

    #[test]
    fn zero_interval_elapses_immediately_after_start() {
        let mut tracker = IntervalTracker::new(Duration::zero());
        tracker.start(at(0));
        assert!(tracker.elapsed(at(0)));
    }

    #[test]
    fn timestamp_before_start_never_counts_as_elapsed() {
        let mut tracker = IntervalTracker::new(Duration::zero());
        tracker.start(at(10));
        assert!(!tracker.elapsed(at(9)));
    }

    #[test]
    fn negative_interval_is_clamped() {
        let tracker = IntervalTracker::new(Duration::seconds(-3));
        assert_eq!(tracker.interval(), Duration::zero());
    }

    // ---- RateLimiter ----

    #[test]
    fn limiter_allows_first_run() {
        let limiter = RateLimiter::new(Duration::seconds(30));
        assert!(limiter.can_run(at(0)));
    }

    #[test]
    fn limiter_blocks_until_interval_passes() {
        let mut limiter = RateLimiter::new(Duration::seconds(30));
        limiter.mark_run(at(0));
        assert!(!limiter.can_run(at(29)));
        assert!(limiter.can_run(at(30)));
    }

    #[test]
    fn limiter_reset_reopens_the_gate() {
        let mut limiter = RateLimiter::new(Duration::seconds(30));
        limiter.mark_run(at(0));
        limiter.reset();
        assert!(limiter.can_run(at(1)));
        assert_eq!(limiter.last_permitted_at(), None);
    }

    #[test]
    fn zero_interval_limiter_always_runs() {
        let mut limiter = RateLimiter::new(Duration::zero());
        limiter.mark_run(at(0));
        assert!(limiter.can_run(at(0)));
    }

    // ---- OccurrenceWindowCounter ----

    #[test]
    fn counts_events_inside_the_window() {
        let mut counter = OccurrenceWindowCounter::new(Duration::seconds(60));
        counter.record(at(0), 2);
        counter.record(at(30), 3);
        assert_eq!(counter.count(at(30)), 5);
        // at(0) is exactly one window old and falls out
        assert_eq!(counter.count(at(60)), 3);
        assert_eq!(counter.count(at(91)), 0);
    }

    #[test]
    fn replayed_recording_is_ignored() {
        let mut counter = OccurrenceWindowCounter::new(Duration::seconds(60));
        assert!(counter.record(at(10), 4));
        assert!(!counter.record(at(10), 4));
        assert!(!counter.record(at(5), 1));
        assert_eq!(counter.count(at(10)), 4);
    }

    #[test]
    fn reset_clears_events_but_keeps_replay_guard() {
        let mut counter = OccurrenceWindowCounter::new(Duration::seconds(60));
        counter.record(at(10), 4);
        counter.reset();
        assert_eq!(counter.count(at(10)), 0);
        assert!(!counter.record(at(10), 4));
        assert!(counter.record(at(11), 1));
        assert_eq!(counter.count(at(11)), 1);
    }

    #[test]
    fn zero_window_counts_nothing() {
        let mut counter = OccurrenceWindowCounter::new(Duration::zero());
        counter.record(at(0), 7);
        assert_eq!(counter.count(at(0)), 0);
    }

    #[test]
    fn shrinking_window_drops_old_events() {
        let mut counter = OccurrenceWindowCounter::new(Duration::seconds(100));
        counter.record(at(0), 1);
        counter.record(at(50), 1);
        assert_eq!(counter.count(at(60)), 2);
        counter.set_window(Duration::seconds(20));
        assert_eq!(counter.count(at(60)), 1);
    }

    #[test]
    fn window_beyond_time_range_keeps_every_event() {
        let mut counter = OccurrenceWindowCounter::new(Duration::milliseconds(i64::MAX));
        assert!(counter.record(at(0), 2));
        assert!(counter.record(at(1_000_000), 3));
        assert_eq!(counter.count(at(1_000_000)), 5);
    }
}
