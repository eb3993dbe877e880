// Copyright 2025 dentsusoken
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::config::{DEFAULT_BACKOFF_CAP_MS, DEFAULT_BACKOFF_FACTOR, DEFAULT_BACKOFF_INITIAL_MS};
use crate::locking::cancellation::CancellationToken;
use crate::locking::resource::ResourceName;
use crate::locking::timeout::{LockTimeout, LockTimeoutSource};
use crate::locking::wait_observer::LockWaitObserver;
use std::cmp;
use std::time::{Duration, Instant};

/// Indicates whether a lock request may block waiting for contention to clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireMode {
    Blocking,
    NonBlocking,
}

impl AcquireMode {
    pub fn is_non_blocking(self) -> bool {
        matches!(self, AcquireMode::NonBlocking)
    }
}

/// Geometric backoff used between polls of a held marker.
///
/// Delays are kept at millisecond resolution so the schedule is reproducible.
#[derive(Debug, Clone, PartialEq)]
pub struct PollingBackoff {
    initial: Duration,
    factor: f64,
    cap: Duration,
    current: Duration,
}

impl PollingBackoff {
    pub fn new(initial: Duration, factor: f64, cap: Duration) -> Self {
        let factor = if factor.is_finite() {
            factor.max(1.0)
        } else {
            1.0
        };
        let initial = cmp::min(initial, cap);
        Self {
            initial,
            factor,
            cap,
            current: initial,
        }
    }

    /// Returns the current delay and advances the backoff sequence.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        let scaled = (self.current.as_millis() as f64 * self.factor).round();
        let next = Duration::from_millis(scaled.min(u64::MAX as f64) as u64);
        self.current = cmp::min(next, self.cap);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }

    pub fn peek(&self) -> Duration {
        self.current
    }
}

impl Default for PollingBackoff {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(DEFAULT_BACKOFF_INITIAL_MS),
            DEFAULT_BACKOFF_FACTOR,
            Duration::from_millis(DEFAULT_BACKOFF_CAP_MS),
        )
    }
}

/// Tracks elapsed and remaining time against an acquisition deadline.
#[derive(Debug, Clone)]
pub struct LockTimeoutBudget {
    value: LockTimeout,
    started_at: Instant,
}

impl LockTimeoutBudget {
    pub fn new(value: LockTimeout) -> Self {
        Self {
            value,
            started_at: Instant::now(),
        }
    }

    pub fn value(&self) -> LockTimeout {
        self.value
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.value.as_duration().saturating_sub(self.elapsed())
    }

    pub fn is_expired(&self) -> bool {
        self.elapsed() >= self.value.as_duration()
    }
}

/// Carries the state of a single lock acquisition attempt.
pub struct LockAcquisitionRequest<'a> {
    resource: ResourceName,
    budget: LockTimeoutBudget,
    cancellation: CancellationToken,
    backoff: PollingBackoff,
    observer: Option<&'a dyn LockWaitObserver>,
    source: LockTimeoutSource,
    mode: AcquireMode,
    retries: usize,
    wait_started: bool,
}

impl<'a> LockAcquisitionRequest<'a> {
    pub fn new(resource: ResourceName, timeout: LockTimeout) -> Self {
        Self {
            resource,
            budget: LockTimeoutBudget::new(timeout),
            cancellation: CancellationToken::new(),
            backoff: PollingBackoff::default(),
            observer: None,
            source: LockTimeoutSource::Default,
            mode: AcquireMode::Blocking,
            retries: 0,
            wait_started: false,
        }
    }

    pub fn with_mode(mut self, mode: AcquireMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn with_backoff(mut self, backoff: PollingBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_timeout_source(mut self, source: LockTimeoutSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_observer(mut self, observer: Option<&'a dyn LockWaitObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn resource(&self) -> &ResourceName {
        &self.resource
    }

    pub fn mode(&self) -> AcquireMode {
        self.mode
    }

    pub fn budget(&self) -> &LockTimeoutBudget {
        &self.budget
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn backoff(&self) -> &PollingBackoff {
        &self.backoff
    }

    pub fn observer(&self) -> Option<&'a dyn LockWaitObserver> {
        self.observer
    }

    pub fn elapsed(&self) -> Duration {
        self.budget.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.budget.remaining()
    }

    pub fn timeout(&self) -> LockTimeout {
        self.budget.value()
    }

    pub fn timeout_source(&self) -> LockTimeoutSource {
        self.source
    }

    pub fn retries(&self) -> usize {
        self.retries
    }

    /// Next delay, clamped so the final poll lands on the deadline.
    ///
    /// Returns `None` once no budget is left.
    pub fn next_sleep_interval(&mut self) -> Option<Duration> {
        let remaining = self.remaining();
        let delay = cmp::min(self.backoff.next_delay(), remaining);
        if delay.is_zero() { None } else { Some(delay) }
    }

    pub fn notify_attempt(&self) {
        if let Some(observer) = self.observer {
            observer.on_attempt(&self.resource, self.timeout());
        }
    }

    pub fn record_wait_start(&mut self) {
        if !self.wait_started {
            if let Some(observer) = self.observer {
                observer.on_wait_start(&self.resource, self.timeout());
            }
            self.wait_started = true;
        }
    }

    pub fn record_retry(&mut self) {
        self.retries = self.retries.saturating_add(1);
        if let Some(observer) = self.observer {
            observer.on_retry(
                &self.resource,
                self.retries,
                self.elapsed(),
                self.remaining(),
            );
        }
    }

    pub fn notify_reclaimed(&self, age: Duration) {
        if let Some(observer) = self.observer {
            observer.on_reclaimed(&self.resource, age);
        }
    }

    pub fn notify_acquired(&self) {
        if let Some(observer) = self.observer {
            observer.on_acquired(&self.resource, self.elapsed());
        }
    }

    pub fn notify_timeout(&self) {
        if let Some(observer) = self.observer {
            observer.on_timeout(&self.resource, self.elapsed());
        }
    }

    pub fn notify_cancelled(&self) {
        if let Some(observer) = self.observer {
            observer.on_cancelled(&self.resource, self.elapsed());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn default_backoff_grows_by_a_fifth_until_cap() {
        let mut backoff = PollingBackoff::default();
        let delays: Vec<u128> = (0..10).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(
            delays,
            [
                5_000, 6_000, 7_200, 8_640, 10_368, 12_442, 14_930, 15_000, 15_000, 15_000
            ]
        );
    }

    #[test]
    fn backoff_reset_restarts_sequence() {
        let mut backoff =
            PollingBackoff::new(Duration::from_millis(10), 2.0, Duration::from_millis(40));
        assert_eq!(backoff.next_delay(), Duration::from_millis(10));
        assert_eq!(backoff.next_delay(), Duration::from_millis(20));
        assert_eq!(backoff.peek(), Duration::from_millis(40));
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(10));
    }

    #[test]
    fn backoff_rejects_shrinking_factor() {
        let mut backoff =
            PollingBackoff::new(Duration::from_millis(10), 0.5, Duration::from_millis(40));
        assert_eq!(backoff.next_delay(), Duration::from_millis(10));
        assert_eq!(backoff.next_delay(), Duration::from_millis(10));
    }

    #[test]
    fn sleep_interval_is_clamped_to_remaining_budget() {
        let mut request = LockAcquisitionRequest::new(
            ResourceName::default(),
            LockTimeout::from_secs_or_default(3),
        );
        let delay = request.next_sleep_interval().unwrap();
        assert!(delay <= Duration::from_secs(3));
        assert!(delay > Duration::from_millis(2_500));
        assert_eq!(request.backoff().peek(), Duration::from_secs(6));
    }

    #[test]
    fn expired_budget_yields_no_sleep() {
        let mut request = LockAcquisitionRequest::new(
            ResourceName::default(),
            LockTimeout::from_duration_or_default(Duration::from_millis(1)),
        );
        std::thread::sleep(Duration::from_millis(5));
        assert!(request.budget().is_expired());
        assert_eq!(request.next_sleep_interval(), None);
    }

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<String>>,
    }

    impl LockWaitObserver for RecordingObserver {
        fn on_attempt(&self, resource: &ResourceName, _timeout: LockTimeout) {
            self.events.lock().unwrap().push(format!("attempt:{resource}"));
        }

        fn on_wait_start(&self, resource: &ResourceName, _timeout: LockTimeout) {
            self.events.lock().unwrap().push(format!("start:{resource}"));
        }

        fn on_retry(
            &self,
            _resource: &ResourceName,
            attempt: usize,
            _elapsed: Duration,
            _remaining: Duration,
        ) {
            self.events.lock().unwrap().push(format!("retry:{attempt}"));
        }

        fn on_cancelled(&self, resource: &ResourceName, _waited: Duration) {
            self.events
                .lock()
                .unwrap()
                .push(format!("cancelled:{resource}"));
        }
    }

    #[test]
    fn request_notifies_observer() {
        let observer = RecordingObserver::default();
        let mut request = LockAcquisitionRequest::new(
            ResourceName::parse("printer").unwrap(),
            LockTimeout::from_secs_or_default(1),
        )
        .with_observer(Some(&observer));

        request.notify_attempt();
        request.record_wait_start();
        request.record_wait_start();
        request.record_retry();
        request.notify_cancelled();

        let events = observer.events.lock().unwrap();
        assert_eq!(
            events.as_slice(),
            [
                "attempt:printer",
                "start:printer",
                "retry:1",
                "cancelled:printer"
            ]
        );
        assert_eq!(request.retries(), 1);
    }
}
