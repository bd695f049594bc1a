// One active measurement and its delta accumulator

use std::sync::Arc;

use crate::counters::driver::{CounterDriver, Reading};
use crate::counters::events::{EventDescriptor, Target};
use crate::error::Result;

/// An acquired counter plus the running total observed through it
///
/// The driver is released exactly once: by `stop`, or on drop if the
/// session was abandoned.
pub struct Session {
    descriptor: &'static EventDescriptor,
    target: Target,
    driver: Arc<dyn CounterDriver>,
    /// Last absolute count; meaningless until `baseline` is set
    previous: u64,
    baseline: bool,
    accumulated: u64,
    active: bool,
}

impl Session {
    /// Acquire the counter and snapshot the baseline
    pub fn start(
        descriptor: &'static EventDescriptor,
        target: Target,
        driver: Arc<dyn CounterDriver>,
    ) -> Result<Self> {
        driver.acquire(descriptor, target)?;

        let mut session = Self {
            descriptor,
            target,
            driver,
            previous: 0,
            baseline: false,
            accumulated: 0,
            active: true,
        };

        if let Reading::Count(now) = session.driver.read(descriptor, target) {
            session.previous = now;
            session.baseline = true;
        }

        tracing::debug!(
            "started {} on {} (baseline {:?})",
            descriptor.name,
            target,
            session.baseline.then_some(session.previous)
        );
        Ok(session)
    }

    /// Read the counter and fold the change since the last read into the total
    ///
    /// Returns the delta seen by this call. An unavailable reading, or the
    /// first good reading after an unavailable baseline, adds nothing.
    pub fn update(&mut self) -> u64 {
        let now = match self.driver.read(self.descriptor, self.target) {
            Reading::Count(now) => now,
            Reading::Unavailable => return 0,
        };

        let delta = if self.baseline {
            now.wrapping_sub(self.previous)
        } else {
            self.baseline = true;
            0
        };

        self.previous = now;
        self.accumulated = self.accumulated.wrapping_add(delta);
        delta
    }

    pub fn accumulated(&self) -> u64 {
        self.accumulated
    }

    /// Last absolute count, if one has been observed
    pub fn previous_count(&self) -> Option<u64> {
        self.baseline.then_some(self.previous)
    }

    pub fn descriptor(&self) -> &'static EventDescriptor {
        self.descriptor
    }

    pub fn target(&self) -> Target {
        self.target
    }

    /// Final read, release, and the total counted over the session
    pub fn stop(mut self) -> u64 {
        self.update();
        self.release();
        tracing::debug!(
            "stopped {} on {}: {}",
            self.descriptor.name,
            self.target,
            self.accumulated
        );
        self.accumulated
    }

    fn release(&mut self) {
        if self.active {
            self.active = false;
            self.driver.release(self.descriptor, self.target);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.release();
    }
}
