// Copyright 2025 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Bounded retry of operations that fail on write conflicts.

use std::{thread, time::Duration};

use rand::Rng as _;
use tracing::warn;

const DEFAULT_MAX_ATTEMPTS: usize = 10;
const DEFAULT_BACKOFF: Duration = Duration::from_millis(10);
const DEFAULT_JITTER: Duration = Duration::from_millis(10);

/// Classifies whether a failed operation can succeed when re-run from
/// scratch on fresh state.
pub trait Retryable {
    /// Returns true if the operation should be re-run.
    fn is_retryable(&self) -> bool;
}

/// A bounded retry loop with backoff and jitter.
///
/// Operations wrapped in [RetryPolicy::run] must be side-effect-free on
/// failure; transaction rollback guarantees this for store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: usize,
    backoff: Duration,
    jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
            jitter: DEFAULT_JITTER,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with the default attempt bound and backoff.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of attempts. At least one attempt is always
    /// made.
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Sets the sleep between attempts.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the upper bound of the random addition to the sleep between
    /// attempts.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Runs the operation, re-running it while it fails with a retryable
    /// error and attempts remain. Returns the first success or the last
    /// error.
    pub fn run<T, E: Retryable>(&self, mut op: impl FnMut() -> Result<T, E>) -> Result<T, E> {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    warn!(attempt, max_attempts = self.max_attempts, "retrying operation");
                    thread::sleep(self.backoff + self.random_jitter());
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn random_jitter(&self) -> Duration {
        let max = self.jitter.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(0..=max))
    }
}
