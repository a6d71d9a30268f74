// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Requeue delay policies for failed reconcile attempts.

use std::time::Duration;

/// How long a key waits before its next attempt after `failures` consecutive failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Same delay after every failure
    Fixed { delay: Duration },
    /// `base * 2^(failures - 1)`, capped at `max`
    Exponential { base: Duration, max: Duration },
}

impl BackoffStrategy {
    pub fn delay(&self, failures: u32) -> Duration {
        match *self {
            BackoffStrategy::Fixed { delay } => delay,
            BackoffStrategy::Exponential { base, max } => {
                let exponent = failures.saturating_sub(1).min(31);
                base.checked_mul(1u32 << exponent)
                    .map_or(max, |delay| delay.min(max))
            }
        }
    }
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        BackoffStrategy::Exponential {
            base: Duration::from_millis(250),
            max: Duration::from_secs(60),
        }
    }
}
