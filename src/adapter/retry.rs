use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::config::RETRY_INTERVAL_MS;
use crate::error::{Error, Result};
use crate::transport::TransportError;

/// How long to wait between presence-required answers, and for how long in
/// total. `deadline: None` waits until the user touches or the flag is raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(RETRY_INTERVAL_MS),
            deadline: None,
        }
    }
}

impl RetryPolicy {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Consume a pending cancellation, leaving the flag clear for the next wait.
    pub(crate) fn take(&self) -> bool {
        self.0.swap(false, Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AdapterOptions {
    pub retry: RetryPolicy,
    pub cancel: CancelFlag,
}

impl AdapterOptions {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            retry,
            cancel: CancelFlag::new(),
        }
    }
}

/// Run `attempt` until it stops reporting presence-required.
///
/// Any other transport failure is returned on the spot. The flag is checked
/// before every attempt, so cancellation takes effect within one interval.
pub(crate) fn retry_presence<T>(
    op: &'static str,
    options: &AdapterOptions,
    mut attempt: impl FnMut() -> Result<T, TransportError>,
) -> Result<T> {
    let started = Instant::now();
    let mut retries: u32 = 0;
    loop {
        if options.cancel.take() {
            tracing::info!(op, retries, "Cancelled while waiting for user presence");
            return Err(Error::Cancelled);
        }

        match attempt() {
            Ok(value) => {
                if retries > 0 {
                    tracing::info!(op, retries, "User presence confirmed");
                }
                return Ok(value);
            }
            Err(TransportError::PresenceRequired) => {
                let interval = options.retry.interval;
                if let Some(deadline) = options.retry.deadline {
                    if started.elapsed() + interval > deadline {
                        tracing::warn!(op, retries, "Gave up waiting for user presence");
                        return Err(Error::PresenceTimeout(deadline));
                    }
                }
                if retries == 0 {
                    tracing::info!(op, "Touch the token to continue");
                } else {
                    tracing::debug!(op, retries, "Still waiting for user presence");
                }
                retries += 1;
                std::thread::sleep(interval);
            }
            Err(e) => return Err(e.into()),
        }
    }
}
