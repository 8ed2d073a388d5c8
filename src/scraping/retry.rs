//! Bounded retry for controls that re-render under our feet.
//!
//! The portal's dropdowns post back and rebuild the controls below them, so a
//! located `<select>` can go stale before we touch it. [`retry_when`] is a
//! bounded fixed-delay retry with a caller-supplied predicate, built on
//! `backoff`; [`RetryingSelector`] applies it to dropdown selection.

use backoff::backoff::Backoff;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::core::config::FlowTimings;
use crate::core::error::{MusterError, Result};
use crate::scraping::automation::{Locator, OptionChoice, PageAutomation};

/// Attempt bound and pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Treated as at least 1.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    fn backoff(&self) -> BoundedConstant {
        BoundedConstant::new(self.max_attempts.max(1), self.delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(1))
    }
}

/// Constant delay that gives up after `max_attempts - 1` pauses.
struct BoundedConstant {
    delay: Duration,
    max_attempts: u32,
    pauses_left: u32,
}

impl BoundedConstant {
    fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            delay,
            max_attempts,
            pauses_left: max_attempts - 1,
        }
    }
}

impl Backoff for BoundedConstant {
    fn reset(&mut self) {
        self.pauses_left = self.max_attempts - 1;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        if self.pauses_left == 0 {
            return None;
        }
        self.pauses_left -= 1;
        Some(self.delay)
    }
}

/// Why [`retry_when`] gave up.
#[derive(Debug, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error; `last` is the final one.
    Exhausted { attempts: u32, last: E },
    /// An attempt failed with an error the predicate refused to retry.
    Aborted { attempts: u32, error: E },
}

/// Run `op` until it succeeds, retrying while `is_transient` accepts the error
/// and the policy has attempts left.
pub async fn retry_when<T, E, Op, Fut, P>(
    policy: RetryPolicy,
    is_transient: P,
    mut op: Op,
) -> std::result::Result<T, RetryError<E>>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let attempts = AtomicU32::new(0);
    let counter = &attempts;
    let transient = &is_transient;
    let outcome = backoff::future::retry_notify(
        policy.backoff(),
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let fut = op();
            async move {
                match fut.await {
                    Ok(v) => Ok(v),
                    Err(e) if transient(&e) => Err(backoff::Error::transient(e)),
                    Err(e) => Err(backoff::Error::permanent(e)),
                }
            }
        },
        |err: E, pause: Duration| {
            debug!("retrying in {}ms after: {}", pause.as_millis(), err);
        },
    )
    .await;

    let attempts = attempts.load(Ordering::SeqCst);
    outcome.map_err(|e| {
        if is_transient(&e) {
            RetryError::Exhausted { attempts, last: e }
        } else {
            RetryError::Aborted { attempts, error: e }
        }
    })
}

/// Dropdown selection that survives stale element references.
#[derive(Debug, Clone)]
pub struct RetryingSelector {
    policy: RetryPolicy,
    lookup_timeout: Duration,
}

impl RetryingSelector {
    pub fn new(policy: RetryPolicy, lookup_timeout: Duration) -> Self {
        Self {
            policy,
            lookup_timeout,
        }
    }

    pub fn from_timings(timings: &FlowTimings) -> Self {
        Self::new(
            RetryPolicy::new(timings.select_attempts, timings.select_retry_delay()),
            timings.wait_timeout(),
        )
    }

    /// Wait for `locator`, then pick `choice`. A stale control is looked up
    /// again; running out of attempts or a missing option is `SelectionFailed`.
    /// A control that never appears is a plain `Timeout`.
    pub async fn select<D>(
        &self,
        driver: &mut D,
        locator: &Locator,
        choice: &OptionChoice,
    ) -> Result<()>
    where
        D: PageAutomation + ?Sized,
    {
        let lookup_timeout = self.lookup_timeout;
        // Each attempt re-borrows the session; the lock only hands it out.
        let session = Mutex::new(driver);
        let session = &session;
        let outcome = retry_when(self.policy, MusterError::is_stale, move || async move {
            let mut driver = session.lock().await;
            driver.wait_for(locator, lookup_timeout).await?;
            driver.select_option(locator, choice).await
        })
        .await;

        match outcome {
            Ok(()) => {
                info!("selected '{}' in {}", choice.as_str(), locator);
                Ok(())
            }
            Err(RetryError::Exhausted { attempts, last }) => Err(MusterError::SelectionFailed {
                control: locator.to_string(),
                value: choice.as_str().to_string(),
                attempts,
                reason: last.to_string(),
            }),
            Err(RetryError::Aborted {
                attempts,
                error: MusterError::ElementNotFound(reason),
            }) => Err(MusterError::SelectionFailed {
                control: locator.to_string(),
                value: choice.as_str().to_string(),
                attempts,
                reason,
            }),
            Err(RetryError::Aborted { error, .. }) => Err(error),
        }
    }
}
