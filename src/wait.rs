//! Polling helpers for long-running operations
//!
//! Every wait re-fetches the resource at a fixed interval and compares one
//! attribute against a target and a set of failure values, until the
//! target is reached, a failure is observed or the time budget runs out.
//! There is no backoff: checks are `interval` apart.

use crate::error::{Error, Result};
use crate::resource::Resource;
use crate::session::Session;
use std::time::Duration;
use tokio::time::Instant;

/// Poll interval used when the caller does not pick one
pub const DEFAULT_WAIT_INTERVAL: Duration = Duration::from_secs(2);

/// Failure statuses used by [`wait_for_status`] when none are given
pub const DEFAULT_FAILURES: &[&str] = &["ERROR"];

/// Interval and optional time budget of a wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub interval: Duration,
    /// `None` waits forever
    pub timeout: Option<Duration>,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_WAIT_INTERVAL,
            timeout: None,
        }
    }
}

impl WaitPolicy {
    pub fn new(interval: Duration, timeout: Option<Duration>) -> Self {
        Self { interval, timeout }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::default()
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn ticker(&self, message: impl Into<String>) -> IterateTimeout {
        iterate_timeout(self.timeout, self.interval, message)
    }
}

/// Hands out check slots: the first immediately, then one per `interval`,
/// failing with `ResourceTimeout` once the budget is spent.
#[derive(Debug)]
pub struct IterateTimeout {
    timeout: Option<Duration>,
    interval: Duration,
    message: String,
    start: Instant,
    count: u32,
}

impl IterateTimeout {
    /// Wait for the next check slot and return its 1-based number
    pub async fn next(&mut self) -> Result<u32> {
        if self.count > 0 {
            tokio::time::sleep(self.interval).await;
        }
        if let Some(timeout) = self.timeout {
            if self.start.elapsed() >= timeout {
                return Err(Error::ResourceTimeout(self.message.clone()));
            }
        }
        self.count += 1;
        Ok(self.count)
    }
}

pub fn iterate_timeout(
    timeout: Option<Duration>,
    interval: Duration,
    message: impl Into<String>,
) -> IterateTimeout {
    IterateTimeout {
        timeout,
        interval,
        message: message.into(),
        start: Instant::now(),
        count: 0,
    }
}

fn describe(resource: &Resource) -> String {
    format!(
        "{}:{}",
        resource.kind(),
        resource.id().unwrap_or_else(|| "<no id>".to_string())
    )
}

fn normalized(resource: &Resource, attribute: &str) -> Option<String> {
    resource.get_str(attribute).map(|s| s.to_lowercase())
}

/// Wait for the `status` attribute to reach `status`.
///
/// Comparison is case-insensitive. A resource already at the target
/// returns without any request.
pub async fn wait_for_status(
    session: &dyn Session,
    resource: &mut Resource,
    status: &str,
    failures: Option<&[&str]>,
    interval: Duration,
    wait: Option<Duration>,
) -> Result<()> {
    wait_for_attribute(session, resource, "status", status, failures, interval, wait).await
}

/// [`wait_for_status`] on an arbitrary attribute
pub async fn wait_for_attribute(
    session: &dyn Session,
    resource: &mut Resource,
    attribute: &str,
    status: &str,
    failures: Option<&[&str]>,
    interval: Duration,
    wait: Option<Duration>,
) -> Result<()> {
    let target = status.to_lowercase();
    if normalized(resource, attribute).as_deref() == Some(target.as_str()) {
        return Ok(());
    }

    let failures: Vec<String> = failures
        .unwrap_or(DEFAULT_FAILURES)
        .iter()
        .map(|f| f.to_lowercase())
        .collect();
    let name = describe(resource);
    let mut ticker = iterate_timeout(
        wait,
        interval,
        format!("Timeout waiting for {} to transition to {}", name, status),
    );

    loop {
        ticker.next().await?;

        match resource.fetch(session).await {
            Ok(()) => {},
            Err(e) if e.is_not_found() => {
                return Err(Error::ResourceFailure(format!(
                    "{} went away while waiting for {}",
                    name, status
                )))
            },
            Err(e) => return Err(e),
        }

        let current = normalized(resource, attribute);
        if current.as_deref() == Some(target.as_str()) {
            return Ok(());
        }
        if let Some(ref current) = current {
            if failures.contains(current) {
                return Err(Error::ResourceFailure(format!(
                    "{} transitioned to failure state {}",
                    name, current
                )));
            }
        }

        tracing::debug!(
            "Still waiting for {} to reach {} {}, currently {:?}",
            name,
            attribute,
            status,
            current
        );
    }
}

/// Wait until fetching the resource reports not-found (or a `deleted` status)
pub async fn wait_for_delete(
    session: &dyn Session,
    resource: &mut Resource,
    interval: Duration,
    wait: Option<Duration>,
) -> Result<()> {
    let name = describe(resource);
    let mut ticker = iterate_timeout(
        wait,
        interval,
        format!("Timeout waiting for {} to delete", name),
    );

    loop {
        ticker.next().await?;

        match resource.fetch(session).await {
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
            Ok(()) => {
                if normalized(resource, "status").as_deref() == Some("deleted") {
                    return Ok(());
                }
                tracing::debug!("Still waiting for {} to be deleted", name);
            },
        }
    }
}
