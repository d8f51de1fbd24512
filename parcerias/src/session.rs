use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::driver::{BrowserDriver, CdpDriver, CdpOptions, DebuggerEndpoint, ReleaseMode};
use crate::{Locator, RobotError, Selector};

/// Bounded waits used while driving the portal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Waiting for a navigation target to become clickable
    pub step: Duration,
    /// Waiting for something that may legitimately be absent
    pub optional: Duration,
    /// Delay between two looks at the page while waiting
    pub poll_interval: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            step: Duration::from_secs(10),
            optional: Duration::from_secs(5),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// How to reach the operator's browser
#[derive(Debug, Clone)]
pub struct AttachOptions {
    pub endpoint: DebuggerEndpoint,
    pub attempts: u32,
    pub backoff: Duration,
    pub cdp: CdpOptions,
}

impl Default for AttachOptions {
    fn default() -> Self {
        Self {
            endpoint: DebuggerEndpoint::default(),
            attempts: 3,
            backoff: Duration::from_secs(3),
            cdp: CdpOptions::default(),
        }
    }
}

/// Run `connect` up to `attempts` times, sleeping `backoff` between failures.
///
/// The closure receives the 1-based attempt number.
pub async fn attach_with_retry<T, F, Fut>(
    target: &str,
    attempts: u32,
    backoff: Duration,
    mut connect: F,
) -> Result<T, RobotError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, RobotError>>,
{
    let attempts = attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        info!(attempt, attempts, "Connecting to browser at {}", target);
        match connect(attempt).await {
            Ok(handle) => {
                info!("Attached to the running browser");
                return Ok(handle);
            }
            Err(e) => {
                warn!(attempt, error = %e, "Could not attach to browser");
                last_error = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    let cause = last_error.map(|e| e.to_string()).unwrap_or_default();
    Err(RobotError::Connection(format!(
        "gave up on {target} after {attempts} attempt(s): {cause}"
    )))
}

/// Attach to the already running, already logged-in browser.
#[instrument(skip(options, timeouts), fields(endpoint = %options.endpoint))]
pub async fn attach(options: &AttachOptions, timeouts: Timeouts) -> Result<Session, RobotError> {
    let target = options.endpoint.to_string();
    let driver = attach_with_retry(&target, options.attempts, options.backoff, |_| {
        CdpDriver::connect(&options.endpoint, &options.cdp)
    })
    .await?;
    Ok(Session::new(Arc::new(driver), timeouts))
}

/// The one browser tab a batch runs against
#[derive(Clone)]
pub struct Session {
    driver: Arc<dyn BrowserDriver>,
    timeouts: Timeouts,
}

impl Session {
    pub fn new(driver: Arc<dyn BrowserDriver>, timeouts: Timeouts) -> Self {
        Self { driver, timeouts }
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// A locator bound to this session, using the step timeout by default.
    pub fn locator(&self, selector: impl Into<Selector>) -> Locator {
        Locator::new(self.driver.clone(), selector.into())
            .set_default_timeout(self.timeouts.step)
            .set_poll_interval(self.timeouts.poll_interval)
    }

    pub async fn navigate(&self, url: &str) -> Result<(), RobotError> {
        self.driver.navigate(url).await
    }

    /// Let go of the browser; the session is unusable afterwards.
    pub async fn release(self, mode: ReleaseMode) -> Result<(), RobotError> {
        info!(?mode, "Releasing browser session");
        self.driver.release(mode).await
    }
}
