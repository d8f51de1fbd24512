use tracing::{debug, instrument};

use crate::driver::{BrowserDriver, ElementSnapshot};
use crate::errors::RobotError;
use crate::selector::Selector;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

// Used when neither the session nor the call sets one
const DEFAULT_LOCATOR_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// The state an element must reach before a wait succeeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitFor {
    /// In the DOM, shown or not
    Present,
    /// Shown and enabled
    Clickable,
}

impl WaitFor {
    fn is_met(self, snapshot: &ElementSnapshot) -> bool {
        match self {
            WaitFor::Present => true,
            WaitFor::Clickable => snapshot.is_interactable(),
        }
    }
}

/// A handle on "the element this selector points at", resolved lazily.
///
/// Every action first waits, up to a bounded timeout, for the element to reach
/// the state the action needs and then acts immediately.
#[derive(Clone)]
pub struct Locator {
    driver: Arc<dyn BrowserDriver>,
    selector: Selector,
    timeout: Duration,
    poll_interval: Duration,
}

impl Locator {
    pub(crate) fn new(driver: Arc<dyn BrowserDriver>, selector: Selector) -> Self {
        Self {
            driver,
            selector,
            timeout: DEFAULT_LOCATOR_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Timeout for waits that are not given one explicitly.
    pub fn set_default_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn set_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// One look at the element, without waiting.
    pub async fn probe(&self) -> Result<Option<ElementSnapshot>, RobotError> {
        self.ensure_valid()?;
        self.driver.probe(&self.selector).await
    }

    /// Poll until the element reaches `condition` or `timeout` (default: the
    /// locator's own) runs out.
    #[instrument(level = "debug", skip(self, timeout), fields(selector = %self.selector))]
    pub async fn wait(
        &self,
        condition: WaitFor,
        timeout: Option<Duration>,
    ) -> Result<ElementSnapshot, RobotError> {
        self.ensure_valid()?;
        let effective_timeout = timeout.unwrap_or(self.timeout);
        let deadline = Instant::now() + effective_timeout;

        loop {
            if let Some(snapshot) = self.driver.probe(&self.selector).await? {
                if condition.is_met(&snapshot) {
                    return Ok(snapshot);
                }
            }
            let now = Instant::now();
            if now >= deadline {
                debug!(?condition, "Gave up waiting");
                return Err(RobotError::Timeout(format!(
                    "Timed out after {effective_timeout:?} waiting for {} to be {condition:?}",
                    self.selector
                )));
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    pub async fn wait_present(&self, timeout: Option<Duration>) -> Result<ElementSnapshot, RobotError> {
        self.wait(WaitFor::Present, timeout).await
    }

    pub async fn wait_clickable(
        &self,
        timeout: Option<Duration>,
    ) -> Result<ElementSnapshot, RobotError> {
        self.wait(WaitFor::Clickable, timeout).await
    }

    pub async fn click(&self, timeout: Option<Duration>) -> Result<(), RobotError> {
        self.wait_clickable(timeout).await?;
        self.driver.click(&self.selector).await?;
        debug!(selector = %self.selector, "Clicked");
        Ok(())
    }

    pub async fn fill(&self, text: &str, timeout: Option<Duration>) -> Result<(), RobotError> {
        self.wait_clickable(timeout).await?;
        self.driver.fill(&self.selector, text).await?;
        debug!(selector = %self.selector, "Filled");
        Ok(())
    }

    /// Text of the element once it is present.
    pub async fn text(&self, timeout: Option<Duration>) -> Result<String, RobotError> {
        Ok(self.wait_present(timeout).await?.text)
    }

    /// Text of every current match, without waiting.
    pub async fn texts(&self) -> Result<Vec<String>, RobotError> {
        self.ensure_valid()?;
        self.driver.texts(&self.selector).await
    }

    fn ensure_valid(&self) -> Result<(), RobotError> {
        match &self.selector {
            Selector::Invalid(reason) => Err(RobotError::InvalidSelector(reason.clone())),
            _ => Ok(()),
        }
    }
}
