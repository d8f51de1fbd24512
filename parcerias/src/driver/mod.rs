use crate::{RobotError, Selector};
use serde::{Deserialize, Serialize};

pub mod cdp;

pub use cdp::{CdpDriver, CdpOptions, DebuggerEndpoint};

/// What a single look at an element returned
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ElementSnapshot {
    /// Rendered text, trimmed
    pub text: String,
    /// Has a layout box and is not hidden by style
    pub visible: bool,
    /// Not disabled
    pub enabled: bool,
}

impl ElementSnapshot {
    /// Same notion of "clickable" a WebDriver wait uses: shown and enabled.
    pub fn is_interactable(&self) -> bool {
        self.visible && self.enabled
    }
}

/// How the session is let go at the end of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseMode {
    /// Drop our connection, leave the operator's browser running
    #[default]
    Detach,
    /// Ask the browser to close as well
    QuitBrowser,
}

/// The seam between the robot and a live browser tab.
///
/// Implementations never wait: every call is a single round trip. Waiting for
/// elements to show up is the job of [`crate::Locator`].
#[async_trait::async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Look at the first element matching `selector`, `None` if there is none.
    async fn probe(&self, selector: &Selector) -> Result<Option<ElementSnapshot>, RobotError>;

    /// Trimmed text of every element matching `selector`, in document order.
    async fn texts(&self, selector: &Selector) -> Result<Vec<String>, RobotError>;

    /// Click the first element matching `selector`.
    async fn click(&self, selector: &Selector) -> Result<(), RobotError>;

    /// Replace the value of the first input matching `selector`.
    async fn fill(&self, selector: &Selector, text: &str) -> Result<(), RobotError>;

    /// Load `url` in the attached tab and wait for the document to finish loading.
    async fn navigate(&self, url: &str) -> Result<(), RobotError>;

    /// Let go of the session.
    async fn release(&self, mode: ReleaseMode) -> Result<(), RobotError>;
}
