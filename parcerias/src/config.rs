//! YAML configuration. Every section and field is optional; paths are not.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::driver::{CdpOptions, DebuggerEndpoint, ReleaseMode};
use crate::input::InputSource;
use crate::locators::{LocatorTable, Step};
use crate::output::PersistencePolicy;
use crate::reports::Report;
use crate::runner::BatchJob;
use crate::session::{AttachOptions, Timeouts};
use crate::{RobotError, Selector};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub endpoint: String,
    pub attach_retries: u32,
    pub attach_backoff_ms: u64,
    /// Pick the tab whose URL contains this text instead of the first page
    pub tab_url_contains: Option<String>,
    /// Close the browser at the end instead of only detaching
    pub quit_on_finish: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            endpoint: DebuggerEndpoint::default().to_string(),
            attach_retries: 3,
            attach_backoff_ms: 3000,
            tab_url_contains: None,
            quit_on_finish: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub path: Option<PathBuf>,
    pub sheet: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            path: None,
            sheet: "PARCERIAS CGAP".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub path: Option<PathBuf>,
    /// Falls back to the report's own default when absent
    pub persistence: Option<PersistencePolicy>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub step_ms: u64,
    pub optional_ms: u64,
    pub poll_ms: u64,
    pub command_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            step_ms: 10_000,
            optional_ms: 5_000,
            poll_ms: 250,
            command_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MembersConfig {
    /// Page holding the members table
    pub url: Option<String>,
    /// Roles looked for, first match wins
    pub roles: Vec<String>,
}

impl Default for MembersConfig {
    fn default() -> Self {
        Self {
            url: None,
            roles: vec!["Presidente".to_string(), "Prefeito".to_string()],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub browser: BrowserConfig,
    pub input: InputConfig,
    pub output: OutputConfig,
    pub timeouts: TimeoutConfig,
    pub members: MembersConfig,
    /// Replacements for entries of the default locator table
    pub locators: BTreeMap<Step, Selector>,
}

impl RobotConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, RobotError> {
        serde_yaml::from_str(yaml).map_err(|e| RobotError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, RobotError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            RobotError::Config(format!("could not read {}: {e}", path.display()))
        })?;
        let config = Self::from_yaml_str(&text)
            .map_err(|e| RobotError::Config(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            step: Duration::from_millis(self.timeouts.step_ms),
            optional: Duration::from_millis(self.timeouts.optional_ms),
            poll_interval: Duration::from_millis(self.timeouts.poll_ms),
        }
    }

    pub fn attach_options(&self) -> Result<AttachOptions, RobotError> {
        Ok(AttachOptions {
            endpoint: DebuggerEndpoint::parse(&self.browser.endpoint)?,
            attempts: self.browser.attach_retries,
            backoff: Duration::from_millis(self.browser.attach_backoff_ms),
            cdp: CdpOptions {
                tab_url_contains: self.browser.tab_url_contains.clone(),
                command_timeout: Duration::from_millis(self.timeouts.command_ms),
            },
        })
    }

    pub fn release_mode(&self) -> ReleaseMode {
        if self.browser.quit_on_finish {
            ReleaseMode::QuitBrowser
        } else {
            ReleaseMode::Detach
        }
    }

    /// Defaults, then the report's own paths, then the configured overrides.
    pub fn locator_table(&self, report: Option<&dyn Report>) -> LocatorTable {
        let mut table = LocatorTable::defaults();
        if let Some(report) = report {
            table.merge(report.locator_overrides());
        }
        table.merge(self.locators.clone());
        table
    }

    pub fn batch_job(&self, report: &dyn Report) -> Result<BatchJob, RobotError> {
        let input = self.input.path.clone().ok_or_else(|| {
            RobotError::Config("no input spreadsheet configured (input.path or --input)".into())
        })?;
        let output = self.output.path.clone().ok_or_else(|| {
            RobotError::Config("no output spreadsheet configured (output.path or --output)".into())
        })?;

        Ok(BatchJob {
            input: InputSource {
                path: input,
                sheet: self.input.sheet.clone(),
            },
            output,
            persistence: self
                .output
                .persistence
                .unwrap_or_else(|| report.default_persistence()),
            locators: self.locator_table(Some(report)),
            release: self.release_mode(),
        })
    }
}
