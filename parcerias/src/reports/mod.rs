//! The reports the robot knows how to produce.
//!
//! Each report is the same walk over the control sheet with a different
//! question asked of every instrument's pages. A [`Report`] says where the
//! rows go and how one row is collected; the batch loop in
//! [`crate::runner`] does the rest.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::extract::Extractor;
use crate::input::InstrumentRecord;
use crate::locators::Step;
use crate::navigator::Navigator;
use crate::output::{OutputRow, OutputStore, PersistencePolicy};
use crate::{RobotError, Selector};

mod adjustments;
mod attachments;
mod notifications;
mod validity;

pub use adjustments::AdjustmentsReport;
pub use attachments::AttachmentsReport;
pub use notifications::NotificationsReport;
pub use validity::ValidityReport;

/// What collecting one instrument produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Row(OutputRow),
    /// Nothing to report for this instrument, with the reason
    Skipped(String),
}

#[async_trait]
pub trait Report: Send + Sync {
    fn kind(&self) -> ReportKind;

    /// Column titles, in row order
    fn header(&self) -> &'static [&'static str];

    fn sheet_name(&self) -> &'static str;

    fn default_persistence(&self) -> PersistencePolicy;

    /// Steps this report reaches through a different path than the default table.
    fn locator_overrides(&self) -> Vec<(Step, Selector)> {
        Vec::new()
    }

    /// Navigate to `record`'s pages and build its row. Starts from the landing page.
    async fn collect(
        &self,
        nav: &Navigator<'_>,
        extractor: &Extractor<'_>,
        record: &InstrumentRecord,
    ) -> Result<RowOutcome, RobotError>;

    fn store(&self, path: &Path) -> OutputStore {
        OutputStore::new(path, self.sheet_name(), self.header().iter().copied())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    /// Work-plan adjustments under analysis
    Adjustments,
    /// Notice dates ahead of the end of validity
    Notifications,
    /// End of validity per modality, with a notice-sent column to fill in
    Validity,
    /// Latest attachment upload
    Attachments,
}

impl ReportKind {
    pub const ALL: [ReportKind; 4] = [
        ReportKind::Adjustments,
        ReportKind::Notifications,
        ReportKind::Validity,
        ReportKind::Attachments,
    ];

    /// Name of the subcommand that runs this report
    pub fn command_name(self) -> &'static str {
        match self {
            ReportKind::Adjustments => "ajustes",
            ReportKind::Notifications => "notificacoes",
            ReportKind::Validity => "vigencia",
            ReportKind::Attachments => "anexos",
        }
    }

    pub fn build(self) -> Box<dyn Report> {
        match self {
            ReportKind::Adjustments => Box::new(AdjustmentsReport),
            ReportKind::Notifications => Box::new(NotificationsReport),
            ReportKind::Validity => Box::new(ValidityReport),
            ReportKind::Attachments => Box::new(AttachmentsReport),
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReportKind::Adjustments => "adjustments",
            ReportKind::Notifications => "notifications",
            ReportKind::Validity => "validity",
            ReportKind::Attachments => "attachments",
        };
        f.write_str(name)
    }
}

impl FromStr for ReportKind {
    type Err = String;

    /// Accepts the English names and the command-line subcommand names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        ReportKind::ALL
            .into_iter()
            .find(|k| k.to_string() == wanted || k.command_name() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = ReportKind::ALL.iter().map(|k| k.command_name()).collect();
                format!("unknown report {s:?}, expected one of {}", known.join(", "))
            })
    }
}

/// A timed-out or unreadable field means the instrument has nothing to
/// report; anything else is a real failure.
pub(crate) fn skip_on_missing(error: RobotError, field: &str) -> Result<RowOutcome, RobotError> {
    match error {
        RobotError::Timeout(_) | RobotError::Parse { .. } => {
            warn!(%field, error = %error, "Field unavailable");
            Ok(RowOutcome::Skipped(format!("{field} unavailable: {error}")))
        }
        other => Err(other),
    }
}
