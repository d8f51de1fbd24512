use std::fmt;

use chrono::NaiveDate;
use tracing::{debug, instrument, warn};

use crate::locators::{LocatorTable, Step};
use crate::notification::{format_date, DATE_FORMAT};
use crate::{Locator, RobotError, Session};

pub const NO_ADJUSTMENT: &str = "Sem ajuste";
pub const NO_ATTACHMENTS: &str = "Sem anexos";
pub const CAPTURE_ERROR: &str = "Erro ao capturar data";

/// Adjustment situation of the work plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Situation {
    /// The text of the "Em Análise" cell
    InAnalysis(String),
    /// Nothing under analysis. A valid answer, not a failure.
    NoAdjustment,
}

impl fmt::Display for Situation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Situation::InAnalysis(text) => f.write_str(text),
            Situation::NoAdjustment => f.write_str(NO_ADJUSTMENT),
        }
    }
}

/// Most recent upload in the attachments table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentDate {
    Latest(NaiveDate),
    NoAttachments,
    CaptureError,
}

impl fmt::Display for AttachmentDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachmentDate::Latest(date) => f.write_str(&format_date(*date)),
            AttachmentDate::NoAttachments => f.write_str(NO_ATTACHMENTS),
            AttachmentDate::CaptureError => f.write_str(CAPTURE_ERROR),
        }
    }
}

/// Everything read from one instrument's pages. Each report fills in the
/// fields it asks for and turns them into cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedDetail {
    pub situation: Option<Situation>,
    pub request_date: Option<String>,
    pub termination_date: Option<NaiveDate>,
    pub modality: Option<String>,
    pub last_attachment_date: Option<AttachmentDate>,
}

impl ExtractedDetail {
    pub fn situation_cell(&self) -> String {
        self.situation.as_ref().map(ToString::to_string).unwrap_or_default()
    }

    pub fn request_date_cell(&self) -> String {
        self.request_date.clone().unwrap_or_default()
    }

    pub fn termination_date_cell(&self) -> String {
        self.termination_date.map(format_date).unwrap_or_default()
    }

    /// A date that was never read counts as not captured.
    pub fn last_attachment_date_cell(&self) -> String {
        self.last_attachment_date
            .unwrap_or(AttachmentDate::CaptureError)
            .to_string()
    }
}

pub fn parse_portal_date(text: &str) -> Result<NaiveDate, RobotError> {
    let trimmed = text.trim();
    NaiveDate::parse_from_str(trimmed, DATE_FORMAT).map_err(|e| RobotError::Parse {
        text: trimmed.to_string(),
        reason: e.to_string(),
    })
}

/// Cells the portal fills with nothing or a dash when no date applies.
fn is_placeholder(text: &str) -> bool {
    text.chars()
        .all(|c| c.is_whitespace() || matches!(c, '-' | '–' | '—'))
}

/// Latest date among the attachment date cells.
pub fn latest_attachment_date<I, S>(cells: I) -> AttachmentDate
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut latest: Option<NaiveDate> = None;
    for cell in cells {
        let text = cell.as_ref();
        if is_placeholder(text) {
            continue;
        }
        match parse_portal_date(text) {
            Ok(date) => latest = latest.max(Some(date)),
            Err(e) => {
                warn!(error = %e, "Attachment date cell is not a date");
                return AttachmentDate::CaptureError;
            }
        }
    }
    latest.map_or(AttachmentDate::NoAttachments, AttachmentDate::Latest)
}

/// Reads fields off the instrument pages once the navigator has opened them
pub struct Extractor<'a> {
    session: &'a Session,
    locators: &'a LocatorTable,
}

impl<'a> Extractor<'a> {
    pub fn new(session: &'a Session, locators: &'a LocatorTable) -> Self {
        Self { session, locators }
    }

    fn locator(&self, step: Step) -> Result<Locator, RobotError> {
        Ok(self.session.locator(self.locators.get(step)?.clone()))
    }

    /// Situation of the work-plan adjustment. A missing "Em Análise" cell is
    /// an answer, so a timeout here is not an error.
    #[instrument(skip(self))]
    pub async fn extract_status(&self) -> Result<Situation, RobotError> {
        let optional = self.session.timeouts().optional;
        match self
            .locator(Step::AdjustmentInAnalysis)?
            .text(Some(optional))
            .await
        {
            Ok(text) => Ok(Situation::InAnalysis(text)),
            Err(e) if e.is_timeout() => {
                debug!("No adjustment under analysis");
                Ok(Situation::NoAdjustment)
            }
            Err(e) => Err(e),
        }
    }

    /// Opens the adjustment under analysis and reads when it was requested.
    #[instrument(skip(self))]
    pub async fn extract_request_date(&self) -> Result<String, RobotError> {
        self.locator(Step::AdjustmentDetailLink)?.click(None).await?;
        self.locator(Step::RequestDate)?.text(None).await
    }

    #[instrument(skip(self))]
    pub async fn extract_termination_date(&self) -> Result<NaiveDate, RobotError> {
        let optional = self.session.timeouts().optional;
        let text = self
            .locator(Step::TerminationDate)?
            .text(Some(optional))
            .await?;
        debug!(%text, "Termination date cell");
        parse_portal_date(&text)
    }

    #[instrument(skip(self))]
    pub async fn extract_modality(&self) -> Result<String, RobotError> {
        let text = self.locator(Step::Modality)?.text(None).await?;
        Ok(text.trim().to_string())
    }

    /// Never fails: a table that does not show up in time is reported as
    /// [`AttachmentDate::CaptureError`].
    #[instrument(skip(self))]
    pub async fn extract_last_attachment_date(&self) -> AttachmentDate {
        let optional = self.session.timeouts().optional;
        let rows = match self.locator(Step::AttachmentRows) {
            Ok(l) => l,
            Err(e) => {
                warn!(error = %e, "Attachment rows locator missing");
                return AttachmentDate::CaptureError;
            }
        };
        if let Err(e) = rows.wait_present(Some(optional)).await {
            warn!(error = %e, "Attachments table did not show up");
            return AttachmentDate::CaptureError;
        }

        let cells = match self.locator(Step::AttachmentDates) {
            Ok(l) => l.texts().await,
            Err(e) => Err(e),
        };
        match cells {
            Ok(cells) => latest_attachment_date(cells),
            Err(e) => {
                warn!(error = %e, "Could not read attachment dates");
                AttachmentDate::CaptureError
            }
        }
    }
}
