use async_trait::async_trait;
use tracing::{info, warn};

use super::{Report, ReportKind, RowOutcome};
use crate::extract::{AttachmentDate, ExtractedDetail, Extractor};
use crate::input::InstrumentRecord;
use crate::navigator::Navigator;
use crate::output::{OutputRow, PersistencePolicy};
use crate::RobotError;

const HEADER: &[&str] = &[
    "Número do Instrumento",
    "Técnico Responsável",
    "Email",
    "AnexosExistentes",
    "NovosAnexos",
];

/// Placeholder for the new-uploads column, filled in by the team.
const NO_NEW_ATTACHMENTS: &str = "Nenhum";

pub struct AttachmentsReport;

#[async_trait]
impl Report for AttachmentsReport {
    fn kind(&self) -> ReportKind {
        ReportKind::Attachments
    }

    fn header(&self) -> &'static [&'static str] {
        HEADER
    }

    fn sheet_name(&self) -> &'static str {
        "Dados Processados"
    }

    fn default_persistence(&self) -> PersistencePolicy {
        PersistencePolicy::Batched
    }

    async fn collect(
        &self,
        nav: &Navigator<'_>,
        extractor: &Extractor<'_>,
        record: &InstrumentRecord,
    ) -> Result<RowOutcome, RobotError> {
        nav.goto_detail(&record.instrument_number).await?;

        // An attachments tab that will not open is reported in the row, not as a failure.
        let latest = match nav.open_attachments().await {
            Ok(()) => extractor.extract_last_attachment_date().await,
            Err(e) if e.is_timeout() => {
                warn!(instrument = %record.instrument_number, error = %e, "Attachments tab did not open");
                AttachmentDate::CaptureError
            }
            Err(e) => return Err(e),
        };
        info!(instrument = %record.instrument_number, %latest, "Latest attachment");
        let detail = ExtractedDetail {
            last_attachment_date: Some(latest),
            ..Default::default()
        };

        Ok(RowOutcome::Row(OutputRow::new([
            record.instrument_number.clone(),
            record.technician_name.clone(),
            record.technician_email.clone(),
            detail.last_attachment_date_cell(),
            NO_NEW_ATTACHMENTS.to_string(),
        ])))
    }
}
