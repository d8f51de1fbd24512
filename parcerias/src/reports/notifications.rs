use async_trait::async_trait;
use tracing::{debug, warn};

use super::{skip_on_missing, Report, ReportKind, RowOutcome};
use crate::extract::{ExtractedDetail, Extractor};
use crate::input::InstrumentRecord;
use crate::navigator::Navigator;
use crate::notification::{compute, format_date, Modality};
use crate::output::{OutputRow, PersistencePolicy};
use crate::RobotError;

const HEADER: &[&str] = &[
    "Instrumento nº",
    "Data de Término da Vigência",
    "Notificação 1",
    "Notificação 2",
    "Técnico",
    "Email do Técnico",
];

/// When each technician must be warned that an instrument is about to expire
pub struct NotificationsReport;

#[async_trait]
impl Report for NotificationsReport {
    fn kind(&self) -> ReportKind {
        ReportKind::Notifications
    }

    fn header(&self) -> &'static [&'static str] {
        HEADER
    }

    fn sheet_name(&self) -> &'static str {
        "Instrumentos"
    }

    fn default_persistence(&self) -> PersistencePolicy {
        PersistencePolicy::Incremental
    }

    async fn collect(
        &self,
        nav: &Navigator<'_>,
        extractor: &Extractor<'_>,
        record: &InstrumentRecord,
    ) -> Result<RowOutcome, RobotError> {
        nav.goto_detail(&record.instrument_number).await?;

        let termination = match extractor.extract_termination_date().await {
            Ok(date) => date,
            Err(e) => return skip_on_missing(e, "termination date"),
        };
        let detail = ExtractedDetail {
            termination_date: Some(termination),
            modality: Some(extractor.extract_modality().await?),
            ..Default::default()
        };
        let modality = Modality::from_label(detail.modality.as_deref().unwrap_or_default());
        debug!(%modality, %termination, "Instrument validity");

        let Some(notices) = compute(&modality, termination) else {
            warn!(instrument = %record.instrument_number, %modality, "No notice rule for modality");
            return Ok(RowOutcome::Skipped(format!("unknown modality {modality:?}")));
        };

        Ok(RowOutcome::Row(OutputRow::new([
            record.instrument_number.clone(),
            detail.termination_date_cell(),
            format_date(notices.first_notice),
            format_date(notices.second_notice),
            record.technician_name.clone(),
            record.technician_email.clone(),
        ])))
    }
}
