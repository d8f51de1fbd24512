use async_trait::async_trait;

use super::{skip_on_missing, Report, ReportKind, RowOutcome};
use crate::extract::{ExtractedDetail, Extractor};
use crate::input::InstrumentRecord;
use crate::navigator::Navigator;
use crate::notification::{compute, format_date, Modality};
use crate::output::{OutputRow, PersistencePolicy};
use crate::RobotError;

/// Cell value when a column does not apply to the instrument.
const NOT_APPLICABLE: &str = "N/A";

const HEADER: &[&str] = &[
    "Instrumento nº",
    "Data de Término",
    "Modalidade",
    "Data de Notificação 1",
    "Data de Notificação 2",
    "Notificação Enviada",
    "Técnico",
    "E-mail",
];

/// Every instrument's end of validity, including modalities without a notice
/// rule. The sent column is left for the team to fill in.
pub struct ValidityReport;

#[async_trait]
impl Report for ValidityReport {
    fn kind(&self) -> ReportKind {
        ReportKind::Validity
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
        let (first, second) = match compute(&modality, termination) {
            Some(pair) => (
                format_date(pair.first_notice),
                format_date(pair.second_notice),
            ),
            None => (NOT_APPLICABLE.to_string(), NOT_APPLICABLE.to_string()),
        };

        Ok(RowOutcome::Row(OutputRow::new([
            record.instrument_number.clone(),
            detail.termination_date_cell(),
            modality.to_string(),
            first,
            second,
            NOT_APPLICABLE.to_string(),
            record.technician_name.clone(),
            record.technician_email.clone(),
        ])))
    }
}
