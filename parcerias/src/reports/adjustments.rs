use async_trait::async_trait;
use tracing::info;

use super::{Report, ReportKind, RowOutcome};
use crate::extract::{ExtractedDetail, Extractor, Situation};
use crate::input::InstrumentRecord;
use crate::locators::Step;
use crate::navigator::Navigator;
use crate::output::{OutputRow, PersistencePolicy};
use crate::{RobotError, Selector};

/// Work plans are reached through the proposal search, one entry above the
/// instrument search the other reports use.
const PROPOSAL_SEARCH_SUBMENU: &str = r#"//*[@id="contentMenu"]/div[1]/ul/li[5]/a"#;

const HEADER: &[&str] = &[
    "Instrumento nº",
    "Técnico",
    "e-mail do Técnico",
    "AjustesPT",
    "Data da Solicitação",
];

pub struct AdjustmentsReport;

#[async_trait]
impl Report for AdjustmentsReport {
    fn kind(&self) -> ReportKind {
        ReportKind::Adjustments
    }

    fn header(&self) -> &'static [&'static str] {
        HEADER
    }

    fn sheet_name(&self) -> &'static str {
        "Resultados"
    }

    fn default_persistence(&self) -> PersistencePolicy {
        PersistencePolicy::Batched
    }

    fn locator_overrides(&self) -> Vec<(Step, Selector)> {
        vec![(Step::SearchSubmenu, Selector::from(PROPOSAL_SEARCH_SUBMENU))]
    }

    async fn collect(
        &self,
        nav: &Navigator<'_>,
        extractor: &Extractor<'_>,
        record: &InstrumentRecord,
    ) -> Result<RowOutcome, RobotError> {
        nav.goto_detail(&record.instrument_number).await?;
        nav.open_adjustments().await?;

        let situation = extractor.extract_status().await?;
        let request_date = match situation {
            Situation::InAnalysis(_) => extractor.extract_request_date().await?,
            Situation::NoAdjustment => String::new(),
        };
        info!(instrument = %record.instrument_number, %situation, "Adjustment situation");
        let detail = ExtractedDetail {
            situation: Some(situation),
            request_date: Some(request_date),
            ..Default::default()
        };

        Ok(RowOutcome::Row(OutputRow::new([
            record.instrument_number.clone(),
            record.technician_name.clone(),
            record.technician_email.clone(),
            detail.situation_cell(),
            detail.request_date_cell(),
        ])))
    }
}
