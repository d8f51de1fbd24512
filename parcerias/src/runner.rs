//! The batch loop: one report over every active instrument, one at a time.

use std::path::PathBuf;

use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

use crate::driver::ReleaseMode;
use crate::extract::Extractor;
use crate::input::{self, InputSource};
use crate::locators::LocatorTable;
use crate::navigator::Navigator;
use crate::output::{Accumulator, PersistencePolicy};
use crate::reports::{Report, RowOutcome};
use crate::{RobotError, Session};

/// Everything a report run needs besides the browser
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub input: InputSource,
    pub output: PathBuf,
    pub persistence: PersistencePolicy,
    pub locators: LocatorTable,
    pub release: ReleaseMode,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Active records in the control sheet
    pub total: usize,
    /// Rows accepted by the output
    pub written: usize,
    /// Instrument numbers with nothing to report
    pub skipped: Vec<String>,
    /// Instrument numbers that failed
    pub failed: Vec<String>,
}

/// Run `report` over the job's control sheet.
///
/// The session is released whatever happens. An error is returned only when
/// the batch could not run at all; per-instrument failures end up in the
/// summary and in the log.
pub async fn run_report(
    session: Session,
    report: &dyn Report,
    job: &BatchJob,
) -> Result<BatchSummary, RobotError> {
    let result = run_records(&session, report, job).await;
    if let Err(e) = session.release(job.release).await {
        warn!(error = %e, "Could not release the browser session cleanly");
    }
    result
}

#[instrument(skip_all, fields(report = %report.kind(), output = %job.output.display()))]
async fn run_records(
    session: &Session,
    report: &dyn Report,
    job: &BatchJob,
) -> Result<BatchSummary, RobotError> {
    // Read the control sheet first: a bad sheet must stop us before the
    // browser is touched or an output file is created.
    let records = input::load(&job.input)?;

    let store = report.store(&job.output);
    store.ensure_initialized()?;
    let mut rows = Accumulator::new(&store, job.persistence);

    let nav = Navigator::new(session, &job.locators);
    let extractor = Extractor::new(session, &job.locators);
    let mut summary = BatchSummary {
        total: records.len(),
        ..Default::default()
    };
    let batch_started = Instant::now();
    let mut fatal = None;

    for (idx, record) in records.iter().enumerate() {
        let number = &record.instrument_number;
        let started = Instant::now();
        info!(instrument = %number, "Processing instrument {}/{}", idx + 1, summary.total);

        if let Err(e) = nav.return_home().await {
            warn!(instrument = %number, error = %e, "Could not return to the landing page");
        }

        match report.collect(&nav, &extractor, record).await {
            Ok(RowOutcome::Row(row)) => match rows.push(row) {
                Ok(()) => summary.written += 1,
                Err(e) => {
                    error!(instrument = %number, error = %e, "Could not save row");
                    summary.failed.push(number.clone());
                }
            },
            Ok(RowOutcome::Skipped(reason)) => {
                warn!(instrument = %number, %reason, "Instrument skipped");
                summary.skipped.push(number.clone());
            }
            Err(e) if e.is_batch_fatal() => {
                error!(instrument = %number, error = %e, "Stopping batch");
                summary.failed.push(number.clone());
                fatal = Some(e);
                break;
            }
            Err(e) => {
                error!(instrument = %number, error = %e, "Failed to process instrument");
                summary.failed.push(number.clone());
            }
        }
        info!(instrument = %number, elapsed = ?started.elapsed(), "Instrument done");
    }

    // Rows collected before a stop are still worth keeping.
    let pending = rows.pending();
    if let Err(e) = rows.finish() {
        error!(error = %e, rows = pending, "Could not save collected rows");
        summary.written -= pending;
    }

    if let Some(e) = fatal {
        return Err(e);
    }
    info!(
        total = summary.total,
        written = summary.written,
        skipped = summary.skipped.len(),
        failed = summary.failed.len(),
        elapsed = ?batch_started.elapsed(),
        "Batch finished"
    );
    Ok(summary)
}

/// Open `url` and press the action button of the first member holding one of
/// `roles`. Returns the role found.
#[instrument(skip(session, locators))]
pub async fn open_member_actions(
    session: Session,
    locators: &LocatorTable,
    url: &str,
    roles: &[String],
    release: ReleaseMode,
) -> Result<Option<String>, RobotError> {
    let nav = Navigator::new(&session, locators);
    let result = async {
        nav.open_url(url).await?;
        nav.click_member_action(roles).await
    }
    .await;

    match &result {
        Ok(Some(role)) => info!(%role, "Member actions opened"),
        Ok(None) => warn!(?roles, "No member holds any of the roles"),
        Err(e) => error!(error = %e, "Could not open member actions"),
    }
    if let Err(e) = session.release(release).await {
        warn!(error = %e, "Could not release the browser session cleanly");
    }
    result
}
