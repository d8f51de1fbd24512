//! The partnership control sheet the robot works through.

use std::path::PathBuf;

use calamine::{open_workbook_auto, Data, Reader};
use chrono::Timelike;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::RobotError;

pub const COL_INSTRUMENT: &str = "Instrumento nº";
pub const COL_TECHNICIAN: &str = "Técnico";
pub const COL_TECHNICIAN_EMAIL: &str = "e-mail do Técnico";
pub const COL_STATUS: &str = "Status";

pub const REQUIRED_COLUMNS: [&str; 4] = [
    COL_INSTRUMENT,
    COL_TECHNICIAN,
    COL_TECHNICIAN_EMAIL,
    COL_STATUS,
];

/// Status value marking an instrument as in scope
pub const ACTIVE_MARKER: &str = "ATIVOS TODOS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordStatus {
    Active,
    Inactive,
    Unknown,
}

impl RecordStatus {
    /// Only the exact marker is active; surrounding spaces make it another value.
    pub fn from_cell(text: &str) -> Self {
        if text == ACTIVE_MARKER {
            RecordStatus::Active
        } else if text.trim().is_empty() {
            RecordStatus::Unknown
        } else {
            RecordStatus::Inactive
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentRecord {
    pub instrument_number: String,
    pub technician_name: String,
    pub technician_email: String,
    pub status: RecordStatus,
}

/// Where the control sheet lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSource {
    pub path: PathBuf,
    pub sheet: String,
}

/// Instrument numbers are typed into the portal, so spreadsheet float
/// artifacts like `12345.0` must go.
pub fn canonical_instrument_number(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some((whole, fraction)) = trimmed.split_once('.') {
        let whole_is_digits = !whole.is_empty() && whole.chars().all(|c| c.is_ascii_digit());
        let fraction_is_zero = !fraction.is_empty() && fraction.chars().all(|c| c == '0');
        if whole_is_digits && fraction_is_zero {
            return whole.to_string();
        }
    }
    trimmed.to_string()
}

/// Cell contents as the portal would print them. Text is returned untouched.
pub(crate) fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 => {
            format!("{}", *f as i64)
        }
        Data::DateTime(serial) if serial.is_datetime() => match serial.as_datetime() {
            Some(at) if at.num_seconds_from_midnight() == 0 => at.format("%d/%m/%Y").to_string(),
            Some(at) => at.format("%d/%m/%Y %H:%M:%S").to_string(),
            None => serial.as_f64().to_string(),
        },
        other => other.to_string(),
    }
}

/// Read the active instruments from the control sheet.
#[instrument(skip(source), fields(path = %source.path.display(), sheet = %source.sheet))]
pub fn load(source: &InputSource) -> Result<Vec<InstrumentRecord>, RobotError> {
    let mut workbook = open_workbook_auto(&source.path).map_err(|e| {
        RobotError::Spreadsheet(format!("could not open {}: {e}", source.path.display()))
    })?;
    let range = workbook.worksheet_range(&source.sheet).map_err(|e| {
        RobotError::Spreadsheet(format!(
            "could not read sheet {:?} of {}: {e}",
            source.sheet,
            source.path.display()
        ))
    })?;

    records_from_rows(
        range
            .rows()
            .map(|row| row.iter().map(cell_text).collect::<Vec<String>>()),
    )
}

/// Header row first, then data rows, all as text.
pub fn records_from_rows<I>(rows: I) -> Result<Vec<InstrumentRecord>, RobotError>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut rows = rows.into_iter();
    let header: Vec<String> = rows
        .next()
        .unwrap_or_default()
        .into_iter()
        .map(|h| h.trim().to_string())
        .collect();
    debug!(columns = ?header, "Input columns");

    let position = |name: &str| header.iter().position(|h| h == name);
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|&&c| position(c).is_none())
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(RobotError::Schema { missing });
    }
    // Presence was just checked.
    let [number_idx, technician_idx, email_idx, status_idx] =
        REQUIRED_COLUMNS.map(|c| position(c).unwrap_or_default());

    let mut records = Vec::new();
    let mut dropped = 0usize;
    for row in rows {
        let cell = |idx: usize| row.get(idx).map(|s| s.trim()).unwrap_or("");
        let status = RecordStatus::from_cell(row.get(status_idx).map_or("", String::as_str));
        let number = canonical_instrument_number(cell(number_idx));
        let technician = cell(technician_idx);
        let email = cell(email_idx);

        if status != RecordStatus::Active
            || number.is_empty()
            || technician.is_empty()
            || email.is_empty()
        {
            dropped += 1;
            continue;
        }

        records.push(InstrumentRecord {
            instrument_number: number,
            technician_name: technician.to_string(),
            technician_email: email.to_string(),
            status,
        });
    }

    info!(active = records.len(), dropped, "Instruments loaded");
    Ok(records)
}
