//! The report workbook: one header row, then one row per processed instrument.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use calamine::{open_workbook_auto, Data, Range, Reader, Sheets};
use chrono::Timelike;
use rust_xlsxwriter::{Format, Formula, Workbook, Worksheet};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::input::cell_text;
use crate::RobotError;

/// When rows reach the disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistencePolicy {
    /// Save after every instrument; a crash keeps everything done so far
    #[default]
    Incremental,
    /// Keep rows in memory and save once at the end
    Batched,
}

impl fmt::Display for PersistencePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistencePolicy::Incremental => f.write_str("incremental"),
            PersistencePolicy::Batched => f.write_str("batched"),
        }
    }
}

impl FromStr for PersistencePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "incremental" => Ok(PersistencePolicy::Incremental),
            "batched" | "batch" => Ok(PersistencePolicy::Batched),
            other => Err(format!(
                "unknown persistence policy {other:?}, expected 'incremental' or 'batched'"
            )),
        }
    }
}

/// One line of a report, cells in header order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRow(Vec<String>);

impl OutputRow {
    pub fn new<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(cells.into_iter().map(Into::into).collect())
    }

    pub fn cells(&self) -> &[String] {
        &self.0
    }
}

/// An append-only report workbook on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputStore {
    path: PathBuf,
    sheet_name: String,
    header: Vec<String>,
}

impl OutputStore {
    pub fn new<S: Into<String>>(
        path: impl Into<PathBuf>,
        sheet_name: impl Into<String>,
        header: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            path: path.into(),
            sheet_name: sheet_name.into(),
            header: header.into_iter().map(Into::into).collect(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Create the workbook with its header row unless it already exists.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn ensure_initialized(&self) -> Result<(), RobotError> {
        if self.path.exists() {
            let rows = self.read_rows()?;
            if rows.first().map(Vec::as_slice) != Some(self.header.as_slice()) {
                warn!(found = ?rows.first(), expected = ?self.header, "Existing report has a different header");
            }
            info!(rows = rows.len().saturating_sub(1), "Report exists and will be appended to");
            return Ok(());
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&self.sheet_name)?;
        write_rows(worksheet, 0, [self.header.as_slice()])?;
        self.save(&mut workbook)?;
        info!("Report created with header");
        Ok(())
    }

    fn open(&self) -> Result<Sheets<BufReader<File>>, RobotError> {
        open_workbook_auto(&self.path).map_err(|e| {
            RobotError::Spreadsheet(format!("could not open {}: {e}", self.path.display()))
        })
    }

    /// The report's own sheet, or the first one when it was renamed.
    fn report_sheet(&self, names: &[String]) -> Result<String, RobotError> {
        names
            .iter()
            .find(|n| **n == self.sheet_name)
            .or_else(|| names.first())
            .cloned()
            .ok_or_else(|| RobotError::Spreadsheet(format!("{} has no sheets", self.path.display())))
    }

    /// Every row of the report, header included.
    pub fn read_rows(&self) -> Result<Vec<Vec<String>>, RobotError> {
        let mut workbook = self.open()?;
        let sheet = self.report_sheet(&workbook.sheet_names())?;
        let range = workbook.worksheet_range(&sheet)?;

        Ok(range
            .rows()
            .map(|row| row.iter().map(cell_text).collect())
            .collect())
    }

    pub fn append(&self, row: &OutputRow) -> Result<(), RobotError> {
        self.append_all(std::slice::from_ref(row))
    }

    /// Add `new_rows` under the last used row of the report sheet.
    ///
    /// The workbook is rewritten with every sheet it had. Cells keep their
    /// type (numbers, dates, booleans, formulas); other formatting is not
    /// carried over.
    pub fn append_all(&self, new_rows: &[OutputRow]) -> Result<(), RobotError> {
        if new_rows.is_empty() {
            return Ok(());
        }
        let mut source = self.open()?;
        let names = source.sheet_names();
        let target = self.report_sheet(&names)?;

        let formats = CellFormats::new();
        let mut workbook = Workbook::new();
        let mut next_row = 0;
        for name in &names {
            let values = source.worksheet_range(name)?;
            // Not every format exposes formulas; values alone are still worth keeping.
            let formulas = source.worksheet_formula(name).ok();
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(name)?;
            copy_sheet(worksheet, &values, formulas.as_ref(), &formats)?;
            if *name == target {
                next_row = values.end().map_or(0, |(row, _)| row + 1);
            }
        }

        let worksheet = workbook.worksheet_from_name(&target)?;
        write_rows(worksheet, next_row, new_rows.iter().map(OutputRow::cells))?;
        self.save(&mut workbook)?;
        debug!(
            added = new_rows.len(),
            total = (next_row as usize + new_rows.len()).saturating_sub(1),
            sheets = names.len(),
            "Report saved"
        );
        Ok(())
    }

    fn save(&self, workbook: &mut Workbook) -> Result<(), RobotError> {
        // Save next to the target and swap, so a crash mid-save keeps the old file.
        let staging = self.path.with_extension("xlsx.partial");
        workbook.save(&staging)?;
        std::fs::rename(&staging, &self.path)?;
        Ok(())
    }
}

struct CellFormats {
    date: Format,
    date_time: Format,
    duration: Format,
}

impl CellFormats {
    fn new() -> Self {
        Self {
            date: Format::new().set_num_format("dd/mm/yyyy"),
            date_time: Format::new().set_num_format("dd/mm/yyyy hh:mm:ss"),
            duration: Format::new().set_num_format("[h]:mm:ss"),
        }
    }
}

fn cell_position(start: (u32, u32), row: usize, col: usize) -> Result<(u32, u16), RobotError> {
    let row = u32::try_from(row)
        .ok()
        .and_then(|r| start.0.checked_add(r))
        .ok_or_else(|| RobotError::Spreadsheet("too many rows".to_string()))?;
    let col = u32::try_from(col)
        .ok()
        .and_then(|c| start.1.checked_add(c))
        .and_then(|c| u16::try_from(c).ok())
        .ok_or_else(|| RobotError::Spreadsheet("too many columns".to_string()))?;
    Ok((row, col))
}

/// Text rows from `first_row` down, starting at column A. Empty cells stay blank.
fn write_rows<'r, I>(worksheet: &mut Worksheet, first_row: u32, rows: I) -> Result<(), RobotError>
where
    I: IntoIterator<Item = &'r [String]>,
{
    for (r, row) in rows.into_iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            let (row, col) = cell_position((first_row, 0), r, c)?;
            worksheet.write_string(row, col, value.as_str())?;
        }
    }
    Ok(())
}

fn copy_sheet(
    worksheet: &mut Worksheet,
    values: &Range<Data>,
    formulas: Option<&Range<String>>,
    formats: &CellFormats,
) -> Result<(), RobotError> {
    let origin = values.start().unwrap_or_default();
    for (r, c, value) in values.used_cells() {
        let (row, col) = cell_position(origin, r, c)?;
        copy_cell(worksheet, row, col, value, formats)?;
    }

    let Some(formulas) = formulas else {
        return Ok(());
    };
    let origin = formulas.start().unwrap_or_default();
    for (r, c, formula) in formulas.used_cells() {
        let (row, col) = cell_position(origin, r, c)?;
        let cached = values
            .get_value((row, u32::from(col)))
            .map(cell_text)
            .unwrap_or_default();
        worksheet.write_formula(row, col, Formula::new(formula).set_result(cached))?;
    }
    Ok(())
}

fn copy_cell(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: &Data,
    formats: &CellFormats,
) -> Result<(), RobotError> {
    match value {
        Data::Empty => {}
        Data::String(text) | Data::DateTimeIso(text) | Data::DurationIso(text) => {
            worksheet.write_string(row, col, text.as_str())?;
        }
        Data::Int(n) => {
            worksheet.write_number(row, col, *n as f64)?;
        }
        Data::Float(n) => {
            worksheet.write_number(row, col, *n)?;
        }
        Data::Bool(b) => {
            worksheet.write_boolean(row, col, *b)?;
        }
        Data::DateTime(serial) if serial.is_duration() => {
            worksheet.write_number_with_format(row, col, serial.as_f64(), &formats.duration)?;
        }
        Data::DateTime(serial) => match serial.as_datetime() {
            Some(at) if at.num_seconds_from_midnight() == 0 => {
                worksheet.write_datetime_with_format(row, col, &at, &formats.date)?;
            }
            Some(at) => {
                worksheet.write_datetime_with_format(row, col, &at, &formats.date_time)?;
            }
            None => {
                worksheet.write_number_with_format(row, col, serial.as_f64(), &formats.date)?;
            }
        },
        Data::Error(e) => {
            worksheet.write_string(row, col, e.to_string())?;
        }
    }
    Ok(())
}

/// Feeds rows to an [`OutputStore`] according to a [`PersistencePolicy`]
pub struct Accumulator<'a> {
    store: &'a OutputStore,
    policy: PersistencePolicy,
    pending: Vec<OutputRow>,
}

impl<'a> Accumulator<'a> {
    pub fn new(store: &'a OutputStore, policy: PersistencePolicy) -> Self {
        Self {
            store,
            policy,
            pending: Vec::new(),
        }
    }

    pub fn push(&mut self, row: OutputRow) -> Result<(), RobotError> {
        match self.policy {
            PersistencePolicy::Incremental => self.store.append(&row),
            PersistencePolicy::Batched => {
                self.pending.push(row);
                Ok(())
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Write whatever is still held in memory. Returns how many rows that was.
    pub fn finish(self) -> Result<usize, RobotError> {
        let count = self.pending.len();
        if count > 0 {
            self.store.append_all(&self.pending)?;
            info!(rows = count, "Batched rows saved");
        }
        Ok(count)
    }
}
