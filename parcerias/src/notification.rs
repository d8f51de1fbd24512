//! Notice dates ahead of an instrument's end of validity.

use std::fmt;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

/// Day format used by the portal and by every report
pub const DATE_FORMAT: &str = "%d/%m/%Y";

/// Contractual category of an instrument
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Modality {
    TermoDeFomento,
    Convenio,
    Other(String),
}

impl Modality {
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "Termo de Fomento" => Modality::TermoDeFomento,
            "Convênio" => Modality::Convenio,
            other => Modality::Other(other.to_string()),
        }
    }

    /// Days before the end of validity for the first and second notice.
    pub fn notice_offsets(&self) -> Option<(u64, u64)> {
        match self {
            Modality::TermoDeFomento => Some((60, 45)),
            Modality::Convenio => Some((90, 75)),
            Modality::Other(_) => None,
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modality::TermoDeFomento => f.write_str("Termo de Fomento"),
            Modality::Convenio => f.write_str("Convênio"),
            Modality::Other(label) => f.write_str(label),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPair {
    pub first_notice: NaiveDate,
    pub second_notice: NaiveDate,
}

/// Notice dates for `modality`, `None` for a modality with no notice rule.
pub fn compute(modality: &Modality, termination: NaiveDate) -> Option<NotificationPair> {
    let (first, second) = modality.notice_offsets()?;
    Some(NotificationPair {
        first_notice: termination.checked_sub_days(Days::new(first))?,
        second_notice: termination.checked_sub_days(Days::new(second))?,
    })
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}
