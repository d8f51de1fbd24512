//! Report robot for a partnership-management web portal
//!
//! The robot attaches to a Chrome instance the operator already logged in
//! with, walks the instruments listed in a control spreadsheet one at a time,
//! reads a few fields off each instrument's pages and appends one row per
//! instrument to a report spreadsheet.

pub mod config;
pub mod driver;
pub mod errors;
pub mod extract;
pub mod input;
pub mod locator;
pub mod locators;
pub mod navigator;
pub mod notification;
pub mod output;
pub mod reports;
pub mod runner;
pub mod selector;
pub mod session;
#[cfg(test)]
mod tests;

pub use config::RobotConfig;
pub use driver::{BrowserDriver, ElementSnapshot, ReleaseMode};
pub use errors::RobotError;
pub use extract::{ExtractedDetail, Extractor};
pub use input::InstrumentRecord;
pub use locator::{Locator, WaitFor};
pub use locators::{LocatorTable, Step};
pub use navigator::Navigator;
pub use output::{OutputRow, OutputStore, PersistencePolicy};
pub use reports::{Report, ReportKind, RowOutcome};
pub use runner::{run_report, BatchJob, BatchSummary};
pub use selector::Selector;
pub use session::{attach, AttachOptions, Session, Timeouts};
