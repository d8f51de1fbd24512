use thiserror::Error;

#[derive(Error, Debug)]
pub enum RobotError {
    #[error("Could not attach to browser: {0}")]
    Connection(String),

    #[error("Required columns missing from input sheet: {}", missing.join(", "))]
    Schema { missing: Vec<String> },

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Could not parse {text:?}: {reason}")]
    Parse { text: String, reason: String },

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DevTools protocol error: {0}")]
    Protocol(String),

    #[error("Browser connection lost: {0}")]
    Disconnected(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl RobotError {
    /// Errors that abort the whole batch before any record is processed.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(
            self,
            RobotError::Connection(_) | RobotError::Schema { .. } | RobotError::Config(_)
        )
    }

    /// A bounded wait that ran out, as opposed to a broken page or session.
    pub fn is_timeout(&self) -> bool {
        matches!(self, RobotError::Timeout(_))
    }
}

impl From<calamine::Error> for RobotError {
    fn from(e: calamine::Error) -> Self {
        RobotError::Spreadsheet(e.to_string())
    }
}

impl From<rust_xlsxwriter::XlsxError> for RobotError {
    fn from(e: rust_xlsxwriter::XlsxError) -> Self {
        RobotError::Spreadsheet(e.to_string())
    }
}
