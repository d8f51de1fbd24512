#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use parcerias::{
    BrowserDriver, ElementSnapshot, LocatorTable, ReleaseMode, RobotError, Selector, Session,
    Step, Timeouts,
};
use rust_xlsxwriter::Workbook;
use tracing_subscriber::fmt::MakeWriter;

#[derive(Default)]
struct PortalState {
    current: Option<String>,
    clicks: Vec<String>,
    navigations: Vec<String>,
    released: Option<ReleaseMode>,
}

/// An in-memory portal keyed by selector text.
///
/// Static elements are always on the page. Instrument elements only show up
/// once that instrument number has been typed into the search field.
#[derive(Default)]
pub struct FakePortal {
    search_field: String,
    statics: HashMap<String, String>,
    static_texts: HashMap<String, Vec<String>>,
    per_instrument: HashMap<String, HashMap<String, String>>,
    instrument_texts: HashMap<String, HashMap<String, Vec<String>>>,
    state: Mutex<PortalState>,
}

impl FakePortal {
    /// A landing page with the menus and the search form.
    pub fn new(locators: &LocatorTable) -> Self {
        let mut portal = Self {
            search_field: key(locators, Step::SearchField),
            ..Default::default()
        };
        for step in [
            Step::HomeLink,
            Step::MainMenu,
            Step::SearchSubmenu,
            Step::SearchField,
            Step::SearchSubmit,
        ] {
            portal.statics.insert(key(locators, step), String::new());
        }
        portal
    }

    pub fn with_static(mut self, selector: impl Into<String>, text: &str) -> Self {
        self.statics.insert(selector.into(), text.to_string());
        self
    }

    pub fn with_element(mut self, instrument: &str, selector: impl Into<String>, text: &str) -> Self {
        self.per_instrument
            .entry(instrument.to_string())
            .or_default()
            .insert(selector.into(), text.to_string());
        self
    }

    pub fn with_texts(mut self, instrument: &str, selector: impl Into<String>, texts: &[&str]) -> Self {
        self.instrument_texts
            .entry(instrument.to_string())
            .or_default()
            .insert(selector.into(), texts.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn clicks(&self) -> Vec<String> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    pub fn released(&self) -> Option<ReleaseMode> {
        self.state.lock().unwrap().released
    }

    fn lookup(&self, selector: &Selector) -> Option<String> {
        let key = selector.to_string();
        let current = self.state.lock().unwrap().current.clone();
        current
            .and_then(|number| self.per_instrument.get(&number)?.get(&key).cloned())
            .or_else(|| self.statics.get(&key).cloned())
    }
}

#[async_trait]
impl BrowserDriver for FakePortal {
    async fn probe(&self, selector: &Selector) -> Result<Option<ElementSnapshot>, RobotError> {
        Ok(self.lookup(selector).map(|text| ElementSnapshot {
            text,
            visible: true,
            enabled: true,
        }))
    }

    async fn texts(&self, selector: &Selector) -> Result<Vec<String>, RobotError> {
        let key = selector.to_string();
        let current = self.state.lock().unwrap().current.clone();
        Ok(current
            .and_then(|number| self.instrument_texts.get(&number)?.get(&key).cloned())
            .or_else(|| self.static_texts.get(&key).cloned())
            .unwrap_or_default())
    }

    async fn click(&self, selector: &Selector) -> Result<(), RobotError> {
        if self.lookup(selector).is_none() {
            return Err(RobotError::ElementNotFound(selector.to_string()));
        }
        self.state.lock().unwrap().clicks.push(selector.to_string());
        Ok(())
    }

    async fn fill(&self, selector: &Selector, text: &str) -> Result<(), RobotError> {
        if selector.to_string() == self.search_field {
            self.state.lock().unwrap().current = Some(text.to_string());
        }
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<(), RobotError> {
        self.state.lock().unwrap().navigations.push(url.to_string());
        Ok(())
    }

    async fn release(&self, mode: ReleaseMode) -> Result<(), RobotError> {
        self.state.lock().unwrap().released = Some(mode);
        Ok(())
    }
}

pub fn key(locators: &LocatorTable, step: Step) -> String {
    locators.get(step).unwrap().to_string()
}

/// Short waits so records that time out do not slow the suite down.
pub fn fast_timeouts() -> Timeouts {
    Timeouts {
        step: Duration::from_millis(150),
        optional: Duration::from_millis(80),
        poll_interval: Duration::from_millis(5),
    }
}

pub fn session(portal: &Arc<FakePortal>) -> Session {
    Session::new(portal.clone(), fast_timeouts())
}

/// Write a one-sheet workbook, first row being the header.
pub fn write_sheet(path: &Path, sheet: &str, rows: &[&[&str]]) {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet).unwrap();
    for (r, row) in rows.iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            worksheet.write_string(r as u32, c as u16, *value).unwrap();
        }
    }
    workbook.save(path).unwrap();
}

/// Log lines written while the guard is alive, as plain text.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

pub fn capture_logs() -> (LogCapture, tracing::subscriber::DefaultGuard) {
    let capture = LogCapture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(capture.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (capture, guard)
}
