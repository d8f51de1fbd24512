use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, instrument, trace, warn};

use super::{BrowserDriver, ElementSnapshot, ReleaseMode};
use crate::{RobotError, Selector};

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
const CLOSE_GRACE: Duration = Duration::from_secs(2);
const READY_POLL: Duration = Duration::from_millis(100);

type CommandResult = Result<Value, String>;
type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<CommandResult>>>>;

/// Host and port of a browser started with `--remote-debugging-port`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebuggerEndpoint {
    pub host: String,
    pub port: u16,
}

impl Default for DebuggerEndpoint {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 9222,
        }
    }
}

impl DebuggerEndpoint {
    /// Accepts `host:port`, optionally with an `http://` or `ws://` scheme.
    pub fn parse(raw: &str) -> Result<Self, RobotError> {
        let trimmed = raw.trim();
        let without_scheme = ["http://", "https://", "ws://", "wss://"]
            .iter()
            .find_map(|scheme| trimmed.strip_prefix(scheme))
            .unwrap_or(trimmed)
            .trim_end_matches('/');

        let (host, port) = without_scheme.rsplit_once(':').ok_or_else(|| {
            RobotError::Config(format!("Debugger endpoint {raw:?} has no port"))
        })?;
        if host.is_empty() {
            return Err(RobotError::Config(format!(
                "Debugger endpoint {raw:?} has no host"
            )));
        }
        let port = port.parse::<u16>().map_err(|e| {
            RobotError::Config(format!("Debugger endpoint {raw:?} has a bad port: {e}"))
        })?;

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    pub fn http_base(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for DebuggerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for DebuggerEndpoint {
    type Err = RobotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[derive(Debug, Deserialize)]
pub struct VersionInfo {
    #[serde(rename = "Browser", default)]
    pub browser: String,
    #[serde(rename = "Protocol-Version", default)]
    pub protocol_version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "webSocketDebuggerUrl")]
    pub websocket_url: Option<String>,
}

/// First attachable page, preferring one whose URL contains `url_hint`.
pub fn pick_page_target<'a>(
    targets: &'a [TargetInfo],
    url_hint: Option<&str>,
) -> Option<&'a TargetInfo> {
    let mut pages = targets
        .iter()
        .filter(|t| t.kind == "page" && t.websocket_url.is_some());

    match url_hint {
        Some(hint) => {
            let candidates: Vec<&TargetInfo> = pages.collect();
            candidates
                .iter()
                .find(|t| t.url.contains(hint))
                .or_else(|| candidates.first())
                .copied()
        }
        None => pages.next(),
    }
}

#[derive(Debug, Clone)]
pub struct CdpOptions {
    /// Prefer the tab whose URL contains this text
    pub tab_url_contains: Option<String>,
    /// How long a single protocol command may go unanswered
    pub command_timeout: Duration,
}

impl Default for CdpOptions {
    fn default() -> Self {
        Self {
            tab_url_contains: None,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

#[derive(Debug, Serialize)]
struct CdpRequest<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct CdpIncoming {
    id: Option<u64>,
    result: Option<Value>,
    error: Option<CdpErrorBody>,
    method: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CdpErrorBody {
    code: i64,
    message: String,
}

/// Chrome DevTools Protocol session on one page of an already running browser
pub struct CdpDriver {
    outgoing: mpsc::UnboundedSender<Message>,
    pending: Pending,
    next_id: AtomicU64,
    command_timeout: Duration,
    closed: watch::Receiver<bool>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl CdpDriver {
    /// Discover a page on `endpoint` and open a protocol session on it.
    #[instrument(skip(options), fields(endpoint = %endpoint))]
    pub async fn connect(
        endpoint: &DebuggerEndpoint,
        options: &CdpOptions,
    ) -> Result<Self, RobotError> {
        let http = reqwest::Client::builder()
            .timeout(options.command_timeout)
            .build()
            .map_err(|e| RobotError::Connection(format!("HTTP client: {e}")))?;
        let base = endpoint.http_base();

        let version: VersionInfo = get_json(&http, &format!("{base}/json/version")).await?;
        info!(
            browser = %version.browser,
            protocol = %version.protocol_version,
            "DevTools endpoint is up"
        );

        let targets: Vec<TargetInfo> = get_json(&http, &format!("{base}/json/list")).await?;
        debug!("Found {} targets", targets.len());
        let target = pick_page_target(&targets, options.tab_url_contains.as_deref())
            .ok_or_else(|| {
                RobotError::Connection(format!("No attachable page tab on {endpoint}"))
            })?;
        let ws_url = target
            .websocket_url
            .as_deref()
            .ok_or_else(|| RobotError::Connection(format!("Tab {} has no socket", target.id)))?;

        info!(title = %target.title, url = %target.url, "Attaching to tab");
        Self::connect_websocket(ws_url, options.command_timeout).await
    }

    /// Open a protocol session directly on a page's websocket URL.
    pub async fn connect_websocket(
        ws_url: &str,
        command_timeout: Duration,
    ) -> Result<Self, RobotError> {
        let (ws_stream, _) = connect_async(ws_url)
            .await
            .map_err(|e| RobotError::Connection(format!("websocket {ws_url}: {e}")))?;
        let (mut sink, mut stream) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let (closed_tx, closed_rx) = watch::channel(false);
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));

        let writer = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let is_close = matches!(msg, Message::Close(_));
                if let Err(e) = sink.send(msg).await {
                    warn!("CDP send error: {}", e);
                    break;
                }
                if is_close {
                    break;
                }
            }
        });

        let reader_pending = pending.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                let msg = match frame {
                    Ok(m) => m,
                    Err(e) => {
                        debug!("CDP socket ended: {}", e);
                        break;
                    }
                };
                if msg.is_close() {
                    break;
                }
                if !msg.is_text() {
                    continue;
                }
                let txt = msg.into_text().unwrap_or_default();
                match serde_json::from_str::<CdpIncoming>(&txt) {
                    Ok(CdpIncoming {
                        id: Some(id),
                        result,
                        error,
                        ..
                    }) => {
                        let reply = match error {
                            Some(err) => Err(format!("{} (code {})", err.message, err.code)),
                            None => Ok(result.unwrap_or(Value::Null)),
                        };
                        if let Some(waiter) = reader_pending.lock().await.remove(&id) {
                            let _ = waiter.send(reply);
                        } else {
                            trace!(id, "Reply for a command nobody waits on");
                        }
                    }
                    Ok(CdpIncoming {
                        method: Some(method),
                        ..
                    }) => trace!(%method, "CDP event"),
                    Ok(_) => {}
                    Err(e) => warn!("Invalid CDP message: {}", e),
                }
            }
            // Dropping the senders wakes every caller still waiting.
            reader_pending.lock().await.clear();
            let _ = closed_tx.send(true);
        });

        Ok(Self {
            outgoing: tx,
            pending,
            next_id: AtomicU64::new(1),
            command_timeout,
            closed: closed_rx,
            reader,
            writer,
        })
    }

    /// Send one protocol command and wait for its reply.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RobotError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let payload = serde_json::to_string(&CdpRequest { id, method, params })
            .map_err(|e| RobotError::Protocol(format!("serialize {method}: {e}")))?;
        if self.outgoing.send(Message::Text(payload)).is_err() {
            self.pending.lock().await.remove(&id);
            return Err(RobotError::Disconnected(format!(
                "{method}: connection to the browser is closed"
            )));
        }

        match tokio::time::timeout(self.command_timeout, rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(message))) => Err(RobotError::Protocol(format!("{method}: {message}"))),
            Ok(Err(_canceled)) => Err(RobotError::Disconnected(format!(
                "{method}: connection to the browser was lost"
            ))),
            Err(_elapsed) => {
                self.pending.lock().await.remove(&id);
                Err(RobotError::Timeout(format!(
                    "{method} got no reply within {:?}",
                    self.command_timeout
                )))
            }
        }
    }

    /// Evaluate a script in the page and return its value.
    pub async fn evaluate(&self, expression: &str) -> Result<Value, RobotError> {
        let reply = self
            .call(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;

        if let Some(details) = reply.get("exceptionDetails") {
            let text = details
                .pointer("/exception/description")
                .and_then(Value::as_str)
                .or_else(|| details.get("text").and_then(Value::as_str))
                .unwrap_or("script exception");
            return Err(RobotError::Protocol(format!("script failed: {text}")));
        }

        Ok(reply.pointer("/result/value").cloned().unwrap_or(Value::Null))
    }

    async fn wait_document_ready(&self) -> Result<(), RobotError> {
        let deadline = tokio::time::Instant::now() + self.command_timeout;
        loop {
            let state = self.evaluate("document.readyState").await?;
            if state.as_str() == Some("complete") {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(RobotError::Timeout(format!(
                    "page did not finish loading within {:?}",
                    self.command_timeout
                )));
            }
            tokio::time::sleep(READY_POLL).await;
        }
    }
}

impl Drop for CdpDriver {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

#[async_trait::async_trait]
impl BrowserDriver for CdpDriver {
    async fn probe(&self, selector: &Selector) -> Result<Option<ElementSnapshot>, RobotError> {
        let value = self.evaluate(&probe_script(selector)?).await?;
        serde_json::from_value(value)
            .map_err(|e| RobotError::Protocol(format!("unexpected probe result: {e}")))
    }

    async fn texts(&self, selector: &Selector) -> Result<Vec<String>, RobotError> {
        let value = self.evaluate(&texts_script(selector)?).await?;
        serde_json::from_value(value)
            .map_err(|e| RobotError::Protocol(format!("unexpected text list: {e}")))
    }

    async fn click(&self, selector: &Selector) -> Result<(), RobotError> {
        match self.evaluate(&click_script(selector)?).await? {
            Value::Bool(true) => Ok(()),
            _ => Err(RobotError::ElementNotFound(format!(
                "{selector} vanished before it could be clicked"
            ))),
        }
    }

    async fn fill(&self, selector: &Selector, text: &str) -> Result<(), RobotError> {
        match self.evaluate(&fill_script(selector, text)?).await? {
            Value::Bool(true) => Ok(()),
            _ => Err(RobotError::ElementNotFound(format!(
                "{selector} vanished before it could be filled"
            ))),
        }
    }

    #[instrument(skip(self))]
    async fn navigate(&self, url: &str) -> Result<(), RobotError> {
        let reply = self.call("Page.navigate", json!({ "url": url })).await?;
        if let Some(error) = reply.get("errorText").and_then(Value::as_str) {
            return Err(RobotError::Protocol(format!("navigation to {url} failed: {error}")));
        }
        self.wait_document_ready().await
    }

    async fn release(&self, mode: ReleaseMode) -> Result<(), RobotError> {
        let refused = match mode {
            ReleaseMode::Detach => None,
            ReleaseMode::QuitBrowser => match self.call("Browser.close", json!({})).await {
                Ok(_) => {
                    info!("Browser closed");
                    None
                }
                // The browser may die before it answers.
                Err(e @ (RobotError::Disconnected(_) | RobotError::Timeout(_))) => {
                    debug!("Browser.close: {}", e);
                    None
                }
                Err(e) => {
                    warn!(error = %e, "Browser refused to close");
                    Some(e)
                }
            },
        };

        let _ = self.outgoing.send(Message::Close(None));
        let mut closed = self.closed.clone();
        let acknowledged = tokio::time::timeout(CLOSE_GRACE, closed.wait_for(|done| *done))
            .await
            .is_ok();
        if !acknowledged {
            debug!("Socket did not acknowledge close within {:?}", CLOSE_GRACE);
        }
        refused.map_or(Ok(()), Err)
    }
}

async fn get_json<T: serde::de::DeserializeOwned>(
    http: &reqwest::Client,
    url: &str,
) -> Result<T, RobotError> {
    let response = http
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| RobotError::Connection(format!("{url}: {e}")))?;
    response
        .json()
        .await
        .map_err(|e| RobotError::Connection(format!("{url}: unexpected reply: {e}")))
}

fn js_string(value: &str) -> String {
    // A JSON string literal is a valid JavaScript string literal.
    Value::String(value.to_string()).to_string()
}

/// Expression evaluating to the first node matching `selector`, or null.
fn first_match_js(selector: &Selector) -> Result<String, RobotError> {
    match selector {
        Selector::XPath(path) => Ok(format!(
            "document.evaluate({}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue",
            js_string(path)
        )),
        Selector::Css(css) => Ok(format!("document.querySelector({})", js_string(css))),
        Selector::Id(id) => Ok(format!("document.getElementById({})", js_string(id))),
        Selector::Invalid(reason) => Err(RobotError::InvalidSelector(reason.clone())),
    }
}

/// Expression evaluating to an array of every node matching `selector`.
fn all_matches_js(selector: &Selector) -> Result<String, RobotError> {
    match selector {
        Selector::XPath(path) => Ok(format!(
            "(() => {{ const r = document.evaluate({}, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null); const out = []; for (let i = 0; i < r.snapshotLength; i++) out.push(r.snapshotItem(i)); return out; }})()",
            js_string(path)
        )),
        Selector::Css(css) => Ok(format!(
            "Array.from(document.querySelectorAll({}))",
            js_string(css)
        )),
        Selector::Id(id) => Ok(format!(
            "[document.getElementById({})].filter(Boolean)",
            js_string(id)
        )),
        Selector::Invalid(reason) => Err(RobotError::InvalidSelector(reason.clone())),
    }
}

/// XPath may land on a text node; actions need its element.
fn element_of(node_expr: &str) -> String {
    format!(
        "(() => {{ const n = {node_expr}; return n && n.nodeType !== Node.ELEMENT_NODE ? n.parentElement : n; }})()"
    )
}

fn probe_script(selector: &Selector) -> Result<String, RobotError> {
    let el = element_of(&first_match_js(selector)?);
    Ok(format!(
        "(() => {{ const el = {el}; if (!el) return null; \
         const style = window.getComputedStyle(el); \
         const visible = el.getClientRects().length > 0 && style.visibility !== 'hidden' && style.display !== 'none'; \
         const enabled = !el.disabled && el.getAttribute('aria-disabled') !== 'true'; \
         return {{ text: ((el.innerText ?? el.textContent) || '').trim(), visible, enabled }}; }})()"
    ))
}

fn texts_script(selector: &Selector) -> Result<String, RobotError> {
    Ok(format!(
        "{}.map(n => ((n.innerText ?? n.textContent) || '').trim())",
        all_matches_js(selector)?
    ))
}

fn click_script(selector: &Selector) -> Result<String, RobotError> {
    let el = element_of(&first_match_js(selector)?);
    Ok(format!(
        "(() => {{ const el = {el}; if (!el) return false; \
         el.scrollIntoView({{ block: 'center' }}); el.click(); return true; }})()"
    ))
}

fn fill_script(selector: &Selector, text: &str) -> Result<String, RobotError> {
    let el = element_of(&first_match_js(selector)?);
    Ok(format!(
        "(() => {{ const el = {el}; if (!el) return false; el.focus(); el.value = {}; \
         el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
         el.dispatchEvent(new Event('change', {{ bubbles: true }})); return true; }})()",
        js_string(text)
    ))
}

/// Enable debugging in the browser by launching it with a debugging port
pub fn browser_launch_instructions() -> &'static str {
    r#"
Start Chrome with the DevTools port open and log in to the portal by hand:

chrome.exe --remote-debugging-port=9222 --user-data-dir=C:\chrome-robot

The robot attaches to that window; it never opens a browser of its own.
"#
}
