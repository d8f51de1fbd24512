//! The DevTools driver against a fake browser: discovery over HTTP, commands
//! over a websocket.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parcerias::driver::{CdpDriver, CdpOptions, DebuggerEndpoint};
use parcerias::{BrowserDriver, ReleaseMode, RobotError, Selector};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};

fn evaluate_reply(expression: &str) -> Value {
    let value = if expression == "document.readyState" {
        json!("complete")
    } else if expression.contains("throw-me") {
        return json!({
            "result": { "type": "object", "subtype": "error" },
            "exceptionDetails": {
                "text": "Uncaught",
                "exception": { "description": "Error: boom" }
            }
        });
    } else if expression.contains("getComputedStyle") {
        if expression.contains("missing") {
            Value::Null
        } else {
            json!({ "text": "Em Análise", "visible": true, "enabled": false })
        }
    } else if expression.contains("snapshotItem") {
        json!(["01/03/2024", "15/03/2024", "—"])
    } else if expression.contains("el.click()") {
        json!(true)
    } else {
        Value::Null
    };
    json!({ "result": { "type": "object", "value": value } })
}

/// How the fake browser answers `Browser.close`
#[derive(Clone, Copy)]
enum OnClose {
    Close,
    Refuse,
}

fn reply_to(request: &Value, on_close: OnClose) -> Option<Value> {
    let id = request["id"].clone();
    let method = request["method"].as_str().unwrap_or_default();
    let body = match (method, on_close) {
        ("Runtime.evaluate", _) => evaluate_reply(request["params"]["expression"].as_str().unwrap_or_default()),
        ("Page.navigate", _) => json!({ "frameId": "F1", "loaderId": "L1" }),
        ("Browser.close", OnClose::Close) => json!({}),
        ("Browser.close", OnClose::Refuse) => {
            return Some(json!({
                "id": id,
                "error": { "code": -32000, "message": "Browser closing is not allowed" }
            }))
        }
        ("Test.hold" | "Test.echo", _) => json!({ "echo": method }),
        ("Test.silent", _) => return None,
        (other, _) => {
            return Some(json!({
                "id": id,
                "error": { "code": -32601, "message": format!("'{other}' wasn't found") }
            }))
        }
    };
    Some(json!({ "id": id, "result": body }))
}

/// One page's websocket. `Test.hold` is answered only after `Test.echo`, so
/// replies can arrive out of order.
async fn serve_page(stream: TcpStream, on_close: OnClose) {
    let Ok(mut ws) = accept_async(stream).await else {
        return;
    };
    let mut held: Option<Value> = None;
    let mut echoed = false;

    // Events are interleaved with replies on a real page.
    let event = json!({ "method": "Page.loadEventFired", "params": { "timestamp": 1.0 } });
    if ws.send(Message::Text(event.to_string())).await.is_err() {
        return;
    }

    while let Some(Ok(msg)) = ws.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let request: Value = serde_json::from_str(&text).unwrap();
        if request["method"] == "Test.hold" && !echoed {
            held = Some(request);
            continue;
        }
        if request["method"] == "Test.echo" {
            echoed = true;
        }
        if let Some(reply) = reply_to(&request, on_close) {
            ws.send(Message::Text(reply.to_string())).await.unwrap();
        }
        if echoed {
            if let Some(request) = held.take() {
                let reply = reply_to(&request, on_close).unwrap();
                ws.send(Message::Text(reply.to_string())).await.unwrap();
            }
        }
    }
}

async fn start_fake_page(on_close: OnClose) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve_page(stream, on_close));
        }
    });
    format!("ws://{addr}/devtools/page/PAGE1")
}

fn start_discovery_server(page_ws: String) -> (DebuggerEndpoint, Arc<tiny_http::Server>) {
    let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
    let port = server.server_addr().to_ip().unwrap().port();
    let server_arc = Arc::new(server);
    let server_clone = server_arc.clone();

    thread::spawn(move || {
        for request in server_clone.incoming_requests() {
            let body = match request.url() {
                "/json/version" => json!({
                    "Browser": "Chrome/126.0.6478.127",
                    "Protocol-Version": "1.3",
                    "webSocketDebuggerUrl": "ws://127.0.0.1/devtools/browser/B1"
                }),
                "/json/list" => json!([
                    { "id": "SW", "type": "service_worker", "url": "https://x/sw.js",
                      "webSocketDebuggerUrl": "ws://127.0.0.1:1/devtools/page/SW" },
                    { "id": "PAGE1", "type": "page", "title": "Portal",
                      "url": "https://portal.example/voluntarias/Principal.do",
                      "webSocketDebuggerUrl": page_ws },
                ]),
                _ => {
                    let _ = request.respond(tiny_http::Response::empty(404));
                    continue;
                }
            };
            let header: tiny_http::Header = "Content-Type: application/json".parse().unwrap();
            let response = tiny_http::Response::from_string(body.to_string()).with_header(header);
            request.respond(response).unwrap();
        }
    });

    let endpoint = DebuggerEndpoint {
        host: "127.0.0.1".to_string(),
        port,
    };
    (endpoint, server_arc)
}

async fn connected(command_timeout: Duration) -> (CdpDriver, Arc<tiny_http::Server>) {
    connected_to(OnClose::Close, command_timeout).await
}

async fn connected_to(
    on_close: OnClose,
    command_timeout: Duration,
) -> (CdpDriver, Arc<tiny_http::Server>) {
    let page = start_fake_page(on_close).await;
    let (endpoint, server) = start_discovery_server(page);
    let options = CdpOptions {
        tab_url_contains: Some("portal.example".to_string()),
        command_timeout,
    };
    let driver = CdpDriver::connect(&endpoint, &options).await.unwrap();
    (driver, server)
}

#[tokio::test]
async fn discovers_the_page_and_probes_elements() {
    let (driver, _server) = connected(Duration::from_secs(5)).await;

    let snapshot = driver
        .probe(&Selector::from(r#"//*[@id="row"]//td[contains(text(),"Em Análise")]"#))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.text, "Em Análise");
    assert!(snapshot.visible);
    assert!(!snapshot.is_interactable());

    let missing = driver
        .probe(&Selector::from(r#"//*[@id="missing"]"#))
        .await
        .unwrap();
    assert!(missing.is_none());

    let texts = driver
        .texts(&Selector::from(r#"//*[@id="tbodyrow"]/tr/td[3]/div"#))
        .await
        .unwrap();
    assert_eq!(texts, ["01/03/2024", "15/03/2024", "—"]);

    driver.click(&Selector::from("id:form_submit")).await.unwrap();
    driver
        .navigate("https://portal.example/voluntarias/Principal.do")
        .await
        .unwrap();
    driver.release(ReleaseMode::Detach).await.unwrap();
}

#[tokio::test]
async fn replies_are_matched_to_their_commands() {
    let (driver, _server) = connected(Duration::from_secs(5)).await;

    let (held, echoed) = tokio::join!(
        driver.call("Test.hold", json!({})),
        driver.call("Test.echo", json!({}))
    );
    assert_eq!(held.unwrap()["echo"], "Test.hold");
    assert_eq!(echoed.unwrap()["echo"], "Test.echo");
}

#[tokio::test]
async fn protocol_errors_and_script_exceptions_surface() {
    let (driver, _server) = connected(Duration::from_secs(5)).await;

    let err = driver.call("Nope.nothing", json!({})).await.unwrap_err();
    match err {
        RobotError::Protocol(message) => assert!(message.contains("wasn't found"), "{message}"),
        other => panic!("expected a protocol error, got {other:?}"),
    }

    let err = driver.evaluate("throw-me()").await.unwrap_err();
    assert!(err.to_string().contains("Error: boom"), "{err}");
}

#[tokio::test]
async fn unanswered_command_times_out() {
    let (driver, _server) = connected(Duration::from_millis(200)).await;

    let err = driver.call("Test.silent", json!({})).await.unwrap_err();
    assert!(err.is_timeout(), "{err:?}");

    // The session is still usable afterwards.
    let value = driver.evaluate("document.readyState").await.unwrap();
    assert_eq!(value, "complete");
}

#[tokio::test]
async fn quitting_asks_the_browser_to_close() {
    let (driver, _server) = connected(Duration::from_secs(5)).await;
    driver.release(ReleaseMode::QuitBrowser).await.unwrap();

    // The socket is gone afterwards.
    let err = driver.call("Test.echo", json!({})).await.unwrap_err();
    assert!(matches!(err, RobotError::Disconnected(_)), "{err:?}");
}

#[tokio::test]
async fn refused_close_is_reported() {
    let (driver, _server) = connected_to(OnClose::Refuse, Duration::from_secs(5)).await;

    let err = driver.release(ReleaseMode::QuitBrowser).await.unwrap_err();
    match err {
        RobotError::Protocol(message) => assert!(message.contains("not allowed"), "{message}"),
        other => panic!("expected a protocol error, got {other:?}"),
    }
}

#[tokio::test]
async fn nothing_listening_is_a_connection_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let endpoint = DebuggerEndpoint {
        host: "127.0.0.1".to_string(),
        port,
    };
    let err = CdpDriver::connect(&endpoint, &CdpOptions::default())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, RobotError::Connection(_)));
    assert!(err.is_batch_fatal());
}
