//! Tests for the networked collaborators against a one-shot local HTTP stub.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use optlab_core::components::{Notifier, NotifyError, ScoringError, SignalSource};
use optlab_core::domain::{
    Direction, EventKind, ExitReason, FeatureSnapshot, HorizonId, HorizonSpec, LifecycleEvent,
};
use optlab_core::policy::CooldownWindow;
use optlab_runner::{HttpSignal, WebhookNotifier};

const TIMEOUT: Duration = Duration::from_secs(5);

/// Serve exactly one request with `status` and `body`; the join handle
/// yields the raw request text.
fn serve_once(status: &'static str, body: &'static str) -> (String, thread::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let request = read_request(&mut stream);
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).unwrap();
        stream.flush().unwrap();
        request
    });
    (format!("http://{addr}/predict"), handle)
}

fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
        let len = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buf.len() >= end + 4 + len {
            break;
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn snapshot() -> FeatureSnapshot {
    let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap();
    FeatureSnapshot::new(ts).with("obv", 1.5).with("rsi", 61.0)
}

fn horizon() -> HorizonSpec {
    HorizonSpec::new(10, 10, 0.5, CooldownWindow::Bars(3))
}

fn signal(url: &str) -> HttpSignal {
    HttpSignal::new(url, vec!["obv".into(), "rsi".into()], TIMEOUT).unwrap()
}

#[test]
fn http_signal_posts_features_and_reads_score() {
    let (url, server) = serve_once("200 OK", r#"{"score": 0.73}"#);
    let p = signal(&url).score(&snapshot(), &horizon()).unwrap();
    assert_eq!(p, 0.73);

    let request = server.join().unwrap();
    assert!(request.starts_with("POST /predict"));
    assert!(request.contains(r#""features":{"obv":1.5,"rsi":61.0}"#));
    assert!(request.contains(r#""horizon":"h10""#));
}

#[test]
fn http_signal_reports_server_error_detail() {
    let (url, server) = serve_once("400 Bad Request", r#"{"error": "Missing features: ['vwap']"}"#);
    let err = signal(&url).score(&snapshot(), &horizon()).unwrap_err();
    server.join().unwrap();
    match err {
        ScoringError::Remote(msg) => {
            assert!(msg.contains("400"), "{msg}");
            assert!(msg.contains("Missing features"), "{msg}");
        }
        other => panic!("expected remote error, got {other:?}"),
    }
}

#[test]
fn http_signal_rejects_out_of_range_score() {
    let (url, server) = serve_once("200 OK", r#"{"score": 1.7}"#);
    let err = signal(&url).score(&snapshot(), &horizon()).unwrap_err();
    server.join().unwrap();
    assert!(matches!(err, ScoringError::OutOfRange(p) if p == 1.7));
}

#[test]
fn http_signal_missing_feature_never_calls_out() {
    // nothing listens here; a request would fail with a remote error
    let sig = HttpSignal::new(
        "http://127.0.0.1:9/predict",
        vec!["obv".into(), "vwap".into()],
        TIMEOUT,
    )
    .unwrap();
    let err = sig.score(&snapshot(), &horizon()).unwrap_err();
    assert!(matches!(err, ScoringError::Snapshot(_)));
}

#[test]
fn http_signal_unreachable_is_a_remote_error() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let err = signal(&format!("http://127.0.0.1:{port}/predict"))
        .score(&snapshot(), &horizon())
        .unwrap_err();
    assert!(matches!(err, ScoringError::Remote(_)));
}

fn stop_event() -> LifecycleEvent {
    LifecycleEvent {
        kind: EventKind::Stop,
        horizon: HorizonId(10),
        symbol: "SPY".into(),
        category: "Scalp Reversal".into(),
        direction: Direction::from_trend(false),
        price: 0.8,
        underlying: 500.4,
        timestamp: snapshot().timestamp,
        bar_index: 4,
        probability: None,
        reason: Some(ExitReason::StopLoss),
        pnl: Some(-20.0),
    }
}

#[test]
fn webhook_posts_formatted_alert() {
    let (url, server) = serve_once("204 No Content", "");
    WebhookNotifier::new(url, TIMEOUT)
        .unwrap()
        .notify(&stop_event())
        .unwrap();

    let request = server.join().unwrap();
    assert!(request.contains(r#""content":"**STOP HIT**"#));
    assert!(request.contains("PnL: -20.00"));
}

#[test]
fn webhook_rejection_carries_status() {
    let (url, server) = serve_once("500 Internal Server Error", "{}");
    let err = WebhookNotifier::new(url, TIMEOUT)
        .unwrap()
        .notify(&stop_event())
        .unwrap_err();
    server.join().unwrap();
    assert!(matches!(err, NotifyError::Rejected { status: 500 }));
}
