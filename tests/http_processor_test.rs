use payout_ledger::domain::money::{Money, SellerId};
use payout_ledger::domain::payout::{NewPayout, Payout, PayoutId};
use payout_ledger::domain::ports::{PayoutProcessor, ProcessorError, ProcessorOutcome};
use payout_ledger::infrastructure::processors::HttpPayoutProcessor;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

/// Answers every request with the same status and body, keeping the raw requests.
struct FakeServer {
    base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl FakeServer {
    async fn start(status: &'static str, body: &'static str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));

        let seen = Arc::clone(&requests);
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let request = read_request(&mut socket).await;
                seen.lock().await.push(request);
                let response = format!(
                    "HTTP/1.1 {status}\r\ncontent-type: application/json\r\n\
                     content-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        Self { base_url, requests }
    }

    /// Accepts connections but never answers.
    async fn silent() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                open.push(socket);
            }
        });
        Self {
            base_url,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn processor(&self) -> HttpPayoutProcessor {
        HttpPayoutProcessor::new(self.base_url.clone(), Duration::from_secs(2))
    }

    async fn requests(&self) -> Vec<String> {
        self.requests.lock().await.clone()
    }
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf).to_string();
        if let Some(end) = text.find("\r\n\r\n") {
            let content_length = text[..end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

fn payout() -> Payout {
    let mut payout = NewPayout {
        seller: SellerId(3),
        amount: Money::from_minor(12_345),
        method: "http".to_string(),
        notes: None,
    }
    .into_payout(PayoutId(17));
    payout.attempts = 2;
    payout
}

#[tokio::test]
async fn test_success_returns_external_id_and_sends_idempotency_key() {
    let server = FakeServer::start("200 OK", r#"{"id":"po_123","status":"paid"}"#).await;

    let outcome = server.processor().submit(&payout()).await.unwrap();
    assert_eq!(
        outcome,
        ProcessorOutcome::Success {
            external_id: "po_123".to_string()
        }
    );

    let requests = server.requests().await;
    assert_eq!(requests.len(), 1);
    let request = requests[0].to_lowercase();
    assert!(request.starts_with("post /payouts"));
    assert!(request.contains("idempotency-key: payout-17-attempt-2"));
    assert!(request.contains("\"amount_minor\":12345"));
    assert!(request.contains("\"amount\":\"123.45\""));
}

#[tokio::test]
async fn test_client_error_is_a_definitive_failure() {
    let server =
        FakeServer::start("422 Unprocessable Entity", r#"{"reason":"account closed"}"#).await;

    let outcome = server.processor().submit(&payout()).await.unwrap();
    assert_eq!(
        outcome,
        ProcessorOutcome::Failure {
            reason: "processor rejected payout (422): account closed".to_string()
        }
    );
}

#[tokio::test]
async fn test_reported_failure_status_is_a_failure() {
    let body = r#"{"id":"po_9","status":"failed","reason":"limit"}"#;
    let server = FakeServer::start("200 OK", body).await;

    let outcome = server.processor().submit(&payout()).await.unwrap();
    assert_eq!(
        outcome,
        ProcessorOutcome::Failure {
            reason: "limit".to_string()
        }
    );
}

#[tokio::test]
async fn test_server_error_is_not_retried() {
    let server = FakeServer::start("503 Service Unavailable", "down").await;

    let err = server.processor().submit(&payout()).await.unwrap_err();
    assert!(matches!(err, ProcessorError::Http { status: 503, .. }));
    assert_eq!(server.requests().await.len(), 1);
}

#[tokio::test]
async fn test_missing_id_is_a_parse_error() {
    let server = FakeServer::start("200 OK", r#"{"status":"paid"}"#).await;

    let err = server.processor().submit(&payout()).await.unwrap_err();
    assert!(matches!(err, ProcessorError::Parse(_)));
}

#[tokio::test]
async fn test_unanswered_request_times_out() {
    let server = FakeServer::silent().await;
    let processor = HttpPayoutProcessor::new(server.base_url.clone(), Duration::from_millis(200));

    let err = processor.submit(&payout()).await.unwrap_err();
    assert!(matches!(err, ProcessorError::Network(_)));
}

#[tokio::test]
async fn test_refused_connection_gives_up_after_retry_window() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let processor = HttpPayoutProcessor::new(base_url, Duration::from_millis(200))
        .with_retry_window(Duration::from_millis(300));
    let err = processor.submit(&payout()).await.unwrap_err();
    assert!(matches!(err, ProcessorError::Network(_)));
}

#[tokio::test]
async fn test_onboarding_reads_payouts_enabled() {
    let enabled = FakeServer::start("200 OK", r#"{"payouts_enabled":true}"#).await;
    assert!(enabled.processor().is_seller_onboarded(SellerId(3)).await.unwrap());
    assert!(enabled.requests().await[0].starts_with("GET /accounts/3"));

    let disabled = FakeServer::start("200 OK", r#"{"payouts_enabled":false}"#).await;
    assert!(!disabled.processor().is_seller_onboarded(SellerId(3)).await.unwrap());

    let unknown = FakeServer::start("404 Not Found", "{}").await;
    assert!(!unknown.processor().is_seller_onboarded(SellerId(3)).await.unwrap());
}
