//! Black-box end-to-end tests: drive the SMTP server over a real TCP
//! socket and the HTTP query API over a real HTTP client, the way the
//! teacher's own `tests/integration.rs` drove a live server rather than
//! calling internal functions directly.

use std::sync::Arc;
use std::time::Duration;

use mailmock::reply::ReplyCatalog;
use mailmock::smtp::Server;
use mailmock::store::TransactionStore;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

/// Spins up an SMTP server and an HTTP query API on fixed loopback ports,
/// sharing one store, and returns a shutdown handle plus the ports used.
struct Harness {
    smtp_port: u16,
    http_port: u16,
    stop: CancellationToken,
    smtp_task: tokio::task::JoinHandle<anyhow::Result<()>>,
    http_task: tokio::task::JoinHandle<anyhow::Result<()>>,
}

impl Harness {
    async fn start(smtp_port: u16, http_port: u16) -> Self {
        let store = Arc::new(TransactionStore::new());
        let catalog = Arc::new(ReplyCatalog::new("mailmock.test"));
        let stop = CancellationToken::new();

        let server = Server::new(
            "smtp",
            "127.0.0.1",
            &smtp_port.to_string(),
            catalog,
            Arc::clone(&store) as Arc<dyn mailmock::store::TransactionSink>,
        );
        let smtp_stop = stop.clone();
        let smtp_task = tokio::spawn(async move { server.listen_and_serve(smtp_stop).await });

        let http_bind = format!("127.0.0.1:{http_port}");
        let http_stop = stop.clone();
        let http_store = Arc::clone(&store);
        let http_task =
            tokio::spawn(async move { mailmock::http::run(&http_bind, http_store, http_stop).await });

        // Give both listeners a moment to bind before the test connects.
        tokio::time::sleep(Duration::from_millis(100)).await;

        Harness {
            smtp_port,
            http_port,
            stop,
            smtp_task,
            http_task,
        }
    }

    async fn shutdown(self) {
        self.stop.cancel();
        let _ = self.smtp_task.await;
        let _ = self.http_task.await;
    }
}

async fn connect(port: u16) -> (BufReader<tokio::net::tcp::OwnedReadHalf>, tokio::net::tcp::OwnedWriteHalf) {
    let stream = TcpStream::connect(("127.0.0.1", port)).await.expect("connect to SMTP server");
    let (r, w) = stream.into_split();
    (BufReader::new(r), w)
}

async fn read_response_line(reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>) -> String {
    let mut line = String::new();
    reader.read_line(&mut line).await.expect("read response line");
    line.trim_end().to_string()
}

async fn send_line(writer: &mut tokio::net::tcp::OwnedWriteHalf, line: &str) {
    writer.write_all(line.as_bytes()).await.unwrap();
    writer.write_all(b"\r\n").await.unwrap();
}

fn code_of(line: &str) -> u16 {
    line[0..3].parse().unwrap()
}

#[tokio::test]
async fn s1_nominal_session_is_queryable_over_http() {
    let harness = Harness::start(12525, 18080).await;
    let (mut reader, mut writer) = connect(harness.smtp_port).await;

    assert_eq!(code_of(&read_response_line(&mut reader).await), 220);

    for line in [
        "HELO localhost",
        "MAIL FROM:<sender@example.com>",
        "RCPT TO:<recipient@example.com>",
        "DATA",
    ] {
        send_line(&mut writer, line).await;
        let resp = read_response_line(&mut reader).await;
        assert!(resp.starts_with("250") || resp.starts_with("354"), "unexpected: {resp}");
    }

    for line in ["Subject: Test", "", "This is a test", "."] {
        send_line(&mut writer, line).await;
    }
    assert_eq!(code_of(&read_response_line(&mut reader).await), 250);

    send_line(&mut writer, "QUIT").await;
    assert_eq!(code_of(&read_response_line(&mut reader).await), 221);
    drop(writer);

    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/v1/api/mailmock/0", harness.http_port);
    let resp = client.get(&url).send().await.expect("query http api");
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["id"], 0);
    assert_eq!(body["mail"]["envelope"]["sender"], "<sender@example.com>");
    assert_eq!(
        body["mail"]["envelope"]["recipients"][0],
        "<recipient@example.com>"
    );
    assert_eq!(body["state"], "completed");

    harness.shutdown().await;
}

#[tokio::test]
async fn s3_bad_sequence() {
    let harness = Harness::start(12526, 18081).await;
    let (mut reader, mut writer) = connect(harness.smtp_port).await;

    assert_eq!(code_of(&read_response_line(&mut reader).await), 220);
    send_line(&mut writer, "HELO localhost").await;
    assert_eq!(code_of(&read_response_line(&mut reader).await), 250);
    send_line(&mut writer, "RCPT TO:<x@y>").await;
    assert_eq!(code_of(&read_response_line(&mut reader).await), 503);
    send_line(&mut writer, "QUIT").await;
    assert_eq!(code_of(&read_response_line(&mut reader).await), 221);

    harness.shutdown().await;
}

#[tokio::test]
async fn s4_no_valid_recipients() {
    let harness = Harness::start(12527, 18082).await;
    let (mut reader, mut writer) = connect(harness.smtp_port).await;

    assert_eq!(code_of(&read_response_line(&mut reader).await), 220);
    send_line(&mut writer, "HELO localhost").await;
    read_response_line(&mut reader).await;
    send_line(&mut writer, "MAIL FROM:t").await;
    read_response_line(&mut reader).await;
    send_line(&mut writer, "DATA").await;
    assert_eq!(code_of(&read_response_line(&mut reader).await), 554);
    send_line(&mut writer, "QUIT").await;
    assert_eq!(code_of(&read_response_line(&mut reader).await), 221);

    harness.shutdown().await;
}

#[tokio::test]
async fn http_api_404s_unknown_id_and_400s_bad_input() {
    let harness = Harness::start(12528, 18083).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("http://127.0.0.1:{}/v1/api/mailmock/42", harness.http_port))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);

    let resp = client
        .get(format!("http://127.0.0.1:{}/v1/api/mailmock/not-a-number", harness.http_port))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    harness.shutdown().await;
}

#[tokio::test]
async fn cooperative_shutdown_stops_both_servers() {
    let harness = Harness::start(12529, 18084).await;
    harness.stop.cancel();
    let smtp_res = harness.smtp_task.await.unwrap();
    let http_res = harness.http_task.await.unwrap();
    assert!(smtp_res.is_ok());
    assert!(http_res.is_ok());
}
