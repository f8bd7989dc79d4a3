//! Context-driven cancellation against the mock server.
//!
//! Covers the race between an operation finishing and its context firing,
//! for both connection-scoped and statement-scoped operations.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::{Duration, Instant};

use pg_client::{CancellationToken, Client, Config, Context, Credentials, Error, SslMode};
use pg_testing::{CancelRecord, MockPgServer, MockResponse};

const SLOW_SQL: &str = "SELECT pg_sleep(1)";
const SLOW_DELAY: Duration = Duration::from_millis(800);

async fn server() -> MockPgServer {
    MockPgServer::builder()
        .with_response(
            SLOW_SQL,
            MockResponse::delayed(SLOW_DELAY, MockResponse::scalar_int(1)),
        )
        .with_response(
            "SELECT quick",
            MockResponse::delayed(Duration::from_millis(10), MockResponse::scalar_int(7)),
        )
        .with_response("SELECT 1", MockResponse::scalar_int(1))
        .build()
        .await
        .unwrap()
}

async fn connect(server: &MockPgServer, ssl_mode: SslMode) -> Client {
    let config = Config::new()
        .host(server.host())
        .port(server.port())
        .credentials(Credentials::without_password("app"))
        .ssl_mode(ssl_mode);
    Client::connect(config).await.unwrap()
}

/// Cancel records are pushed by the server's cancel handler, which runs
/// on its own task; give it a moment to land.
async fn wait_for_cancels(server: &MockPgServer, count: usize) -> Vec<CancelRecord> {
    for _ in 0..100 {
        let records = server.cancel_requests().await;
        if records.len() >= count {
            return records;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    server.cancel_requests().await
}

// =============================================================================
// Connection-scoped watcher
// =============================================================================

#[tokio::test]
async fn test_background_context_never_dials() {
    let server = server().await;
    let mut client = connect(&server, SslMode::Disable).await;

    let rows = client
        .query(&Context::background(), "SELECT quick", &[])
        .await
        .unwrap();
    assert_eq!(rows[0].get::<i32>(0).unwrap(), 7);

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(server.total_connections(), 1);
    assert!(server.cancel_requests().await.is_empty());
    assert!(!client.is_bad());
}

#[tokio::test]
async fn test_completion_before_cancel_keeps_connection() {
    let server = server().await;
    let mut client = connect(&server, SslMode::Disable).await;

    let token = CancellationToken::new();
    let ctx = Context::new(token.clone());
    let rows = client.query(&ctx, "SELECT 1", &[]).await.unwrap();
    assert_eq!(rows.len(), 1);

    token.cancel();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(!client.is_bad());
    assert_eq!(server.total_connections(), 1);
    assert!(server.cancel_requests().await.is_empty());

    // Still usable with a fresh context.
    client.query(&Context::background(), "SELECT 1", &[]).await.unwrap();
}

#[tokio::test]
async fn test_cancel_before_completion_marks_bad() {
    let server = server().await;
    let mut client = connect(&server, SslMode::Disable).await;
    let key = client.backend_key();

    let ctx = Context::with_timeout(Duration::from_millis(5));
    let started = Instant::now();
    let err = client.query(&ctx, SLOW_SQL, &[]).await.unwrap_err();

    assert!(matches!(err, Error::Cancelled), "got {err:?}");
    assert!(started.elapsed() < SLOW_DELAY, "server should abort the statement");
    assert!(client.is_bad());

    let records = wait_for_cancels(&server, 1).await;
    assert_eq!(
        records,
        vec![CancelRecord {
            process_id: key.process_id,
            secret_key: key.secret_key,
            matched: true,
        }]
    );
    assert_eq!(server.total_connections(), 2);

    let err = client
        .query(&Context::background(), "SELECT 1", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BadConnection));
    assert_eq!(server.cancel_requests().await.len(), 1, "exactly one cancel request");
}

#[tokio::test]
async fn test_cancel_side_connection_follows_ssl_mode() {
    let server = server().await;
    let mut client = connect(&server, SslMode::Prefer).await;
    let key = client.backend_key();

    let token = CancellationToken::new();
    let ctx = Context::new(token.clone());
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        token.cancel();
    });

    let err = client.execute(&ctx, SLOW_SQL, &[]).await.unwrap_err();
    canceller.await.unwrap();

    assert!(matches!(err, Error::Cancelled));
    let records = wait_for_cancels(&server, 1).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].process_id, key.process_id);
    assert!(records[0].matched);
}

#[tokio::test]
async fn test_already_cancelled_context_sends_nothing() {
    let server = server().await;
    let mut client = connect(&server, SslMode::Disable).await;

    let token = CancellationToken::new();
    token.cancel();
    let err = client
        .query(&Context::new(token), SLOW_SQL, &[])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ContextDone));
    assert!(!err.is_bad_connection());
    assert!(!client.is_bad());
    assert!(server.query_log().await.is_empty());
    assert_eq!(server.total_connections(), 1);
}

#[tokio::test]
async fn test_dropped_operation_sends_no_cancel() {
    let server = server().await;
    let mut client = connect(&server, SslMode::Disable).await;

    let token = CancellationToken::new();
    let ctx = Context::new(token.clone());
    let abandoned =
        tokio::time::timeout(Duration::from_millis(20), client.query(&ctx, SLOW_SQL, &[])).await;
    assert!(abandoned.is_err());

    token.cancel();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(server.cancel_requests().await.is_empty());

    // The socket is mid-response, so the connection cannot be reused.
    let err = client
        .query(&Context::background(), "SELECT 1", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BadConnection));
}

#[tokio::test]
async fn test_racing_cancel_resolves_exactly_once() {
    let server = server().await;
    let mut cancelled = 0;

    for _ in 0..20 {
        let mut client = connect(&server, SslMode::Disable).await;
        let ctx = Context::with_timeout(Duration::from_millis(10));
        match client.query(&ctx, "SELECT quick", &[]).await {
            Ok(rows) => {
                assert_eq!(rows.len(), 1);
                assert!(!client.is_bad());
            }
            Err(Error::Cancelled) => {
                assert!(client.is_bad());
                cancelled += 1;
            }
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    let records = wait_for_cancels(&server, cancelled).await;
    assert_eq!(records.len(), cancelled);
}

// =============================================================================
// Statement-scoped watcher
// =============================================================================

#[tokio::test]
async fn test_statement_cancel_keeps_connection() {
    let server = server().await;
    let mut client = connect(&server, SslMode::Disable).await;
    let stmt = client
        .prepare(&Context::background(), SLOW_SQL)
        .await
        .unwrap();

    let ctx = Context::with_timeout(Duration::from_millis(5));
    let err = client.query_statement(&ctx, &stmt, &[]).await.unwrap_err();

    assert!(err.is_query_canceled(), "got {err:?}");
    assert_eq!(err.sqlstate(), Some("57014"));
    assert!(!err.is_bad_connection());
    assert!(!client.is_bad());
    assert_eq!(server.cancel_requests().await.len(), 1);

    let rows = client
        .query(&Context::background(), "SELECT 1", &[])
        .await
        .unwrap();
    assert_eq!(rows[0].get::<i32>(0).unwrap(), 1);
}

#[tokio::test]
async fn test_statement_completion_before_cancel() {
    let server = server().await;
    let mut client = connect(&server, SslMode::Disable).await;
    let stmt = client
        .prepare(&Context::background(), "SELECT quick")
        .await
        .unwrap();

    let token = CancellationToken::new();
    let rows = client
        .query_statement(&Context::new(token.clone()), &stmt, &[])
        .await
        .unwrap();
    assert_eq!(rows[0].get::<i32>(0).unwrap(), 7);
    assert_eq!(rows[0].columns()[0].type_oid(), 23);

    token.cancel();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(server.cancel_requests().await.is_empty());
    assert!(!client.is_bad());
}

// =============================================================================
// Explicit cancel token
// =============================================================================

#[tokio::test]
async fn test_cancel_token_interrupts_running_query() {
    let server = server().await;
    let mut client = connect(&server, SslMode::Disable).await;
    let cancel = client.cancel_token();
    assert_eq!(cancel.backend_key(), client.backend_key());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel_query().await
    });

    let err = client
        .query(&Context::background(), SLOW_SQL, &[])
        .await
        .unwrap_err();
    canceller.await.unwrap().unwrap();

    assert!(err.is_query_canceled());
    assert!(!client.is_bad());
    client.ping(&Context::background()).await.unwrap();
}

#[tokio::test]
async fn test_cancel_token_dial_failure() {
    let server = server().await;
    let client = connect(&server, SslMode::Disable).await;
    let cancel = client.cancel_token();
    server.stop();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let err = cancel.cancel_query().await.unwrap_err();
    assert!(matches!(err, Error::Cancel(pg_client::CancelError::Dial(_))));
    assert!(!client.is_bad());
}
