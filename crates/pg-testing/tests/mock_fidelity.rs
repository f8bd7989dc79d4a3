//! Mock PostgreSQL Server Fidelity Tests
//!
//! These tests drive the mock server with hand-built frontend messages and
//! check that its replies decode with the same backend decoder the client
//! uses.
//!
//! ```bash
//! cargo test -p pg-testing --test mock_fidelity
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Duration;

use bytes::BytesMut;
use pg_codec::Connection;
use pg_protocol::frontend;
use pg_protocol::{AuthenticationRequest, BackendMessage, DescribeTarget, TransactionStatus};
use pg_testing::mock_server::{MockColumn, MockPgServer, MockResponse, ScalarValue};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

type Conn = Connection<TcpStream>;

/// Connect and run the startup exchange, returning the backend key.
async fn startup(server: &MockPgServer, password: Option<&str>) -> (Conn, i32, i32) {
    let stream = TcpStream::connect(server.addr()).await.expect("connect");
    let mut conn = Connection::new(stream, 8192);

    let mut buf = BytesMut::new();
    frontend::startup_message([("user", "tester"), ("database", "db")], &mut buf);
    conn.send(buf).await.unwrap();

    let mut key = None;
    loop {
        match conn.read_message().await.unwrap() {
            BackendMessage::Authentication(AuthenticationRequest::CleartextPassword) => {
                let mut buf = BytesMut::new();
                frontend::password_message(password.unwrap_or_default(), &mut buf);
                conn.send(buf).await.unwrap();
            }
            BackendMessage::Authentication(AuthenticationRequest::Ok) => {}
            BackendMessage::ParameterStatus { .. } => {}
            BackendMessage::BackendKeyData {
                process_id,
                secret_key,
            } => key = Some((process_id, secret_key)),
            BackendMessage::ReadyForQuery(status) => {
                assert_eq!(status, TransactionStatus::Idle);
                break;
            }
            other => panic!("unexpected startup message: {other:?}"),
        }
    }
    let (pid, secret) = key.expect("BackendKeyData");
    (conn, pid, secret)
}

/// Send a simple query and collect messages up to ReadyForQuery.
async fn simple_query(conn: &mut Conn, sql: &str) -> (Vec<BackendMessage>, TransactionStatus) {
    let mut buf = BytesMut::new();
    frontend::query(sql, &mut buf);
    conn.send(buf).await.unwrap();
    let mut messages = Vec::new();
    loop {
        match conn.read_message().await.unwrap() {
            BackendMessage::ReadyForQuery(status) => return (messages, status),
            other => messages.push(other),
        }
    }
}

async fn send_cancel(server: &MockPgServer, pid: i32, secret: i32) {
    let mut side = TcpStream::connect(server.addr()).await.unwrap();
    let mut buf = BytesMut::new();
    frontend::cancel_request(pid, secret, &mut buf);
    side.write_all(&buf).await.unwrap();
    let mut rest = Vec::new();
    side.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty(), "cancel requests get no reply");
}

// =============================================================================
// Startup
// =============================================================================

#[tokio::test]
async fn test_mock_server_starts_and_listens() {
    let server = MockPgServer::builder()
        .build()
        .await
        .expect("Server should start");

    assert!(server.port() > 0, "Should have valid port");
    assert_eq!(server.host(), "127.0.0.1", "Should listen on localhost");
    assert_eq!(server.total_connections(), 0);

    server.stop();
}

#[tokio::test]
async fn test_ssl_request_declined() {
    let server = MockPgServer::builder().build().await.unwrap();
    let mut stream = TcpStream::connect(server.addr()).await.unwrap();

    let mut buf = BytesMut::new();
    frontend::ssl_request(&mut buf);
    stream.write_all(&buf).await.unwrap();
    assert_eq!(stream.read_u8().await.unwrap(), b'N');
}

#[tokio::test]
async fn test_unique_backend_keys() {
    let server = MockPgServer::builder().build().await.unwrap();
    let (_a, pid_a, secret_a) = startup(&server, None).await;
    let (_b, pid_b, secret_b) = startup(&server, None).await;

    assert_ne!(pid_a, pid_b);
    assert_ne!(secret_a, secret_b);
    assert_eq!(server.session_secret(pid_a).await, Some(secret_a));
    assert_eq!(server.active_connections(), 2);
}

#[tokio::test]
async fn test_closed_session_is_unregistered() {
    let server = MockPgServer::builder().build().await.unwrap();
    let (mut conn, pid, secret) = startup(&server, None).await;
    assert_eq!(server.session_secret(pid).await, Some(secret));

    let mut buf = BytesMut::new();
    frontend::terminate(&mut buf);
    conn.send(buf).await.unwrap();
    drop(conn);

    let mut registered = true;
    for _ in 0..50 {
        registered = server.session_secret(pid).await.is_some();
        if !registered {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!registered);

    // A cancel for the ended session no longer matches.
    send_cancel(&server, pid, secret).await;
    assert!(!server.cancel_requests().await[0].matched);
}

#[tokio::test]
async fn test_password_required() {
    let server = MockPgServer::builder()
        .with_password("hunter2")
        .build()
        .await
        .unwrap();
    let (_conn, pid, _) = startup(&server, Some("hunter2")).await;
    assert!(pid >= 1000);

    let stream = TcpStream::connect(server.addr()).await.unwrap();
    let mut conn = Connection::new(stream, 8192);
    let mut buf = BytesMut::new();
    frontend::startup_message([("user", "tester")], &mut buf);
    conn.send(buf).await.unwrap();
    assert!(matches!(
        conn.read_message().await.unwrap(),
        BackendMessage::Authentication(AuthenticationRequest::CleartextPassword)
    ));
    let mut buf = BytesMut::new();
    frontend::password_message("wrong", &mut buf);
    conn.send(buf).await.unwrap();
    match conn.read_message().await.unwrap() {
        BackendMessage::ErrorResponse(err) => {
            assert!(err.is_fatal());
            assert_eq!(err.code, "28P01");
        }
        other => panic!("Expected ErrorResponse, got {other:?}"),
    }
}

// =============================================================================
// Simple query flow
// =============================================================================

#[tokio::test]
async fn test_rows_response() {
    let server = MockPgServer::builder()
        .with_response(
            "SELECT id, name FROM users",
            MockResponse::rows(
                vec![MockColumn::int4("id"), MockColumn::text("name")],
                vec![
                    vec![ScalarValue::Int(1), ScalarValue::String("Alice".into())],
                    vec![ScalarValue::Int(2), ScalarValue::Null],
                ],
            ),
        )
        .build()
        .await
        .unwrap();
    let (mut conn, _, _) = startup(&server, None).await;

    let (messages, _) = simple_query(&mut conn, "SELECT id, name FROM users").await;
    assert_eq!(messages.len(), 4);
    match &messages[0] {
        BackendMessage::RowDescription(fields) => {
            assert_eq!(fields[0].name, "id");
            assert_eq!(fields[0].type_oid, 23);
            assert_eq!(fields[1].type_oid, 25);
        }
        other => panic!("Expected RowDescription, got {other:?}"),
    }
    match &messages[2] {
        BackendMessage::DataRow(row) => assert!(row.values[1].is_none()),
        other => panic!("Expected DataRow, got {other:?}"),
    }
    assert!(matches!(
        &messages[3],
        BackendMessage::CommandComplete { tag } if tag == "SELECT 2"
    ));
    assert_eq!(server.query_log().await, vec!["SELECT id, name FROM users"]);
}

#[tokio::test]
async fn test_empty_query() {
    let server = MockPgServer::builder().build().await.unwrap();
    let (mut conn, _, _) = startup(&server, None).await;

    let (messages, status) = simple_query(&mut conn, ";").await;
    assert!(matches!(messages[..], [BackendMessage::EmptyQueryResponse]));
    assert_eq!(status, TransactionStatus::Idle);
}

#[tokio::test]
async fn test_transaction_status_tracking() {
    let server = MockPgServer::builder()
        .with_response("SELECT broken", MockResponse::error("42601", "syntax error"))
        .build()
        .await
        .unwrap();
    let (mut conn, _, _) = startup(&server, None).await;

    let (_, status) = simple_query(&mut conn, "BEGIN ISOLATION LEVEL SERIALIZABLE").await;
    assert_eq!(status, TransactionStatus::InTransaction);

    let (_, status) = simple_query(&mut conn, "SELECT broken").await;
    assert_eq!(status, TransactionStatus::Failed);

    let (messages, _) = simple_query(&mut conn, "SELECT 1").await;
    match &messages[0] {
        BackendMessage::ErrorResponse(err) => assert_eq!(err.code, "25P02"),
        other => panic!("Expected ErrorResponse, got {other:?}"),
    }

    let (messages, status) = simple_query(&mut conn, "COMMIT").await;
    assert!(matches!(
        &messages[0],
        BackendMessage::CommandComplete { tag } if tag == "ROLLBACK"
    ));
    assert_eq!(status, TransactionStatus::Idle);
}

// =============================================================================
// Extended query flow
// =============================================================================

#[tokio::test]
async fn test_extended_flow() {
    let server = MockPgServer::builder()
        .with_response(
            "SELECT $1::int4",
            MockResponse::custom(|_| MockResponse::scalar_int(7)),
        )
        .build()
        .await
        .unwrap();
    let (mut conn, _, _) = startup(&server, None).await;

    let mut buf = BytesMut::new();
    frontend::parse("s1", "SELECT $1::int4", &[], &mut buf);
    frontend::describe(DescribeTarget::Statement, "s1", &mut buf);
    frontend::bind("", "s1", [Some(&b"7"[..])], &mut buf);
    frontend::execute("", 0, &mut buf);
    frontend::sync(&mut buf);
    conn.send(buf).await.unwrap();

    assert!(matches!(conn.read_message().await.unwrap(), BackendMessage::ParseComplete));
    match conn.read_message().await.unwrap() {
        BackendMessage::ParameterDescription(oids) => assert_eq!(oids.len(), 1),
        other => panic!("Expected ParameterDescription, got {other:?}"),
    }
    assert!(matches!(conn.read_message().await.unwrap(), BackendMessage::RowDescription(_)));
    assert!(matches!(conn.read_message().await.unwrap(), BackendMessage::BindComplete));
    match conn.read_message().await.unwrap() {
        BackendMessage::DataRow(row) => assert_eq!(row.values[0].as_deref(), Some(&b"7"[..])),
        other => panic!("Expected DataRow, got {other:?}"),
    }
    assert!(matches!(conn.read_message().await.unwrap(), BackendMessage::CommandComplete { .. }));
    assert!(matches!(conn.read_message().await.unwrap(), BackendMessage::ReadyForQuery(_)));
}

#[tokio::test]
async fn test_extended_error_skips_to_sync() {
    let server = MockPgServer::builder().build().await.unwrap();
    let (mut conn, _, _) = startup(&server, None).await;

    let mut buf = BytesMut::new();
    frontend::bind("", "missing", [None], &mut buf);
    frontend::execute("", 0, &mut buf);
    frontend::sync(&mut buf);
    conn.send(buf).await.unwrap();

    match conn.read_message().await.unwrap() {
        BackendMessage::ErrorResponse(err) => assert_eq!(err.code, "26000"),
        other => panic!("Expected ErrorResponse, got {other:?}"),
    }
    assert!(matches!(conn.read_message().await.unwrap(), BackendMessage::ReadyForQuery(_)));
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_cancel_aborts_delayed_response() {
    let server = MockPgServer::builder()
        .with_response(
            "SELECT pg_sleep(10)",
            MockResponse::delayed(Duration::from_secs(10), MockResponse::command("SELECT 1")),
        )
        .build()
        .await
        .unwrap();
    let (mut conn, pid, secret) = startup(&server, None).await;

    let mut buf = BytesMut::new();
    frontend::query("SELECT pg_sleep(10)", &mut buf);
    conn.send(buf).await.unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    send_cancel(&server, pid, secret).await;

    let reply = tokio::time::timeout(Duration::from_secs(2), conn.read_message())
        .await
        .expect("cancel should interrupt the delay")
        .unwrap();
    match reply {
        BackendMessage::ErrorResponse(err) => assert!(err.is_query_canceled()),
        other => panic!("Expected ErrorResponse, got {other:?}"),
    }
    assert!(matches!(conn.read_message().await.unwrap(), BackendMessage::ReadyForQuery(_)));

    let cancels = server.cancel_requests().await;
    assert_eq!(cancels.len(), 1);
    assert_eq!(cancels[0].process_id, pid);
    assert!(cancels[0].matched);
}

#[tokio::test]
async fn test_cancel_with_wrong_secret_ignored() {
    let server = MockPgServer::builder()
        .with_response(
            "SELECT pg_sleep(0.1)",
            MockResponse::delayed(Duration::from_millis(100), MockResponse::command("SELECT 1")),
        )
        .build()
        .await
        .unwrap();
    let (mut conn, pid, secret) = startup(&server, None).await;

    let mut buf = BytesMut::new();
    frontend::query("SELECT pg_sleep(0.1)", &mut buf);
    conn.send(buf).await.unwrap();
    send_cancel(&server, pid, secret.wrapping_add(1)).await;

    assert!(matches!(
        conn.read_message().await.unwrap(),
        BackendMessage::CommandComplete { .. }
    ));
    assert!(!server.cancel_requests().await[0].matched);
}

#[tokio::test]
async fn test_kill_connections() {
    let server = MockPgServer::builder().build().await.unwrap();
    let (mut conn, _, _) = startup(&server, None).await;

    server.kill_connections().await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut buf = BytesMut::new();
    frontend::query(";", &mut buf);
    let _ = conn.send(buf).await;
    assert!(conn.read_message().await.is_err());
    assert_eq!(server.active_connections(), 0);
}
