//! End-to-end client behaviour against the mock server.
//!
//! Connection establishment, authentication, query flows, error
//! classification and the liveness probe.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use pg_client::{Client, Config, Context, Credentials, Error, SslMode};
use pg_testing::{MockColumn, MockPgServer, MockResponse, ScalarValue};

fn config_for(server: &MockPgServer) -> Config {
    Config::new()
        .host(server.host())
        .port(server.port())
        .credentials(Credentials::without_password("app"))
        .ssl_mode(SslMode::Disable)
}

fn users() -> MockResponse {
    MockResponse::rows(
        vec![
            MockColumn::int4("id"),
            MockColumn::text("name"),
            MockColumn::bool("active"),
        ],
        vec![
            vec![
                ScalarValue::Int(1),
                ScalarValue::String("Alice".into()),
                ScalarValue::Bool(true),
            ],
            vec![
                ScalarValue::Int(2),
                ScalarValue::Null,
                ScalarValue::Bool(false),
            ],
        ],
    )
}

// =============================================================================
// Connection establishment
// =============================================================================

#[tokio::test]
async fn test_connect_and_session_parameters() {
    let server = MockPgServer::builder()
        .with_server_version("16.2")
        .build()
        .await
        .unwrap();
    let client = Client::connect(config_for(&server).application_name("orders-api"))
        .await
        .unwrap();

    assert_eq!(client.parameter("server_version"), Some("16.2"));
    assert_eq!(client.parameter("application_name"), Some("orders-api"));
    assert_eq!(client.parameter("client_encoding"), Some("UTF8"));
    assert!(client.backend_key().process_id >= 1000);
    assert_eq!(server.active_connections(), 1);
}

#[tokio::test]
async fn test_prefer_falls_back_to_cleartext() {
    let server = MockPgServer::builder().build().await.unwrap();
    let mut client = Client::connect(config_for(&server).ssl_mode(SslMode::Prefer))
        .await
        .unwrap();
    client.ping(&Context::background()).await.unwrap();
}

#[tokio::test]
async fn test_require_fails_when_server_declines() {
    let server = MockPgServer::builder().build().await.unwrap();
    let err = Client::connect(config_for(&server).ssl_mode(SslMode::Require))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Tls(_)), "got {err:?}");
}

#[tokio::test]
async fn test_connect_refused() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = Config::new()
        .host("127.0.0.1")
        .port(port)
        .credentials(Credentials::without_password("app"))
        .ssl_mode(SslMode::Disable);
    let err = Client::connect(config).await.unwrap_err();
    assert!(matches!(err, Error::Connection(_)), "got {err:?}");
}

#[tokio::test]
async fn test_connect_timeout() {
    // Accepts but never answers the startup message.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let _hold = tokio::spawn(async move {
        let (_socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let config = Config::new()
        .host("127.0.0.1")
        .port(port)
        .credentials(Credentials::without_password("app"))
        .ssl_mode(SslMode::Disable)
        .connect_timeout(Duration::from_millis(50));
    let err = Client::connect(config).await.unwrap_err();
    assert!(matches!(err, Error::ConnectionTimeout));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_connection_string_config() {
    let server = MockPgServer::builder().build().await.unwrap();
    let conn_str = format!(
        "host={} port={} user=app dbname=orders sslmode=disable application_name='batch job'",
        server.host(),
        server.port()
    );
    let config = Config::from_connection_string(&conn_str).unwrap();
    let client = Client::connect(config).await.unwrap();
    assert_eq!(client.parameter("application_name"), Some("batch job"));
}

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn test_password_authentication() {
    let server = MockPgServer::builder()
        .with_password("s3cret")
        .build()
        .await
        .unwrap();
    let config = config_for(&server).credentials(Credentials::new("app", "s3cret"));
    let mut client = Client::connect(config).await.unwrap();
    client.ping(&Context::background()).await.unwrap();
}

#[tokio::test]
async fn test_wrong_password_is_fatal() {
    let server = MockPgServer::builder()
        .with_password("s3cret")
        .build()
        .await
        .unwrap();
    let config = config_for(&server).credentials(Credentials::new("app", "wrong"));
    let err = Client::connect(config).await.unwrap_err();
    assert_eq!(err.sqlstate(), Some("28P01"));
    assert!(err.is_bad_connection());
}

#[tokio::test]
async fn test_missing_password() {
    let server = MockPgServer::builder()
        .with_password("s3cret")
        .build()
        .await
        .unwrap();
    let err = Client::connect(config_for(&server)).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Authentication(pg_auth::AuthError::PasswordRequired)
    ));
}

// =============================================================================
// Queries
// =============================================================================

#[tokio::test]
async fn test_simple_query_rows() {
    let server = MockPgServer::builder()
        .with_response("SELECT id, name, active FROM users", users())
        .build()
        .await
        .unwrap();
    let mut client = Client::connect(config_for(&server)).await.unwrap();

    let rows = client
        .query(&Context::background(), "SELECT id, name, active FROM users", &[])
        .await
        .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get::<i32>(0).unwrap(), 1);
    assert_eq!(rows[0].get_by_name::<String>("name").unwrap(), "Alice");
    assert!(rows[0].get::<bool>(2).unwrap());
    assert!(rows[1].is_null(1));
    assert_eq!(rows[1].get::<Option<String>>(1).unwrap(), None);
    assert_eq!(rows[1].columns()[0].name(), "id");
}

#[tokio::test]
async fn test_parameterized_query_uses_extended_protocol() {
    let sql = "SELECT id, name, active FROM users WHERE id = $1 AND name = $2";
    let server = MockPgServer::builder()
        .with_response(sql, users())
        .build()
        .await
        .unwrap();
    let mut client = Client::connect(config_for(&server)).await.unwrap();

    let rows = client
        .query(&Context::background(), sql, &[&1i32, &"Alice"])
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get::<i64>(0).unwrap(), 1);
    assert_eq!(server.query_log().await, vec![sql]);
}

#[tokio::test]
async fn test_execute_rows_affected() {
    let server = MockPgServer::builder()
        .with_response(
            "UPDATE users SET active = false",
            MockResponse::command("UPDATE 3"),
        )
        .with_response(
            "INSERT INTO users (name) VALUES ($1)",
            MockResponse::command("INSERT 0 1"),
        )
        .build()
        .await
        .unwrap();
    let mut client = Client::connect(config_for(&server)).await.unwrap();
    let ctx = Context::background();

    let updated = client
        .execute(&ctx, "UPDATE users SET active = false", &[])
        .await
        .unwrap();
    assert_eq!(updated, 3);

    let inserted = client
        .execute(&ctx, "INSERT INTO users (name) VALUES ($1)", &[&"Bob"])
        .await
        .unwrap();
    assert_eq!(inserted, 1);
}

#[tokio::test]
async fn test_prepared_statement_lifecycle() {
    let sql = "SELECT id, name, active FROM users WHERE id = $1";
    let server = MockPgServer::builder()
        .with_response(sql, users())
        .build()
        .await
        .unwrap();
    let mut client = Client::connect(config_for(&server)).await.unwrap();
    let ctx = Context::background();

    let stmt = client.prepare(&ctx, sql).await.unwrap();
    assert_eq!(stmt.sql(), sql);
    assert_eq!(stmt.param_types().len(), 1);
    assert_eq!(stmt.columns().len(), 3);

    let rows = client.query_statement(&ctx, &stmt, &[&1i32]).await.unwrap();
    assert!(!rows[1].get::<bool>(2).unwrap());

    let affected = client.execute_statement(&ctx, &stmt, &[&2i32]).await.unwrap();
    assert_eq!(affected, 2);

    let err = client.query_statement(&ctx, &stmt, &[]).await.unwrap_err();
    assert!(matches!(err, Error::Query(_)));

    let name = stmt.name().to_string();
    client.close_statement(&ctx, stmt.clone()).await.unwrap();
    let err = client.query_statement(&ctx, &stmt, &[&1i32]).await.unwrap_err();
    assert_eq!(err.sqlstate(), Some("26000"), "statement {name} should be gone");
    assert!(!client.is_bad());
}

#[tokio::test]
async fn test_server_error_keeps_connection() {
    let server = MockPgServer::builder()
        .with_response(
            "SELECT * FROM missing",
            MockResponse::error("42P01", "relation \"missing\" does not exist"),
        )
        .with_response("SELECT 1", MockResponse::scalar_int(1))
        .build()
        .await
        .unwrap();
    let mut client = Client::connect(config_for(&server)).await.unwrap();
    let ctx = Context::background();

    let err = client
        .query(&ctx, "SELECT * FROM missing", &[])
        .await
        .unwrap_err();
    assert_eq!(err.sqlstate(), Some("42P01"));
    assert!(!err.is_bad_connection());
    assert!(!client.is_bad());

    let rows = client.query(&ctx, "SELECT 1", &[]).await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn test_empty_query() {
    let server = MockPgServer::builder().build().await.unwrap();
    let mut client = Client::connect(config_for(&server)).await.unwrap();
    let rows = client
        .query(&Context::background(), "", &[])
        .await
        .unwrap();
    assert!(rows.is_empty());
}

// =============================================================================
// Ping and connection health
// =============================================================================

#[tokio::test]
async fn test_ping_healthy() {
    let server = MockPgServer::builder().build().await.unwrap();
    let mut client = Client::connect(config_for(&server)).await.unwrap();
    client.ping(&Context::background()).await.unwrap();
    client
        .ping(&Context::with_timeout(Duration::from_secs(5)))
        .await
        .unwrap();
    assert!(!client.is_bad());
    assert_eq!(server.total_connections(), 1);
}

#[tokio::test]
async fn test_ping_after_peer_close_returns_bad_connection() {
    let server = MockPgServer::builder().build().await.unwrap();
    let mut client = Client::connect(config_for(&server)).await.unwrap();

    server.kill_connections().await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let err = client.ping(&Context::background()).await.unwrap_err();
    assert!(matches!(err, Error::BadConnection), "got {err:?}");
    assert!(client.is_bad());

    let err = client
        .query(&Context::background(), "SELECT 1", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BadConnection));
}

#[tokio::test]
async fn test_close_terminates_session() {
    let server = MockPgServer::builder().build().await.unwrap();
    let client = Client::connect(config_for(&server)).await.unwrap();
    assert_eq!(server.active_connections(), 1);

    client.close().await.unwrap();
    for _ in 0..50 {
        if server.active_connections() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(server.active_connections(), 0);
}
