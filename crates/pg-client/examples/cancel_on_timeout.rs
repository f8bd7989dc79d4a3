//! Query timeouts with server-side cancellation.
//!
//! Runs a slow statement under a one-second deadline twice: once as a plain
//! query, which leaves the connection unusable, and once as a prepared
//! statement, which does not.
//!
//! # Running
//!
//! ```bash
//! export PGHOST=localhost
//! export PGUSER=postgres
//! export PGPASSWORD=postgres
//! export PGSSLMODE=disable
//!
//! RUST_LOG=pg_client=debug cargo run --example cancel_on_timeout
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use pg_client::{Client, Config, Context, Error};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    println!("Connecting to {}:{}...", config.host, config.port);

    // Connection-scoped: the deadline fires, a cancel request goes out on a
    // side connection and this client is marked bad.
    let mut client = Client::connect(config.clone()).await?;
    println!("Connected, backend {:?}", client.backend_key());

    let ctx = Context::with_timeout(Duration::from_secs(1));
    match client.query(&ctx, "SELECT pg_sleep(10)", &[]).await {
        Err(Error::Cancelled) => println!("query cancelled; connection bad = {}", client.is_bad()),
        other => println!("unexpected outcome: {other:?}"),
    }
    assert!(matches!(
        client.ping(&Context::background()).await,
        Err(Error::BadConnection)
    ));

    // Statement-scoped: the server aborts the execution with 57014 and the
    // connection carries on.
    let mut client = Client::connect(config).await?;
    let stmt = client
        .prepare(&Context::background(), "SELECT pg_sleep($1::float8)")
        .await?;

    let ctx = Context::with_timeout(Duration::from_secs(1));
    match client.query_statement(&ctx, &stmt, &[&10.0f64]).await {
        Err(e) if e.is_query_canceled() => {
            println!("statement cancelled ({e}); connection bad = {}", client.is_bad());
        }
        other => println!("unexpected outcome: {other:?}"),
    }

    client.ping(&Context::background()).await?;
    println!("connection still healthy");

    client.close().await?;
    Ok(())
}
