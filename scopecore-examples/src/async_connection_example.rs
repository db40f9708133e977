//! Async scopes: a normal query, a timed out body and a cancelled body.

use std::time::Duration;

use scopecore::BodyTimeoutMs;
use scopecore_examples::{async_connection, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let (address, status) = async_connection::query("localhost", 5432).await?;
    println!("queried {address}, active after scope: {}", status.is_active());

    let limit = BodyTimeoutMs::try_new(50)?;
    let (status, err) = async_connection::slow_query("localhost", 5432, limit).await;
    println!("slow query: {err}");
    if let Some(status) = status {
        println!("active after timeout: {}", status.is_active());
    }

    if let Err(err) =
        async_connection::cancelled_after("localhost", 5432, Duration::from_millis(20)).await
    {
        println!("long query: {err}");
    }

    println!(
        "live scopes: {}",
        serde_json::to_string_pretty(&async_connection::monitor_stats())?
    );
    Ok(())
}
