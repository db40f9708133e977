use std::time::Duration;

use futures::FutureExt;
use scopecore::prelude::*;
use scopecore::resources::ConnectionStatus;
use scopecore::{global_monitor, BodyTimeoutMs, ScopeStats};
use tracing::info;

/// Error type of the demo bodies.
pub type DemoError = std::io::Error;

/// Run a quick query-like body against an async connection.
pub async fn query(host: &str, port: u16) -> Result<(String, ConnectionStatus), ScopeError<DemoError>> {
    with_scope_async(ConnectionParams::new(host, port), |conn| {
        async move {
            tokio::task::yield_now().await;
            info!(%conn, "query finished");
            Ok((conn.to_string(), conn.status()))
        }
        .boxed()
    })
    .await
}

/// Run a body that outlives its time limit.
///
/// The connection is closed before the timeout error is returned.
pub async fn slow_query(
    host: &str,
    port: u16,
    limit: BodyTimeoutMs,
) -> (Option<ConnectionStatus>, ScopeError<DemoError>) {
    let config = ScopeConfig::default().with_body_timeout(limit);
    let mut status = None;
    let result = with_scope_async_config(ConnectionParams::new(host, port), config, |conn| {
        status = Some(conn.status());
        async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
        .boxed()
    })
    .await;

    match result {
        Ok(()) => unreachable!("the body sleeps past its limit"),
        Err(err) => (status, err),
    }
}

/// Cancel a long-running body after `after`.
pub async fn cancelled_after(host: &str, port: u16, after: Duration) -> Result<(), ScopeError<DemoError>> {
    with_scope_async_until(
        ConnectionParams::new(host, port),
        tokio::time::sleep(after),
        |_| std::future::pending().boxed(),
    )
    .await
}

/// Live scope statistics from the process-wide monitor.
pub fn monitor_stats() -> ScopeStats {
    global_monitor().stats()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn query_closes_connection() {
        let (address, status) = query("localhost", 5432).await.unwrap();
        assert_eq!(address, "localhost:5432");
        assert!(!status.is_active());
    }

    #[tokio::test]
    async fn timeout_closes_connection() {
        let (status, err) = slow_query("localhost", 5432, BodyTimeoutMs::try_new(20).unwrap()).await;
        assert!(matches!(err, ScopeError::Timeout { .. }));
        assert!(!status.unwrap().is_active());
    }

    #[test]
    fn cancellation_is_reported() {
        let result = tokio_test::block_on(cancelled_after(
            "localhost",
            5432,
            Duration::from_millis(10),
        ));
        assert!(matches!(result, Err(ScopeError::Cancelled { .. })));
    }
}
