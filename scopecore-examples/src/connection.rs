use scopecore::prelude::*;
use scopecore::resources::ConnectionStatus;
use thiserror::Error;
use tracing::info;

/// Failure raised inside the demo scope.
#[derive(Debug, Error)]
#[error("simulated error while using {0}")]
pub struct SimulatedError(String);

/// Open a connection, observe the flag, and hand the status back.
pub fn use_connection(host: &str, port: u16) -> Result<ConnectionStatus, ScopeError<SimulatedError>> {
    with_scope(ConnectionParams::new(host, port), |conn| {
        info!(%conn, active = conn.is_active(), "using connection");
        Ok(conn.status())
    })
}

/// Fail inside the scope; the connection is still closed.
///
/// Returns the status handle and the error the scope reported.
pub fn failing_body(host: &str, port: u16) -> (Option<ConnectionStatus>, ScopeError<SimulatedError>) {
    let mut status = None;
    let result = with_scope(ConnectionParams::new(host, port), |conn| {
        status = Some(conn.status());
        Err::<(), _>(SimulatedError(conn.to_string()))
    });
    match result {
        Ok(()) => unreachable!("the body always fails"),
        Err(err) => (status, err),
    }
}

/// Open a connection with an RAII guard instead of a closure.
pub fn guarded(host: &str, port: u16) -> Result<ConnectionStatus, scopecore::AcquisitionError> {
    let conn = scope(&ConnectionParams::new(host, port))?;
    Ok(conn.status())
}
