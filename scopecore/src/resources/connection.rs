//! A simulated network connection.
//!
//! Acquisition validates the address and marks the connection active;
//! release marks it inactive. The flag lives behind a shared
//! [`ConnectionStatus`] so it can still be checked after the scope ended.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use nutype::nutype;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::{AcquisitionError, ReleaseError};
use crate::resource::{Acquire, AsyncAcquire, AsyncRelease, Release};

/// A host name or address.
///
/// Guaranteed to be non-empty after trimming and at most 253 characters.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 253),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct Host(String);

/// A TCP port. Port 0 is rejected.
#[nutype(
    validate(greater_or_equal = 1),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        Hash,
        Display,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct Port(u16);

/// Where to connect. Validated when the connection is acquired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Host to connect to.
    pub host: String,
    /// Port to connect to.
    pub port: u16,
}

impl ConnectionParams {
    /// Parameters for `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn connect(&self) -> Result<Connection, AcquisitionError> {
        let address = self.address();
        let host = Host::try_new(self.host.clone())
            .map_err(|e| AcquisitionError::new(&address, "invalid host").with_source(e))?;
        let port = Port::try_new(self.port)
            .map_err(|e| AcquisitionError::new(&address, "invalid port").with_source(e))?;

        let status = ConnectionStatus::default();
        status.active.store(true, Ordering::SeqCst);
        info!(%host, %port, "connected");

        Ok(Connection { host, port, status })
    }
}

/// Shared view of a connection's active flag.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStatus {
    active: Arc<AtomicBool>,
}

impl ConnectionStatus {
    /// Whether the connection is currently open.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// An open connection.
#[derive(Debug)]
pub struct Connection {
    host: Host,
    port: Port,
    status: ConnectionStatus,
}

impl Connection {
    /// The connected host.
    pub const fn host(&self) -> &Host {
        &self.host
    }

    /// The connected port.
    pub const fn port(&self) -> Port {
        self.port
    }

    /// Whether the connection is open.
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// A handle to the active flag that outlives the connection.
    pub fn status(&self) -> ConnectionStatus {
        self.status.clone()
    }

    fn disconnect(&self) {
        if self.status.active.swap(false, Ordering::SeqCst) {
            info!(host = %self.host, port = %self.port, "disconnected");
        }
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl Acquire for ConnectionParams {
    type Resource = Connection;

    fn descriptor(&self) -> String {
        self.address()
    }

    fn acquire(&self) -> Result<Connection, AcquisitionError> {
        self.connect()
    }
}

impl Release for Connection {
    fn release(&mut self) -> Result<(), ReleaseError> {
        self.disconnect();
        Ok(())
    }
}

#[async_trait]
impl AsyncAcquire for ConnectionParams {
    type Resource = Connection;

    fn descriptor(&self) -> String {
        self.address()
    }

    async fn acquire(&self) -> Result<Connection, AcquisitionError> {
        tokio::task::yield_now().await;
        self.connect()
    }
}

#[async_trait]
impl AsyncRelease for Connection {
    async fn release(&mut self) -> Result<(), ReleaseError> {
        self.disconnect();
        Ok(())
    }

    fn release_on_drop(&mut self) {
        self.disconnect();
    }
}
