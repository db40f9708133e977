//! Ready-made resources.
//!
//! - [`connection`]: a simulated network connection with an `active` flag
//! - [`file`]: a file opened for reading, writing or appending
//! - [`temp_file`]: a file that is deleted again on release

pub mod connection;
pub mod file;
pub mod temp_file;

pub use connection::{Connection, ConnectionParams, ConnectionStatus, Host, Port};
pub use file::{AsyncFileHandle, FileHandle, FileParams, OpenMode};
pub use temp_file::{TempFile, TempFileParams};
