//! Driver subprocess lifecycle and connection.
//!
//! Spawns the external browser driver (an executable speaking the NDJSON
//! protocol defined in `verdict-protocol`), performs the `ping` handshake,
//! and provides sequential, deadline-bounded request/response calls.

mod connection;
mod driver;
mod error;
mod process;

pub use connection::DriverConnection;
pub use driver::{DRIVER_ENV, DriverConfig};
pub use error::{Error, Result};
pub use process::DriverProcess;
