//! shellgate telemetry - tracing setup and the human-readable event logs.
//!
//! Two independent concerns live here:
//! - [`setup_logging`] installs the global `tracing` subscriber used for
//!   diagnostics by every other crate.
//! - [`EventLog`] appends one line per access decision, command execution
//!   or diagnostic to plain log files. It is injected into the gates and the
//!   session engine; nothing in this crate owns it.
//!
//! # Example
//!
//! ```rust,no_run
//! use shellgate_telemetry::{EventLog, LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), shellgate_telemetry::TelemetryError> {
//! setup_logging(&LogConfig::new("debug").with_format(LogFormat::Compact))?;
//!
//! let events = EventLog::in_dir("/tmp/shellgate-logs");
//! events.command(4242, "ls -la");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod event_log;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use event_log::{EventChannel, EventLog};
pub use logging::{FileRotation, LogConfig, LogFormat, LogTarget, setup_logging};
