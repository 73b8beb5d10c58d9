//! shellgate policy - the access-control gate in front of every file and
//! command operation.
//!
//! - [`PolicyStore`] owns the policy: allowed directories with a permission
//!   level each, the command blocklist, and command aliases. Decisions are
//!   always taken against its current in-memory snapshot; the file on disk
//!   is only read again on an explicit [`PolicyStore::reload`].
//! - [`PathGate`] turns a requested path into a canonical absolute path and
//!   checks it against the directory list.
//! - [`CommandGate`] checks a command's executable token against the
//!   blocklist and resolves aliases.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use shellgate_policy::{CommandGate, Operation, PathGate, PolicyStore};
//! use shellgate_telemetry::EventLog;
//!
//! let store = Arc::new(PolicyStore::open("config.json", Arc::new(EventLog::disabled())));
//! let paths = PathGate::new(Arc::clone(&store));
//! let commands = CommandGate::new(store);
//!
//! assert!(commands.is_blocked("sudo rm -rf /"));
//! match paths.validate("~/notes.txt", Operation::Read) {
//!     Ok(decision) => println!("reading {}", decision.path.display()),
//!     Err(e) => println!("denied: {e}"),
//! }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod command;
mod error;
mod expand;
mod path;
mod store;
mod types;

pub use command::{BlockOutcome, CommandGate, base_command};
pub use error::{PolicyError, PolicyResult};
pub use expand::{PathEnv, expand_env_vars, normalize_lexically};
pub use path::{PathDecision, PathGate};
pub use store::PolicyStore;
pub use types::{
    AllowedDirectories, DEFAULT_BLOCKED_COMMANDS, DirectoryPermission, DirectoryPermissionEntry,
    Operation, PermissionLevel, Policy, PolicyFile,
};
