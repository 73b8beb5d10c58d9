//! Prelude module - commonly used types for convenient import.
//!
//! Use `use shellgate_policy::prelude::*;` to import the gates and policy types.

// Gates
pub use crate::{BlockOutcome, CommandGate, PathDecision, PathGate};

// Policy
pub use crate::{Operation, PermissionLevel, Policy, PolicyStore};

// Errors
pub use crate::{PolicyError, PolicyResult};
