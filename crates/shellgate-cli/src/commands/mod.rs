//! CLI command implementations.

pub(crate) mod blocked;
pub(crate) mod call;
pub(crate) mod dirs;
pub(crate) mod serve;
pub(crate) mod tools;
