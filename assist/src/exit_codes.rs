//! Stable exit codes for the assist CLI.

/// Every detected error was resolved (or none occurred).
pub const OK: i32 = 0;
/// Invalid arguments, configuration or input.
pub const INVALID: i32 = 1;
/// The run finished but at least one error chain ended unresolved.
pub const UNRESOLVED: i32 = 2;
/// The generation provider failed.
pub const PROVIDER: i32 = 3;
