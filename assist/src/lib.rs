//! Execution and remediation engine for model responses.
//!
//! Turns the fenced code blocks of a model response into file writes and shell
//! commands inside a project, fills secret placeholders from a local store or
//! the operator, refuses unsafe commands, and drives failed commands through a
//! bounded fix loop backed by deterministic fallbacks.
//!
//! - **[`core`]**: Pure, deterministic logic (parsing, classification,
//!   placeholder detection, path containment, error signatures). No I/O.
//! - **[`io`]**: Side-effecting adapters (filesystem, processes, prompts,
//!   configuration, secrets, the terminal). Trait seams allow scripting in tests.
//!
//! Orchestration modules ([`pipeline`], [`executor`], [`materialize`],
//! [`resolver`], [`remediation`], [`session`]) combine the two into
//! [`pipeline::run_assist_pipeline`].

pub mod core;
pub mod executor;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod materialize;
pub mod pipeline;
pub mod remediation;
pub mod resolver;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
