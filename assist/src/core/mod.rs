//! Deterministic, pure logic shared by the assist pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod classifier;
pub mod command;
pub mod env_format;
pub mod filename;
pub mod parser;
pub mod placeholder;
pub mod signature;
pub mod types;
