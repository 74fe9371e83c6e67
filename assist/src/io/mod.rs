//! Side-effecting adapters: filesystem, processes, operator and generator.

pub mod config;
pub mod files;
pub mod generator;
pub mod operator;
pub mod process;
pub mod prompt;
pub mod secrets;
pub mod shell;
