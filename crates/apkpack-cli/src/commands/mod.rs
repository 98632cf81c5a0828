//! Subcommand implementations.

pub mod audit;
pub mod check;
pub mod completion;
pub mod pack;
