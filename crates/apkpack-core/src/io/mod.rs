//! I/O utilities for archive serialization.

pub mod counting;

pub use counting::CountingWriter;
