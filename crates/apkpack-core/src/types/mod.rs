//! Validated value types shared by the writer, signer and auditor.
//!
//! Entry names are validated upon construction and cannot be created from
//! raw strings without going through validation.

pub mod entry_name;
pub mod page_size;

pub use entry_name::EntryName;
pub use page_size::PageSize;
