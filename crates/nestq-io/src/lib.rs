#![forbid(unsafe_code)]
//! nestq-io: data source adapters and JSON readers/writers.
//!
//! `MemorySource` is the reference adapter: it serves record trees held in
//! memory and can advertise any subset of native capabilities, which makes it
//! the backend for conformance tests (everything pushed vs. nothing pushed).

pub mod error;
pub mod memory_source;
pub mod readers;
pub mod writers;

pub use error::{Error, Result};
pub use memory_source::{MemorySource, SourceCalls};
pub use readers::json::{read_dataset, record_from_json};
pub use writers::jsonl::JsonlWriter;
