//! # Built-in subscribers
//!
//! - [`LogWriter`]: logs every event with its category through `tracing` (demo/debug).

mod log;

pub use log::LogWriter;
