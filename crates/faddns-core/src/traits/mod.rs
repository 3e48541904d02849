//! Core traits for faddns
//!
//! - [`ZoneTools`]: validate, sign and reload a zone with external tooling

pub mod zone_tools;

pub use zone_tools::{ToolOutput, ZoneTools};
