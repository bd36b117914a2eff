//! Library half of the `kubecreds` binary, split out for testing.

pub mod config;
pub mod report;
