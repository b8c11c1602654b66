//! WMTP command-line client library
//!
//! Command implementations and output formatting for the `wmtp` binary.

pub mod commands;
pub mod output;
