//! tether CLI library
//!
//! Command implementations and terminal output helpers behind the `tether`
//! binary.

pub mod commands;
pub mod output;
