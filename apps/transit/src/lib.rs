//! # transit
//!
//! Command-line front end of the Transit composer. Loads parameter files,
//! drives `transit-core` and renders its results.

pub mod cli;
pub mod config;
