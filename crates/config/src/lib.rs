//! Configuration for mediabatch
//!
//! Loads batch settings from a TOML file and applies environment variable overrides.

pub mod config;

pub use config::*;
