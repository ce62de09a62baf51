//! Calyx Core - real-time engine and diagnostics for the Calyx module

pub mod audio;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod model;
pub mod types;

pub use types::*;
