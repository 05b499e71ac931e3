//! tracemap: live traceroute visualization with deterministic replay

pub mod config;
pub mod console;
pub mod error;
pub mod geo;
pub mod jitter;
pub mod render;
pub mod settings;
pub mod trace;
