//! Structured logging initialization (tracing-subscriber).

pub mod logger;

pub use logger::init;
