//! Test doubles: a scripted in-memory backend that journals every statement it
//! sees, and a logger that records every event.

pub mod logger;
pub mod mock;

pub use logger::RecordingLogger;
pub use mock::{MockPool, MockStatement, MockTransaction, MockTxStatement};
