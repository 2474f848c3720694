//! Shared test support
//!
//! Helpers the domain crates use in their integration tests: an audit sink
//! that records every event for later assertions, and a tracing initializer
//! honoring `RUST_LOG`.

pub mod audit;
pub mod logging;

pub use audit::RecordingAudit;
pub use logging::init_test_logging;
