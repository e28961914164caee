//! Common code shared between `asl_server` and `asl_client`.
pub mod protocol;

/// Error type.
pub type Error = Box<dyn std::error::Error>;
