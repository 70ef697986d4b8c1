//! Error types for the cipher pipeline

/// Result type for cipher pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failures reported by the pipeline.
///
/// Every fallible operation returns one of these kinds; none of them are used
/// for ordinary control flow, and no resource survives a reported failure.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad buffer length, grid side mismatch, or empty input
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Device version below the minimum, or version string unparsable
    #[error("unsupported device: {0}")]
    UnsupportedDevice(String),

    /// Allocation failure, or the requested grid exceeds the device maximum
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Failure reported by the graphics layer at a specific call site
    #[error("device error in {op}: {detail}")]
    Device {
        /// Originating operation name
        op: &'static str,
        /// Diagnostic text from the graphics layer
        detail: String,
    },

    /// Routine compilation, link, or parameter resolution failure
    #[error("routine compile error: {log}")]
    Compile {
        /// Diagnostic log from the shader compiler
        log: String,
    },
}
