//! Error taxonomy of the path analyzer
//!
//! Fatal errors abort the current path and surface as [`AnalyzerError`].
//! Non-fatal findings surface as [`AnalyzerWarning`] values on
//! `Path::warnings` and as `tracing::warn!` events; they never alter the
//! produced query. Precondition violations (negative parameter indices,
//! dereferencing a non-pointer, temporary-pointer construction with a
//! non-pointer type) are bugs and panic instead.

use std::fmt;
use thiserror::Error;

/// Fatal analysis errors.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("switch instruction in block {block}; switches must be lowered to if-chains upstream")]
    SwitchInstruction { block: String },

    #[error("unknown opcode while tracing operand: {0}")]
    UnknownOpcode(String),

    #[error("malformed IR: {0}")]
    MalformedIr(String),

    #[error("function unit lookup failed: {0}")]
    FunctionUnit(String),

    #[error("unsupported feature: {0}")]
    Unsupported(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AnalyzerError>;

/// Non-fatal findings surfaced alongside the analysis output.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalyzerWarning {
    /// A float immediate was truncated to an integer.
    FloatTruncated { original: f64, truncated: i128 },
    /// An aggregate access did not line up with the base aggregate's field
    /// boundaries; the uncovered high bits were zero-padded.
    PartialFieldCoverage {
        aggregate: String,
        bit_offset: u64,
        access_bits: u32,
    },
}

impl fmt::Display for AnalyzerWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalyzerWarning::FloatTruncated {
                original,
                truncated,
            } => write!(f, "float immediate {original} truncated to {truncated}"),
            AnalyzerWarning::PartialFieldCoverage {
                aggregate,
                bit_offset,
                access_bits,
            } => write!(
                f,
                "access of {access_bits} bits at offset {bit_offset} of {aggregate} \
                 does not match field boundaries; high bits zero-padded"
            ),
        }
    }
}
