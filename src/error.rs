use thiserror::Error;

/// The only failure mode that aborts parsing.
///
/// Every other defect the core encounters (structural mismatches,
/// malformed segments, missing required fields, rule violations, ...)
/// is recorded as a [`crate::diagnostics::Diagnostic`] and parsing
/// continues; see the error-handling design in SPEC_FULL.md §7.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EdiError {
    #[error("input is not a valid X12 interchange: {0}")]
    InvalidHeader(String),
}

pub type Result<T> = std::result::Result<T, EdiError>;
