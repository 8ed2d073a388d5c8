use std::time::Duration;
use thiserror::Error;

/// Every way a muster-roll run can fail.
///
/// The first four variants are the run-level taxonomy callers branch on. The
/// rest are plumbing failures raised by the browser layer; some of them
/// (`StaleReference`, `ElementNotFound`) are absorbed by the selector retry
/// and only escape when they are not recoverable.
#[derive(Debug, Error)]
pub enum MusterError {
    #[error("timed out after {}s waiting for {what}", waited.as_secs())]
    Timeout { what: String, waited: Duration },

    #[error("could not select '{value}' in {control} after {attempts} attempt(s): {reason}")]
    SelectionFailed {
        control: String,
        value: String,
        attempts: u32,
        reason: String,
    },

    #[error("no new browser window appeared within {}s", waited.as_secs())]
    WindowTimeout { waited: Duration },

    #[error("muster roll {muster_roll}: {reason}")]
    ExtractionFailure { muster_roll: String, reason: String },

    #[error("stale element reference: {0}")]
    StaleReference(String),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("browser launch failed: {0}")]
    BrowserLaunch(String),

    #[error("browser automation failed: {0}")]
    Browser(String),

    #[error("work code must not be empty")]
    InvalidWorkCode,

    #[error("failed to write spreadsheet: {0}")]
    Artifact(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MusterError {
    /// Whether the element went away between lookup and use, so a fresh
    /// lookup may succeed.
    pub fn is_stale(&self) -> bool {
        matches!(self, MusterError::StaleReference(_))
    }

    pub(crate) fn timeout(what: impl Into<String>, waited: Duration) -> Self {
        MusterError::Timeout {
            what: what.into(),
            waited,
        }
    }
}

impl From<rust_xlsxwriter::XlsxError> for MusterError {
    fn from(e: rust_xlsxwriter::XlsxError) -> Self {
        MusterError::Artifact(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MusterError>;
