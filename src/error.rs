use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// The document could not be turned into a flattened text stream.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("{part}: invalid xml: {message}")]
    Xml { part: String, message: String },

    #[error("{part}: malformed structure at xml event {event}: {reason}")]
    Malformed {
        part: String,
        event: usize,
        reason: String,
    },

    #[error("{part}: paragraph {paragraph} run {run} records {recorded} chars but holds {actual}")]
    RunLength {
        part: String,
        paragraph: usize,
        run: usize,
        recorded: usize,
        actual: usize,
    },
}

/// The external detector could not produce spans for a request.
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("detector request timed out after {0:?}")]
    Timeout(Duration),

    #[error("detector request failed: {0}")]
    Request(String),

    #[error("detector returned http {status}: {body}")]
    Status { status: u16, body: String },

    #[error("detector response malformed: {0}")]
    Response(String),

    #[error("detector returned {got} results for {expected} texts")]
    BatchShape { expected: usize, got: usize },
}

/// A detector span that does not fit the buffer it was reported against.
#[derive(Debug, Error)]
#[error("span {start}..{end} ({label}) violates buffer of {len} chars")]
pub struct ResolverInvariantError {
    pub start: usize,
    pub end: usize,
    pub label: String,
    pub len: usize,
}

#[derive(Debug, Error)]
#[error("unknown label(s): {}", .labels.join(", "))]
pub struct UnknownLabelError {
    pub labels: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Load,
    Extract,
    Detect,
    Rewrite,
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Load => "load",
            Stage::Extract => "extract",
            Stage::Detect => "detect",
            Stage::Rewrite => "rewrite",
            Stage::Write => "write",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum FailureCause {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Detection(#[from] DetectionError),

    #[error("{0:#}")]
    Io(anyhow::Error),
}

/// A document-level failure. Never aborts the other documents of a run.
#[derive(Debug, Error)]
#[error("{document}: {stage} failed: {cause}")]
pub struct PipelineError {
    pub document: String,
    pub stage: Stage,
    #[source]
    pub cause: FailureCause,
}

impl PipelineError {
    pub fn new(document: impl Into<String>, stage: Stage, cause: impl Into<FailureCause>) -> Self {
        Self {
            document: document.into(),
            stage,
            cause: cause.into(),
        }
    }

    pub fn io(document: impl Into<String>, stage: Stage, err: anyhow::Error) -> Self {
        Self::new(document, stage, FailureCause::Io(err))
    }
}
