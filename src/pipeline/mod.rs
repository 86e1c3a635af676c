mod config;
mod report;
mod runner;

pub use config::{
    Command, DetectorKind, DetectorSettings, Overrides, PipelineConfig, ReplaceMode,
    DETECT_MODEL, DETECT_THRESHOLD, REPLACE_MODEL, REPLACE_THRESHOLD,
};
pub use report::{
    mask, render, render_failures, DocumentReport, EntityRecord, RedactedParagraph, ReportFormat,
    Summary,
};
pub use runner::{DocumentOutcome, DocumentResult, DocumentSource, Pipeline};
