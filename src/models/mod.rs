//! Entity detectors: the contract the pipeline calls and its implementations.

pub mod chunk;
pub mod http;
pub mod pattern;

use crate::error::DetectionError;
use crate::ir::Span;
use crate::labels::LabelSet;

/// Given text and candidate labels, returns scored char spans. Implementations may
/// be slow and are called from one thread at a time.
pub trait EntityDetector: Send + Sync {
    fn name(&self) -> &str;

    fn detect(
        &self,
        text: &str,
        labels: &LabelSet,
        threshold: f32,
    ) -> Result<Vec<Span>, DetectionError>;

    /// One result list per input text, in input order.
    fn detect_batch(
        &self,
        texts: &[&str],
        labels: &LabelSet,
        threshold: f32,
    ) -> Result<Vec<Vec<Span>>, DetectionError> {
        texts
            .iter()
            .map(|t| self.detect(t, labels, threshold))
            .collect()
    }
}
