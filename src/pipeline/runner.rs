use std::path::{Path, PathBuf};

use anyhow::Context;
use rayon::prelude::*;
use sha2::{Digest, Sha256};

use crate::docx::apply::{annotate, rewrite, RewriteStats};
use crate::docx::extract::extract;
use crate::docx::model::Document;
use crate::docx::package::DocxPackage;
use crate::error::{DetectionError, PipelineError, Stage};
use crate::ir::{FlattenedDocument, Span};
use crate::models::chunk::{chunk_document, shift_spans, Chunk, Shifted};
use crate::models::EntityDetector;
use crate::pipeline::config::{Command, PipelineConfig};
use crate::pipeline::report::DocumentReport;
use crate::progress::ConsoleProgress;
use crate::replace::{document_seed, ReplacementProvider, ValueGenerator};
use crate::resolve::resolve;

/// One input document. `id` names it in reports and errors.
#[derive(Clone, Debug)]
pub struct DocumentSource {
    pub id: String,
    pub bytes: Vec<u8>,
}

impl DocumentSource {
    pub fn read(path: &Path) -> Result<Self, PipelineError> {
        let id = path.display().to_string();
        let bytes = std::fs::read(path)
            .with_context(|| format!("read input docx: {}", path.display()))
            .map_err(|e| PipelineError::io(&id, Stage::Load, e))?;
        Ok(Self { id, bytes })
    }
}

#[derive(Debug)]
pub struct DocumentResult {
    pub id: String,
    pub report: DocumentReport,
    /// Rewritten package, replace mode only.
    pub output: Option<Vec<u8>>,
    pub stats: Option<RewriteStats>,
}

pub type DocumentOutcome = Result<DocumentResult, PipelineError>;

struct Prepared {
    id: String,
    sha256: String,
    package: DocxPackage,
    document: Document,
    flat: FlattenedDocument,
    chunks: Vec<Chunk>,
}

/// A chunk waiting for detection.
struct Request<'a> {
    doc: usize,
    offset: usize,
    /// Length of `text` in chars.
    len: usize,
    text: &'a str,
}

/// Runs documents through extract, detect, resolve and (in replace mode) rewrite.
///
/// Extraction and rewriting run on a rayon pool. Detection is sequential and batched
/// across documents. A failure in one document is reported for that document only.
pub struct Pipeline<'a> {
    detector: &'a dyn EntityDetector,
    generator: &'a dyn ValueGenerator,
    cfg: &'a PipelineConfig,
    progress: &'a ConsoleProgress,
    pool: Option<rayon::ThreadPool>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        detector: &'a dyn EntityDetector,
        generator: &'a dyn ValueGenerator,
        cfg: &'a PipelineConfig,
        progress: &'a ConsoleProgress,
    ) -> anyhow::Result<Self> {
        let pool = if cfg.jobs > 0 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(cfg.jobs)
                    .build()
                    .context("build worker pool")?,
            )
        } else {
            None
        };
        Ok(Self {
            detector,
            generator,
            cfg,
            progress,
            pool,
        })
    }

    pub fn run_paths(&self, paths: &[PathBuf]) -> Vec<DocumentOutcome> {
        let inputs = paths.iter().map(|p| DocumentSource::read(p)).collect();
        self.run_inputs(inputs)
    }

    /// Outcomes are returned in input order.
    pub fn run(&self, sources: Vec<DocumentSource>) -> Vec<DocumentOutcome> {
        self.run_inputs(sources.into_iter().map(Ok).collect())
    }

    fn run_inputs(&self, inputs: Vec<Result<DocumentSource, PipelineError>>) -> Vec<DocumentOutcome> {
        let total = inputs.len();
        self.progress.reset();
        self.progress.info(format!(
            "{} {} document(s) with detector {} (threshold {}, {} label(s))",
            match self.cfg.command {
                Command::Detect => "scanning",
                Command::Replace => "anonymizing",
            },
            total,
            self.detector.name(),
            self.cfg.threshold,
            self.cfg.labels.len()
        ));
        if let Some(path) = &self.cfg.config_path {
            self.progress.info(format!("config: {}", path.display()));
        }

        let max_chunk = self.cfg.detector.max_chunk_chars;
        let prepared: Vec<Result<Prepared, PipelineError>> = self.install(|| {
            inputs
                .into_par_iter()
                .map(|input| input.and_then(|src| prepare(src, max_chunk)))
                .collect()
        });

        let spans = self.detect_all(&prepared);

        self.install(|| {
            prepared
                .into_par_iter()
                .zip(spans.into_par_iter())
                .map(|(prep, spans)| {
                    let prep = prep?;
                    let spans = spans.map_err(|e| PipelineError::new(&prep.id, Stage::Detect, e))?;
                    let outcome = self.finish(prep, spans);
                    if let Ok(done) = &outcome {
                        self.progress.document_done(&done.id, total);
                    }
                    outcome
                })
                .collect()
        })
    }

    fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    /// Spans per document, shifted to buffer offsets. Documents that failed to
    /// prepare get an empty list and are never sent.
    fn detect_all(
        &self,
        prepared: &[Result<Prepared, PipelineError>],
    ) -> Vec<Result<Shifted, DetectionError>> {
        let mut results: Vec<Result<Shifted, DetectionError>> =
            prepared.iter().map(|_| Ok(Shifted::default())).collect();

        let requests: Vec<Request<'_>> = prepared
            .iter()
            .enumerate()
            .filter_map(|(doc, p)| p.as_ref().ok().map(|p| (doc, p)))
            .flat_map(|(doc, p)| {
                p.chunks.iter().map(move |c| Request {
                    doc,
                    offset: c.offset,
                    len: c.text.chars().count(),
                    text: &c.text,
                })
            })
            .collect();
        if requests.is_empty() {
            return results;
        }

        let batch_size = self.cfg.detector.batch_size.max(1);
        let mut sent = 0;
        let mut pending: Vec<&Request<'_>> = Vec::with_capacity(batch_size);
        for req in &requests {
            if results[req.doc].is_err() {
                continue;
            }
            pending.push(req);
            if pending.len() == batch_size {
                sent += pending.len();
                self.send_batch(&pending, &mut results);
                pending.clear();
                self.progress.progress("detect", sent, requests.len());
            }
        }
        if !pending.is_empty() {
            sent += pending.len();
            self.send_batch(&pending, &mut results);
            self.progress.progress("detect", sent, requests.len());
        }
        results
    }

    fn send_batch(
        &self,
        batch: &[&Request<'_>],
        results: &mut [Result<Shifted, DetectionError>],
    ) {
        let texts: Vec<&str> = batch.iter().map(|r| r.text).collect();
        let err = match self.call_detector(&texts) {
            Ok(found) => {
                for (req, spans) in batch.iter().zip(found) {
                    push_spans(&mut results[req.doc], spans, req);
                }
                return;
            }
            Err(err) => err,
        };

        log::warn!(
            "detector batch of {} text(s) failed: {err}; retrying per document",
            batch.len()
        );
        std::thread::sleep(self.cfg.detector.retry_backoff);

        let mut docs: Vec<usize> = batch.iter().map(|r| r.doc).collect();
        docs.dedup();
        for doc in docs {
            let reqs: Vec<&&Request<'_>> = batch.iter().filter(|r| r.doc == doc).collect();
            let texts: Vec<&str> = reqs.iter().map(|r| r.text).collect();
            match self.call_detector(&texts) {
                Ok(found) => {
                    for (req, spans) in reqs.iter().zip(found) {
                        push_spans(&mut results[doc], spans, req);
                    }
                }
                Err(err) => {
                    log::error!("detector failed twice for document #{doc}: {err}");
                    results[doc] = Err(err);
                }
            }
        }
    }

    fn call_detector(&self, texts: &[&str]) -> Result<Vec<Vec<Span>>, DetectionError> {
        let found = self
            .detector
            .detect_batch(texts, &self.cfg.labels, self.cfg.threshold)?;
        if found.len() != texts.len() {
            return Err(DetectionError::BatchShape {
                expected: texts.len(),
                got: found.len(),
            });
        }
        Ok(found)
    }

    fn finish(&self, prep: Prepared, detected: Shifted) -> DocumentOutcome {
        let Prepared {
            id,
            sha256,
            package,
            mut document,
            flat,
            ..
        } = prep;

        let resolution = resolve(&flat, detected.spans, &self.cfg.labels, self.cfg.threshold);
        let dropped = resolution.dropped + detected.dropped;
        let located = annotate(&flat, &resolution.entities);

        if self.cfg.command == Command::Detect {
            let report =
                DocumentReport::build(&id, &sha256, &flat, located, dropped, None);
            return Ok(DocumentResult {
                id,
                report,
                output: None,
                stats: None,
            });
        }

        let seed = document_seed(self.cfg.seed, &sha256);
        let mut provider = ReplacementProvider::new(self.generator, seed, self.cfg.preserve_case);
        let mut values = Vec::with_capacity(resolution.entities.len());
        let stats = rewrite(&mut document, &flat, &resolution.entities, &mut |e| {
            let v = provider.value_for(e);
            values.push(v.clone());
            v
        });
        log::debug!(
            "{id}: {} entities, {} runs split, {} runs removed, {} distinct values",
            stats.entities,
            stats.runs_split,
            stats.runs_removed,
            provider.map().len()
        );

        let changed = document
            .changed_parts()
            .map_err(|e| PipelineError::io(&id, Stage::Rewrite, e))?;
        let output = package
            .to_bytes_with_replacements(&changed)
            .map_err(|e| PipelineError::io(&id, Stage::Rewrite, e))?;

        let report = DocumentReport::build(
            &id,
            &sha256,
            &flat,
            located,
            dropped,
            Some(values),
        );
        Ok(DocumentResult {
            id,
            report,
            output: Some(output),
            stats: Some(stats),
        })
    }
}

fn push_spans(slot: &mut Result<Shifted, DetectionError>, spans: Vec<Span>, req: &Request<'_>) {
    if let Ok(all) = slot {
        let shifted = shift_spans(spans, req.offset, req.len);
        all.spans.extend(shifted.spans);
        all.dropped += shifted.dropped;
    }
}

fn prepare(src: DocumentSource, max_chunk_chars: usize) -> Result<Prepared, PipelineError> {
    let DocumentSource { id, bytes } = src;
    let sha256 = hex::encode(Sha256::digest(&bytes));
    let package = DocxPackage::from_bytes(bytes)
        .map_err(|e| PipelineError::io(&id, Stage::Load, e))?;
    let document =
        Document::from_package(&package).map_err(|e| PipelineError::new(&id, Stage::Extract, e))?;
    let flat = extract(&document).map_err(|e| PipelineError::new(&id, Stage::Extract, e))?;
    let chunks = chunk_document(&flat, max_chunk_chars);
    log::debug!(
        "{id}: {} parts, {} segments, {} chars, {} chunk(s)",
        document.parts.len(),
        flat.segments.len(),
        flat.len(),
        chunks.len()
    );
    Ok(Prepared {
        id,
        sha256,
        package,
        document,
        flat,
        chunks,
    })
}
