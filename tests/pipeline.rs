use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use docx_pii::config::AppConfig;
use docx_pii::docx::extract::extract;
use docx_pii::docx::model::Document;
use docx_pii::docx::package::{DocxPackage, MAIN_DOCUMENT_PART};
use docx_pii::error::{DetectionError, Stage};
use docx_pii::ir::Span;
use docx_pii::labels::{LabelSelection, LabelSet};
use docx_pii::models::EntityDetector;
use docx_pii::pipeline::{
    Command, DetectorKind, DocumentOutcome, DocumentSource, Overrides, Pipeline, PipelineConfig,
};
use docx_pii::progress::ConsoleProgress;
use docx_pii::synthetic::{PlaceholderGenerator, SyntheticGenerator};

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

/// Reports every occurrence of fixed strings. Fails any batch containing `POISON`.
struct NeedleDetector {
    needles: Vec<(&'static str, &'static str)>,
    calls: AtomicUsize,
}

impl NeedleDetector {
    fn new(needles: &[(&'static str, &'static str)]) -> Self {
        Self {
            needles: needles.to_vec(),
            calls: AtomicUsize::new(0),
        }
    }
}

impl EntityDetector for NeedleDetector {
    fn name(&self) -> &str {
        "needle"
    }

    fn detect(&self, text: &str, _: &LabelSet, _: f32) -> Result<Vec<Span>, DetectionError> {
        let mut out = Vec::new();
        for (needle, label) in &self.needles {
            for (byte, _) in text.match_indices(needle) {
                let start = text[..byte].chars().count();
                out.push(Span::new(start, start + needle.chars().count(), *label, 0.9));
            }
        }
        Ok(out)
    }

    fn detect_batch(
        &self,
        texts: &[&str],
        labels: &LabelSet,
        threshold: f32,
    ) -> Result<Vec<Vec<Span>>, DetectionError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if texts.iter().any(|t| t.contains("POISON")) {
            return Err(DetectionError::Request("connection reset".into()));
        }
        texts
            .iter()
            .map(|t| self.detect(t, labels, threshold))
            .collect()
    }
}

/// Claims every text as one name running five chars past its end.
struct OverrunDetector;

impl EntityDetector for OverrunDetector {
    fn name(&self) -> &str {
        "overrun"
    }

    fn detect(&self, text: &str, _: &LabelSet, _: f32) -> Result<Vec<Span>, DetectionError> {
        Ok(vec![Span::new(0, text.chars().count() + 5, "name", 0.9)])
    }
}

fn body_xml(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="{W_NS}"><w:body>{body}<w:sectPr/></w:body></w:document>"#
    )
}

fn header_xml(body: &str) -> String {
    format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:hdr xmlns:w="{W_NS}">{body}</w:hdr>"#)
}

fn p(text: &str) -> String {
    format!(r#"<w:p><w:r><w:t xml:space="preserve">{text}</w:t></w:r></w:p>"#)
}

fn docx(files: &[(&str, String)]) -> Vec<u8> {
    let mut w = ZipWriter::new(Cursor::new(Vec::new()));
    w.start_file("[Content_Types].xml", SimpleFileOptions::default())
        .expect("start");
    w.write_all(b"<Types/>").expect("write");
    for (name, body) in files {
        w.start_file(*name, SimpleFileOptions::default()).expect("start");
        w.write_all(body.as_bytes()).expect("write");
    }
    w.finish().expect("finish").into_inner()
}

fn source(id: &str, bytes: Vec<u8>) -> DocumentSource {
    DocumentSource {
        id: id.to_string(),
        bytes,
    }
}

fn config(command: Command, batch_size: usize) -> PipelineConfig {
    let labels = LabelSelection::All.resolve().expect("labels");
    let o = Overrides {
        detector: Some(DetectorKind::Pattern),
        batch_size: Some(batch_size),
        jobs: Some(2),
        seed: Some(7),
        ..Overrides::default()
    };
    let mut cfg = PipelineConfig::resolve(&AppConfig::default(), command, labels, &o).expect("cfg");
    cfg.detector.retry_backoff = Duration::ZERO;
    cfg
}

fn placeholder_config() -> PipelineConfig {
    let mut cfg = config(Command::Replace, 8);
    cfg.replace_mode = docx_pii::pipeline::ReplaceMode::Placeholder;
    cfg
}

fn output_text(outcome: &DocumentOutcome) -> String {
    let result = outcome.as_ref().expect("document succeeded");
    let bytes = result.output.clone().expect("rewritten package");
    let pkg = DocxPackage::from_bytes(bytes).expect("reread package");
    let doc = Document::from_package(&pkg).expect("reparse");
    extract(&doc).expect("extract").text
}

#[test]
fn nothing_detected_keeps_every_part_byte_identical() {
    let input = docx(&[
        (MAIN_DOCUMENT_PART, body_xml(&format!("{}{}", p("Quarterly report"), p("No secrets")))),
        ("word/header1.xml", header_xml(&p("ACME Corp"))),
    ]);
    let detector = NeedleDetector::new(&[]);
    let cfg = config(Command::Replace, 8);
    let progress = ConsoleProgress::new(false);
    let pipeline = Pipeline::new(&detector, &SyntheticGenerator, &cfg, &progress).expect("pipeline");

    let outcomes = pipeline.run(vec![source("plain.docx", input.clone())]);
    let result = outcomes[0].as_ref().expect("ok");
    assert!(result.report.entities.is_empty());
    assert_eq!(result.stats.map(|s| s.entities), Some(0));

    let before = DocxPackage::from_bytes(input).expect("input");
    let after = DocxPackage::from_bytes(result.output.clone().expect("output")).expect("output");
    let names: Vec<&str> = after.entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["[Content_Types].xml", MAIN_DOCUMENT_PART, "word/header1.xml"]);
    for (a, b) in before.entries.iter().zip(&after.entries) {
        assert_eq!(a.data, b.data, "{} changed", a.name);
    }
}

#[test]
fn repeated_phone_number_gets_one_placeholder() {
    let input = docx(&[(
        MAIN_DOCUMENT_PART,
        body_xml(&p("Call 415-555-1234 or 415-555-1234 again")),
    )]);
    let detector = NeedleDetector::new(&[("415-555-1234", "phone number")]);
    let cfg = placeholder_config();
    let progress = ConsoleProgress::new(false);
    let pipeline = Pipeline::new(&detector, &PlaceholderGenerator, &cfg, &progress).expect("pipeline");

    let outcomes = pipeline.run(vec![source("call.docx", input)]);
    assert_eq!(
        output_text(&outcomes[0]),
        "Call [REDACTED:phone number] or [REDACTED:phone number] again"
    );
}

#[test]
fn synthetic_values_are_consistent_within_a_document() {
    let input = docx(&[(
        MAIN_DOCUMENT_PART,
        body_xml(&format!("{}{}", p("Jane Roe signed."), p("Witness: Jane Roe"))),
    )]);
    let detector = NeedleDetector::new(&[("Jane Roe", "name")]);
    let cfg = config(Command::Replace, 8);
    let progress = ConsoleProgress::new(false);
    let pipeline = Pipeline::new(&detector, &SyntheticGenerator, &cfg, &progress).expect("pipeline");

    let first = pipeline.run(vec![source("a.docx", input.clone())]);
    let second = pipeline.run(vec![source("a.docx", input)]);
    let report = &first[0].as_ref().expect("ok").report;
    assert_eq!(report.entities.len(), 2);
    let values: Vec<&str> = report
        .entities
        .iter()
        .map(|e| e.replacement.as_deref().expect("replacement"))
        .collect();
    assert_eq!(values[0], values[1]);
    assert_ne!(values[0], "Jane Roe");

    let text = output_text(&first[0]);
    assert!(!text.contains("Jane Roe"));
    assert_eq!(text, output_text(&second[0]), "same seed, same output");
}

#[test]
fn headers_and_nested_tables_are_rewritten() {
    let inner = format!(
        "<w:tbl><w:tr><w:tc>{}</w:tc></w:tr></w:tbl>",
        p("Contact jane@example.com")
    );
    let outer = format!("<w:tbl><w:tr><w:tc>{}{inner}</w:tc></w:tr></w:tbl>", p("Outer"));
    let input = docx(&[
        (MAIN_DOCUMENT_PART, body_xml(&format!("{}{outer}", p("Intro")))),
        ("word/header1.xml", header_xml(&p("Prepared for jane@example.com"))),
    ]);
    let detector = NeedleDetector::new(&[("jane@example.com", "email address")]);
    let cfg = placeholder_config();
    let progress = ConsoleProgress::new(false);
    let pipeline = Pipeline::new(&detector, &PlaceholderGenerator, &cfg, &progress).expect("pipeline");

    let outcomes = pipeline.run(vec![source("nested.docx", input)]);
    let report = &outcomes[0].as_ref().expect("ok").report;
    let containers: Vec<&str> = report.entities.iter().map(|e| e.container.as_str()).collect();
    assert_eq!(containers, vec!["table_cell", "header"]);
    assert_eq!(report.entities[0].location.cells.len(), 2);

    assert_eq!(
        output_text(&outcomes[0]),
        "Intro\nOuter\nContact [REDACTED:email address]\nPrepared for [REDACTED:email address]"
    );
}

#[test]
fn entity_split_across_runs_keeps_first_run_formatting() {
    let body = r#"<w:p><w:r><w:rPr><w:b/></w:rPr><w:t>Patient Jane</w:t></w:r><w:r><w:rPr><w:i/></w:rPr><w:t xml:space="preserve"> Roe, 54</w:t></w:r></w:p>"#;
    let input = docx(&[(MAIN_DOCUMENT_PART, body_xml(body))]);
    let detector = NeedleDetector::new(&[("Jane Roe", "name")]);
    let cfg = placeholder_config();
    let progress = ConsoleProgress::new(false);
    let pipeline = Pipeline::new(&detector, &PlaceholderGenerator, &cfg, &progress).expect("pipeline");

    let outcomes = pipeline.run(vec![source("runs.docx", input)]);
    let bytes = outcomes[0].as_ref().expect("ok").output.clone().expect("output");
    let pkg = DocxPackage::from_bytes(bytes).expect("reread");
    let doc = Document::from_package(&pkg).expect("reparse");
    let runs = &doc.parts[0].paragraphs[0].runs;
    let texts: Vec<&str> = runs.iter().map(|r| r.text()).collect();
    assert_eq!(texts, vec!["Patient ", "[REDACTED:name]", ", 54"]);
    assert_eq!(runs[1].format.bold, Some(true));
    assert_eq!(runs[2].format.italic, Some(true));
}

#[test]
fn batch_size_does_not_change_results() {
    let paragraphs: String = (0..6)
        .map(|i| p(&format!("Row {i}: call 415-555-000{i} or mail user{i}@example.com")))
        .collect();
    let inputs = || {
        vec![
            source("one.docx", docx(&[(MAIN_DOCUMENT_PART, body_xml(&paragraphs))])),
            source("two.docx", docx(&[(MAIN_DOCUMENT_PART, body_xml(&p("Only 415-555-0009")))])),
        ]
    };
    let detector = docx_pii::models::pattern::PatternDetector;
    let progress = ConsoleProgress::new(false);

    let run_with = |batch: usize, chunk: usize| {
        let mut cfg = config(Command::Detect, batch);
        cfg.detector.max_chunk_chars = chunk;
        let pipeline =
            Pipeline::new(&detector, &PlaceholderGenerator, &cfg, &progress).expect("pipeline");
        pipeline
            .run(inputs())
            .into_iter()
            .map(|o| {
                o.expect("ok")
                    .report
                    .entities
                    .into_iter()
                    .map(|e| (e.label, e.start, e.end, e.text))
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>()
    };

    let whole = run_with(8, 0);
    assert_eq!(whole[0].len(), 12);
    assert_eq!(whole[1].len(), 1);
    assert_eq!(run_with(1, 60), whole);
    assert_eq!(run_with(3, 60), whole);
}

#[test]
fn one_failing_document_does_not_affect_others() {
    let good = docx(&[(MAIN_DOCUMENT_PART, body_xml(&p("SSN 123-45-6789")))]);
    let poisoned = docx(&[(MAIN_DOCUMENT_PART, body_xml(&p("POISON 123-45-6789")))]);
    let broken_xml = docx(&[(
        MAIN_DOCUMENT_PART,
        format!(r#"<w:document xmlns:w="{W_NS}"><w:body><w:p></w:body></w:document>"#),
    )]);
    let not_a_zip = b"plain text, not a package".to_vec();

    let detector = NeedleDetector::new(&[("123-45-6789", "ssn")]);
    let cfg = placeholder_config();
    let progress = ConsoleProgress::new(false);
    let pipeline = Pipeline::new(&detector, &PlaceholderGenerator, &cfg, &progress).expect("pipeline");

    let outcomes = pipeline.run(vec![
        source("good.docx", good),
        source("poisoned.docx", poisoned),
        source("broken.docx", broken_xml),
        source("notzip.docx", not_a_zip),
    ]);

    assert_eq!(output_text(&outcomes[0]), "SSN [REDACTED:ssn]");
    let stages: Vec<(String, Stage)> = outcomes[1..]
        .iter()
        .map(|o| {
            let err = o.as_ref().expect_err("should fail");
            (err.document.clone(), err.stage)
        })
        .collect();
    assert_eq!(
        stages,
        vec![
            ("poisoned.docx".to_string(), Stage::Detect),
            ("broken.docx".to_string(), Stage::Extract),
            ("notzip.docx".to_string(), Stage::Load),
        ]
    );
    // one shared batch, then one retry per document in it
    assert_eq!(detector.calls.load(Ordering::Relaxed), 3);
}

#[test]
fn unreadable_path_fails_at_load() {
    let detector = NeedleDetector::new(&[]);
    let cfg = config(Command::Detect, 8);
    let progress = ConsoleProgress::new(false);
    let pipeline = Pipeline::new(&detector, &PlaceholderGenerator, &cfg, &progress).expect("pipeline");

    let dir = tempfile::tempdir().expect("tempdir");
    let ok_path = dir.path().join("ok.docx");
    std::fs::write(&ok_path, docx(&[(MAIN_DOCUMENT_PART, body_xml(&p("hello")))])).expect("write");
    let missing: PathBuf = dir.path().join("missing.docx");

    let outcomes = pipeline.run_paths(&[ok_path, missing]);
    assert!(outcomes[0].as_ref().is_ok_and(|r| r.output.is_none()));
    let err = outcomes[1].as_ref().expect_err("missing file");
    assert_eq!(err.stage, Stage::Load);
    assert!(err.to_string().contains("missing.docx: load failed"));
}

#[test]
fn spans_overrunning_their_chunk_are_dropped() {
    let input = docx(&[(
        MAIN_DOCUMENT_PART,
        body_xml(&format!("{}{}", p("aaaa"), p("KEEP-THIS-TEXT"))),
    )]);
    let mut cfg = placeholder_config();
    cfg.detector.max_chunk_chars = 5;
    let progress = ConsoleProgress::new(false);
    let pipeline =
        Pipeline::new(&OverrunDetector, &PlaceholderGenerator, &cfg, &progress).expect("pipeline");

    let outcomes = pipeline.run(vec![source("overrun.docx", input)]);
    let report = &outcomes[0].as_ref().expect("ok").report;
    assert!(report.entities.is_empty());
    assert_eq!(report.dropped_spans, 2);
    assert_eq!(output_text(&outcomes[0]), "aaaa\nKEEP-THIS-TEXT");
}
