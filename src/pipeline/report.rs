use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;

use clap::ValueEnum;
use serde::Serialize;

use crate::docx::apply::LocatedEntity;
use crate::error::PipelineError;
use crate::ir::{ContainerKind, FlattenedDocument, StructuralLocation};

const SUMMARY_VALUES_PER_LABEL: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Counts per label with a few example values.
    Text,
    Json,
    /// Paragraphs containing entities, with entities masked.
    Redacted,
}

#[derive(Clone, Debug, Serialize)]
pub struct EntityRecord {
    pub text: String,
    pub label: String,
    pub start: usize,
    pub end: usize,
    pub score: f32,
    pub location: StructuralLocation,
    pub container: ContainerKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct Summary {
    pub total: usize,
    /// Every entity text per label, in document order.
    pub by_label: BTreeMap<String, Vec<String>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RedactedParagraph {
    pub container: ContainerKind,
    pub text: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct DocumentReport {
    pub document: String,
    pub sha256: String,
    pub total_segments: usize,
    pub dropped_spans: usize,
    pub entities: Vec<EntityRecord>,
    pub summary: Summary,
    #[serde(skip)]
    pub redacted: Vec<RedactedParagraph>,
}

impl DocumentReport {
    /// `replacements`, when given, holds one value per entity in the same order.
    pub fn build(
        document: &str,
        sha256: &str,
        flat: &FlattenedDocument,
        located: Vec<LocatedEntity>,
        dropped_spans: usize,
        replacements: Option<Vec<String>>,
    ) -> Self {
        let mut replacements = replacements.map(|v| v.into_iter());
        let mut summary = Summary::default();
        let mut entities = Vec::with_capacity(located.len());
        for le in &located {
            summary.total += 1;
            summary
                .by_label
                .entry(le.entity.label.clone())
                .or_default()
                .push(le.entity.text.clone());
            entities.push(EntityRecord {
                text: le.entity.text.clone(),
                label: le.entity.label.clone(),
                start: le.entity.start,
                end: le.entity.end,
                score: le.entity.score,
                container: le.location.container,
                location: le.location.clone(),
                replacement: replacements.as_mut().and_then(|it| it.next()),
            });
        }
        let redacted = redact_paragraphs(flat, &located);
        Self {
            document: document.to_string(),
            sha256: sha256.to_string(),
            total_segments: flat.segments.len(),
            dropped_spans,
            entities,
            summary,
            redacted,
        }
    }
}

/// `[LABEL_NAME]` as used when printing redacted paragraphs.
pub fn mask(label: &str) -> String {
    format!("[{}]", label.to_uppercase().replace(' ', "_"))
}

fn redact_paragraphs(flat: &FlattenedDocument, located: &[LocatedEntity]) -> Vec<RedactedParagraph> {
    let mut ranges = Vec::new();
    let mut start = 0;
    for b in flat.boundaries() {
        ranges.push((start, b));
        start = b + 1;
    }
    ranges.push((start, flat.len()));

    let mut out = Vec::new();
    let mut i = 0;
    for (p_start, p_end) in ranges {
        let mut text = String::new();
        let mut pos = p_start;
        let mut container = None;
        while i < located.len() && located[i].entity.start < p_end {
            let e = &located[i].entity;
            if e.start >= pos {
                text.push_str(flat.slice(pos, e.start));
                text.push_str(&mask(&e.label));
                pos = e.end.min(p_end);
                container.get_or_insert(located[i].location.container);
            }
            i += 1;
        }
        if let Some(container) = container {
            text.push_str(flat.slice(pos, p_end));
            out.push(RedactedParagraph { container, text });
        }
    }
    out
}

pub fn render(reports: &[DocumentReport], format: ReportFormat) -> anyhow::Result<String> {
    match format {
        ReportFormat::Json => {
            let body = if let [single] = reports {
                serde_json::to_string_pretty(single)?
            } else {
                serde_json::to_string_pretty(reports)?
            };
            Ok(body + "\n")
        }
        ReportFormat::Text => Ok(reports.iter().map(render_summary).collect()),
        ReportFormat::Redacted => Ok(reports.iter().map(render_redacted).collect()),
    }
}

fn rule() -> String {
    "=".repeat(60)
}

fn render_summary(r: &DocumentReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n{}", rule());
    let _ = writeln!(out, "PII DETECTION SUMMARY: {}", r.document);
    let _ = writeln!(out, "{}", rule());
    let _ = writeln!(out, "Total PII instances found: {}", r.summary.total);
    if r.summary.by_label.is_empty() {
        let _ = writeln!(out, "\nNo PII detected with current settings.");
        return out;
    }
    let _ = writeln!(out, "\nPII by type:");
    for (label, instances) in &r.summary.by_label {
        let mut seen = HashSet::new();
        let unique: Vec<&String> = instances.iter().filter(|t| seen.insert(*t)).collect();
        let _ = writeln!(out, "\n{label}: {} instance(s)", instances.len());
        for v in unique.iter().take(SUMMARY_VALUES_PER_LABEL) {
            let _ = writeln!(out, "  - {v}");
        }
        if unique.len() > SUMMARY_VALUES_PER_LABEL {
            let _ = writeln!(
                out,
                "  ... and {} more unique value(s)",
                unique.len() - SUMMARY_VALUES_PER_LABEL
            );
        }
    }
    out
}

fn render_redacted(r: &DocumentReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n{}", rule());
    let _ = writeln!(out, "REDACTED CONTENT: {}", r.document);
    let _ = writeln!(out, "{}", rule());
    for p in &r.redacted {
        let _ = writeln!(out, "\n[{}]", p.container.as_str().to_uppercase());
        let _ = writeln!(out, "{}", p.text);
    }
    out
}

/// One line per failed document, for stderr.
pub fn render_failures(failures: &[PipelineError]) -> String {
    failures.iter().map(|f| format!("error: {f}\n")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::apply::annotate;
    use crate::docx::extract::extract;
    use crate::docx::fixtures::{document, para, run, table};
    use crate::ir::Entity;

    fn entity(flat: &FlattenedDocument, start: usize, end: usize, label: &str) -> Entity {
        Entity {
            start,
            end,
            label: label.into(),
            score: 0.8,
            text: flat.slice(start, end).to_string(),
        }
    }

    fn sample() -> DocumentReport {
        let doc = document(&format!(
            "{}{}{}",
            para(&[run("Patient Jane Roe, DOB 01/02/1980")]),
            para(&[run("No PII here")]),
            table(&[&[para(&[run("Jane Roe")])]])
        ));
        let flat = extract(&doc).expect("extract");
        // "Patient Jane Roe, DOB 01/02/1980" = 0..32, break, "No PII here" 33..44, break, "Jane Roe" 45..53
        let entities = vec![
            entity(&flat, 8, 16, "name"),
            entity(&flat, 22, 32, "dob"),
            entity(&flat, 45, 53, "name"),
        ];
        let located = annotate(&flat, &entities);
        DocumentReport::build(
            "intake.docx",
            "abc",
            &flat,
            located,
            1,
            Some(vec!["Ann Lee".into(), "03/04/1975".into(), "Ann Lee".into()]),
        )
    }

    #[test]
    fn summary_groups_texts_by_label() {
        let r = sample();
        assert_eq!(r.summary.total, 3);
        assert_eq!(r.summary.by_label["name"], vec!["Jane Roe", "Jane Roe"]);
        assert_eq!(r.entities[2].container, ContainerKind::TableCell);
        assert_eq!(r.entities[1].replacement.as_deref(), Some("03/04/1975"));

        let text = render(&[r], ReportFormat::Text).expect("render");
        assert!(text.contains("Total PII instances found: 3"));
        assert!(text.contains("name: 2 instance(s)\n  - Jane Roe\n"));
        assert!(!text.contains("  - Jane Roe\n  - Jane Roe"));
    }

    #[test]
    fn redacted_lists_only_paragraphs_with_entities() {
        let r = sample();
        let texts: Vec<(ContainerKind, &str)> =
            r.redacted.iter().map(|p| (p.container, p.text.as_str())).collect();
        assert_eq!(
            texts,
            vec![
                (ContainerKind::Body, "Patient [NAME], DOB [DOB]"),
                (ContainerKind::TableCell, "[NAME]"),
            ]
        );
        let out = render(&[r], ReportFormat::Redacted).expect("render");
        assert!(out.contains("[TABLE_CELL]\n[NAME]\n"));
    }

    #[test]
    fn json_has_documented_shape() {
        let out = render(&[sample()], ReportFormat::Json).expect("render");
        let v: serde_json::Value = serde_json::from_str(&out).expect("json");
        assert_eq!(v["document"], "intake.docx");
        assert_eq!(v["dropped_spans"], 1);
        assert_eq!(v["entities"][0]["label"], "name");
        assert_eq!(v["entities"][0]["replacement"], "Ann Lee");
        assert_eq!(v["entities"][2]["container"], "table_cell");
        assert_eq!(v["summary"]["total"], 3);
        assert!(v.get("redacted").is_none());
    }

    #[test]
    fn empty_summary_says_so() {
        let doc = document(&para(&[run("nothing")]));
        let flat = extract(&doc).expect("extract");
        let r = DocumentReport::build("a.docx", "x", &flat, Vec::new(), 0, None);
        let text = render(&[r], ReportFormat::Text).expect("render");
        assert!(text.contains("No PII detected"));
    }
}
