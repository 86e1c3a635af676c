use std::cmp::Ordering;

use crate::error::ResolverInvariantError;
use crate::ir::{Entity, FlattenedDocument, Span};
use crate::labels::{priority_rank, LabelSet};

#[derive(Clone, Debug, Default)]
pub struct Resolution {
    /// Non-overlapping, sorted by `start`.
    pub entities: Vec<Entity>,
    /// Spans rejected for violating the buffer bounds.
    pub dropped: usize,
}

/// Turns raw detector output into a deterministic, non-overlapping entity list.
///
/// Spans outside the buffer are dropped with a warning. Spans under `threshold`,
/// with a non-finite score or with a label outside `labels` are ignored. Spans
/// crossing a paragraph break are cut into per-paragraph pieces. The rest are
/// sorted by start, longest first, then by score and label priority, and swept
/// left to right keeping each span that starts at or after the last kept end.
pub fn resolve(
    flat: &FlattenedDocument,
    spans: Vec<Span>,
    labels: &LabelSet,
    threshold: f32,
) -> Resolution {
    let mut dropped = 0;
    let mut candidates = Vec::with_capacity(spans.len());
    for span in spans {
        if let Err(err) = check_bounds(&span, flat.len()) {
            log::warn!("dropping detector span: {err}");
            dropped += 1;
            continue;
        }
        if !span.score.is_finite() || span.score < threshold || !labels.contains(&span.label) {
            log::debug!(
                "ignoring span {}..{} {} score={}",
                span.start,
                span.end,
                span.label,
                span.score
            );
            continue;
        }
        candidates.push(span);
    }

    let boundaries: Vec<usize> = flat.boundaries().collect();
    let mut pieces = split_at_boundaries(candidates, &boundaries);
    pieces.retain(|s| !flat.slice(s.start, s.end).trim().is_empty());
    pieces.sort_by(compare_spans);

    let mut entities: Vec<Entity> = Vec::new();
    let mut last_end = 0;
    for span in pieces {
        if span.start < last_end {
            continue;
        }
        last_end = span.end;
        entities.push(Entity {
            text: flat.slice(span.start, span.end).to_string(),
            start: span.start,
            end: span.end,
            label: span.label,
            score: span.score,
        });
    }

    Resolution { entities, dropped }
}

fn check_bounds(span: &Span, len: usize) -> Result<(), ResolverInvariantError> {
    if span.start < span.end && span.end <= len {
        return Ok(());
    }
    Err(ResolverInvariantError {
        start: span.start,
        end: span.end,
        label: span.label.clone(),
        len,
    })
}

/// `boundaries` must be ascending. The boundary chars themselves are never covered.
fn split_at_boundaries(spans: Vec<Span>, boundaries: &[usize]) -> Vec<Span> {
    let mut out = Vec::with_capacity(spans.len());
    for span in spans {
        let first = boundaries.partition_point(|b| *b < span.start);
        let crossing = boundaries[first..]
            .iter()
            .take_while(|b| **b < span.end)
            .copied();
        let mut cur = span.start;
        for b in crossing {
            if b > cur {
                out.push(Span::new(cur, b, span.label.clone(), span.score));
            }
            cur = b + 1;
        }
        if cur < span.end {
            out.push(Span { start: cur, ..span });
        }
    }
    out
}

fn compare_spans(a: &Span, b: &Span) -> Ordering {
    a.start
        .cmp(&b.start)
        .then_with(|| b.end.cmp(&a.end))
        .then_with(|| b.score.total_cmp(&a.score))
        .then_with(|| priority_rank(&a.label).cmp(&priority_rank(&b.label)))
        .then_with(|| a.label.cmp(&b.label))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::model::RunFormat;
    use crate::ir::{ContainerKind, SegmentKind, StructuralLocation, TextSegment};
    use crate::labels::LabelSelection;

    fn flat(paragraphs: &[&str]) -> FlattenedDocument {
        let mut text = String::new();
        let mut segments = Vec::new();
        let mut pos = 0;
        for (i, p) in paragraphs.iter().enumerate() {
            let location = StructuralLocation {
                part: 0,
                container: ContainerKind::Body,
                paragraph: i,
                cells: Vec::new(),
                paragraph_in_container: i,
                run: 0,
                offset: 0,
            };
            if i > 0 {
                text.push('\n');
                segments.push(TextSegment {
                    start: pos,
                    end: pos + 1,
                    location: location.clone(),
                    kind: SegmentKind::ParagraphBreak,
                });
                pos += 1;
            }
            let n = p.chars().count();
            text.push_str(p);
            segments.push(TextSegment {
                start: pos,
                end: pos + n,
                location,
                kind: SegmentKind::Run(RunFormat::default()),
            });
            pos += n;
        }
        FlattenedDocument::new(text, segments)
    }

    fn all() -> LabelSet {
        LabelSelection::All.resolve().expect("labels")
    }

    fn bounds(r: &Resolution) -> Vec<(usize, usize, &str)> {
        r.entities
            .iter()
            .map(|e| (e.start, e.end, e.label.as_str()))
            .collect()
    }

    #[test]
    fn longer_span_wins_over_higher_scored_prefix() {
        let doc = flat(&["Acme Health Partners LLC"]);
        let r = resolve(
            &doc,
            vec![
                Span::new(0, 10, "name", 0.9),
                Span::new(0, 15, "organization", 0.6),
            ],
            &all(),
            0.3,
        );
        assert_eq!(bounds(&r), vec![(0, 15, "organization")]);
        assert_eq!(r.entities[0].text, "Acme Health Par");
    }

    #[test]
    fn identical_bounds_pick_score_then_priority() {
        let doc = flat(&["4111 1111 1111 1111"]);
        let r = resolve(
            &doc,
            vec![
                Span::new(0, 19, "number", 0.8),
                Span::new(0, 19, "credit card", 0.8),
                Span::new(0, 19, "account number", 0.7),
            ],
            &all(),
            0.3,
        );
        assert_eq!(bounds(&r), vec![(0, 19, "credit card")]);
    }

    #[test]
    fn result_is_non_overlapping_and_order_independent() {
        let doc = flat(&["John Smith called 415-555-1234 from Boston"]);
        let spans = vec![
            Span::new(0, 10, "name", 0.95),
            Span::new(5, 10, "name family", 0.7),
            Span::new(18, 30, "phone number", 0.9),
            Span::new(25, 36, "number", 0.4),
            Span::new(36, 42, "location city", 0.8),
        ];
        let forward = resolve(&doc, spans.clone(), &all(), 0.3);
        let mut reversed = spans;
        reversed.reverse();
        let backward = resolve(&doc, reversed, &all(), 0.3);

        assert_eq!(forward.entities, backward.entities);
        for w in forward.entities.windows(2) {
            assert!(w[0].end <= w[1].start);
        }
        assert_eq!(
            bounds(&forward),
            vec![(0, 10, "name"), (18, 30, "phone number"), (36, 42, "location city")]
        );
    }

    #[test]
    fn out_of_range_spans_are_counted_and_dropped() {
        let doc = flat(&["short"]);
        let r = resolve(
            &doc,
            vec![
                Span::new(0, 99, "name", 0.9),
                Span::new(3, 3, "name", 0.9),
                Span::new(0, 5, "name", 0.9),
            ],
            &all(),
            0.3,
        );
        assert_eq!(r.dropped, 2);
        assert_eq!(bounds(&r), vec![(0, 5, "name")]);
    }

    #[test]
    fn threshold_label_set_and_nan_filter() {
        let doc = flat(&["Jane lives in Ohio"]);
        let labels = LabelSelection::Explicit(vec!["name".into()])
            .resolve()
            .expect("labels");
        let r = resolve(
            &doc,
            vec![
                Span::new(0, 4, "name", f32::NAN),
                Span::new(0, 4, "name", 0.2),
                Span::new(14, 18, "location state", 0.9),
            ],
            &labels,
            0.5,
        );
        assert!(r.entities.is_empty());
        assert_eq!(r.dropped, 0);
    }

    #[test]
    fn spans_crossing_paragraphs_are_split() {
        let doc = flat(&["Dr. Gregory", "House", "   "]);
        // "Dr. Gregory" 0..11, break 11, "House" 12..17, break 17, "   " 18..21
        let r = resolve(&doc, vec![Span::new(4, 21, "name", 0.8)], &all(), 0.3);
        assert_eq!(bounds(&r), vec![(4, 11, "name"), (12, 17, "name")]);
        assert!(r.entities.iter().all(|e| !e.text.contains('\n')));
    }
}
