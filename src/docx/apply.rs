use serde::Serialize;

use crate::docx::model::{Document, Run};
use crate::ir::{Entity, FlattenedDocument, StructuralLocation};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RewriteStats {
    pub entities: usize,
    /// Runs replaced by two or more fragments.
    pub runs_split: usize,
    /// Runs whose whole text was covered by an entity that started in an earlier run.
    pub runs_removed: usize,
}

/// Replaces every entity's text in `doc`. The replacement lands in the first run the
/// entity touches; the covered text of later runs is removed. Text before and after
/// the entity inside a touched run is kept as separate fragments with the run's
/// formatting. `flat` must have been extracted from `doc` as it is now.
pub fn rewrite(
    doc: &mut Document,
    flat: &FlattenedDocument,
    entities: &[Entity],
    value_for: &mut dyn FnMut(&Entity) -> String,
) -> RewriteStats {
    let values: Vec<String> = entities.iter().map(|e| value_for(e)).collect();

    let mut order: Vec<usize> = (0..entities.len()).collect();
    order.sort_by(|a, b| entities[*b].start.cmp(&entities[*a].start));

    let mut stats = RewriteStats::default();
    for idx in order {
        let entity = &entities[idx];
        let range = flat.segments_overlapping(entity.start, entity.end);
        let first_run = range.clone().find(|i| !flat.segments[*i].is_boundary());
        let Some(first_run) = first_run else {
            continue;
        };
        for seg_idx in range.rev() {
            let seg = &flat.segments[seg_idx];
            if seg.is_boundary() {
                continue;
            }
            let a = entity.start.max(seg.start) - seg.start;
            let b = entity.end.min(seg.end) - seg.start;
            let value = (seg_idx == first_run).then(|| values[idx].as_str());
            if !replace_in_run(doc, &seg.location, a, b, value, &mut stats) {
                log::warn!(
                    "entity {}..{} ({}) points at a missing run: part {} paragraph {} run {}",
                    entity.start,
                    entity.end,
                    entity.label,
                    seg.location.part,
                    seg.location.paragraph,
                    seg.location.run
                );
            }
        }
        stats.entities += 1;
    }
    stats
}

fn replace_in_run(
    doc: &mut Document,
    loc: &StructuralLocation,
    a: usize,
    b: usize,
    value: Option<&str>,
    stats: &mut RewriteStats,
) -> bool {
    let Some(para) = doc
        .parts
        .get_mut(loc.part)
        .and_then(|p| p.paragraphs.get_mut(loc.paragraph))
    else {
        return false;
    };
    let Some(run) = para.runs.get(loc.run) else {
        return false;
    };

    let fragments = split_run(run, a, b, value);
    match fragments.len() {
        0 => stats.runs_removed += 1,
        1 => {}
        _ => stats.runs_split += 1,
    }
    para.runs.splice(loc.run..=loc.run, fragments);
    true
}

/// Fragments replacing `run` when chars `a..b` of it are covered.
fn split_run(run: &Run, a: usize, b: usize, value: Option<&str>) -> Vec<Run> {
    let text = run.text();
    let byte_at = |n: usize| text.char_indices().nth(n).map_or(text.len(), |(i, _)| i);
    let (pre, post) = (&text[..byte_at(a)], &text[byte_at(b)..]);

    let mut out = Vec::with_capacity(3);
    if !pre.is_empty() {
        out.push(run.fragment(pre));
    }
    if let Some(v) = value.filter(|v| !v.is_empty()) {
        out.push(run.fragment(v));
    }
    if !post.is_empty() {
        out.push(run.fragment(post));
    }
    out
}

/// An entity together with where it starts in the document.
#[derive(Clone, Debug, Serialize)]
pub struct LocatedEntity {
    #[serde(flatten)]
    pub entity: Entity,
    pub location: StructuralLocation,
}

/// Report-only counterpart of [`rewrite`]: resolves each entity's start location.
pub fn annotate(flat: &FlattenedDocument, entities: &[Entity]) -> Vec<LocatedEntity> {
    entities
        .iter()
        .filter_map(|e| match flat.location_at(e.start) {
            Some(location) => Some(LocatedEntity {
                entity: e.clone(),
                location,
            }),
            None => {
                log::warn!("entity {}..{} ({}) is outside the buffer", e.start, e.end, e.label);
                None
            }
        })
        .collect()
}
