use crate::ir::{FlattenedDocument, Span};

/// A piece of the flattened buffer sent to the detector on its own.
#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
    /// Char offset of `text` in the buffer.
    pub offset: usize,
    pub text: String,
}

/// Cuts the buffer at paragraph breaks into chunks of at most `max_chars`. A single
/// paragraph longer than that becomes a chunk by itself. `0` disables chunking.
pub fn chunk_document(flat: &FlattenedDocument, max_chars: usize) -> Vec<Chunk> {
    let len = flat.len();
    if len == 0 {
        return Vec::new();
    }
    if max_chars == 0 || len <= max_chars {
        return vec![Chunk {
            offset: 0,
            text: flat.text.clone(),
        }];
    }

    let mut paragraphs = Vec::new();
    let mut start = 0;
    for b in flat.boundaries() {
        paragraphs.push((start, b));
        start = b + 1;
    }
    paragraphs.push((start, len));

    let mut ranges = Vec::new();
    let mut cur: Option<(usize, usize)> = None;
    for (s, e) in paragraphs {
        cur = match cur {
            Some((cs, _)) if e - cs <= max_chars => Some((cs, e)),
            Some(done) => {
                ranges.push(done);
                Some((s, e))
            }
            None => Some((s, e)),
        };
    }
    ranges.extend(cur);

    ranges
        .into_iter()
        .filter(|(s, e)| e > s)
        .map(|(s, e)| Chunk {
            offset: s,
            text: flat.slice(s, e).to_string(),
        })
        .collect()
}

/// Chunk spans moved into buffer coordinates.
#[derive(Debug, Default, PartialEq)]
pub struct Shifted {
    pub spans: Vec<Span>,
    /// Spans that were empty or ran past the chunk they came from.
    pub dropped: usize,
}

/// Moves chunk-relative spans into buffer coordinates. `chunk_len` is the char
/// length of the text the detector was given; spans outside it are dropped so they
/// cannot reach into a neighbouring chunk.
pub fn shift_spans(spans: Vec<Span>, offset: usize, chunk_len: usize) -> Shifted {
    let mut out = Shifted::default();
    for s in spans {
        if s.start >= s.end || s.end > chunk_len {
            log::warn!(
                "dropping span {}..{} ({}) outside chunk of {chunk_len} chars at {offset}",
                s.start,
                s.end,
                s.label
            );
            out.dropped += 1;
            continue;
        }
        out.spans.push(Span {
            start: s.start + offset,
            end: s.end + offset,
            ..s
        });
    }
    out
}
