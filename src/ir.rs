use serde::Serialize;

use crate::docx::model::RunFormat;

/// Coordinates of one table cell within its container.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CellAddress {
    pub table: usize,
    pub row: usize,
    pub column: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    Body,
    TableCell,
    Header,
    Footer,
}

impl ContainerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Body => "body",
            Self::TableCell => "table_cell",
            Self::Header => "header",
            Self::Footer => "footer",
        }
    }
}

/// A point in the document tree. `paragraph` is the arena index inside `part`;
/// `cells` lists one address per table nesting level, outermost first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StructuralLocation {
    pub part: usize,
    pub container: ContainerKind,
    pub paragraph: usize,
    pub cells: Vec<CellAddress>,
    pub paragraph_in_container: usize,
    pub run: usize,
    pub offset: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SegmentKind {
    Run(RunFormat),
    /// The separator after a paragraph; never matchable, never rewritten.
    ParagraphBreak,
}

/// `[start, end)` in chars of the flattened buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct TextSegment {
    pub start: usize,
    pub end: usize,
    pub location: StructuralLocation,
    pub kind: SegmentKind,
}

impl TextSegment {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    pub fn is_boundary(&self) -> bool {
        matches!(self.kind, SegmentKind::ParagraphBreak)
    }
}

pub const PARAGRAPH_BREAK: char = '\n';

#[derive(Clone, Debug, Default)]
pub struct FlattenedDocument {
    pub text: String,
    /// Byte offset of every char, plus `text.len()` at the end.
    byte_offsets: Vec<usize>,
    pub segments: Vec<TextSegment>,
}

impl FlattenedDocument {
    pub fn new(text: String, segments: Vec<TextSegment>) -> Self {
        let mut byte_offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        byte_offsets.push(text.len());
        Self {
            text,
            byte_offsets,
            segments,
        }
    }

    /// Buffer length in chars.
    pub fn len(&self) -> usize {
        self.byte_offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Text of the char range `[start, end)`, clamped to the buffer.
    pub fn slice(&self, start: usize, end: usize) -> &str {
        let end = end.min(self.len());
        let start = start.min(end);
        &self.text[self.byte_offsets[start]..self.byte_offsets[end]]
    }

    /// Index of the segment covering char offset `offset`.
    pub fn segment_index_at(&self, offset: usize) -> Option<usize> {
        if offset >= self.len() {
            return None;
        }
        let idx = self.segments.partition_point(|s| s.start <= offset);
        idx.checked_sub(1)
    }

    /// Indices of the segments intersecting `[start, end)`, in order.
    pub fn segments_overlapping(&self, start: usize, end: usize) -> std::ops::Range<usize> {
        if start >= end {
            return 0..0;
        }
        let first = self.segments.partition_point(|s| s.end <= start);
        let last = self.segments.partition_point(|s| s.start < end);
        first..last.max(first)
    }

    pub fn location_at(&self, offset: usize) -> Option<StructuralLocation> {
        let seg = &self.segments[self.segment_index_at(offset)?];
        let mut loc = seg.location.clone();
        loc.offset += offset - seg.start;
        Some(loc)
    }

    /// Char offsets of every paragraph break, ascending.
    pub fn boundaries(&self) -> impl Iterator<Item = usize> + '_ {
        self.segments
            .iter()
            .filter(|s| s.is_boundary())
            .map(|s| s.start)
    }

    /// Whether the segments are sorted, gap-free and cover exactly the buffer.
    pub fn is_fully_covered(&self) -> bool {
        let mut pos = 0;
        for s in &self.segments {
            if s.start != pos || s.end <= s.start {
                return false;
            }
            pos = s.end;
        }
        pos == self.len()
    }
}

/// A raw detector result in flattened-buffer char coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub label: String,
    pub score: f32,
}

impl Span {
    pub fn new(start: usize, end: usize, label: impl Into<String>, score: f32) -> Self {
        Self {
            start,
            end,
            label: label.into(),
            score,
        }
    }
}

/// A resolved span together with the text it covers.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Entity {
    pub start: usize,
    pub end: usize,
    pub label: String,
    pub score: f32,
    pub text: String,
}
