//! Owned, index-addressed view of the text-bearing structure of a WordprocessingML part.
//!
//! Paragraphs live in a per-part arena in document order; blocks (body, table cells,
//! content controls) refer to them by index. Runs keep a back-reference to the `w:r`
//! element (their *slot*) they came from, so a run can be split into fragments while
//! every untouched run is still written back from its original XML events.

use std::collections::HashMap;

use anyhow::Context;
use serde::Serialize;

use crate::docx::package::DocxPackage;
use crate::docx::xml::{find_attr, write_events, XmlEvent, XmlPart};
use crate::error::ExtractionError;
use crate::ir::{CellAddress, ContainerKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PartKind {
    Body,
    Header,
    Footer,
}

impl PartKind {
    fn from_part_name(name: &str) -> Self {
        let file = name.rsplit('/').next().unwrap_or(name);
        if file.starts_with("header") {
            Self::Header
        } else if file.starts_with("footer") {
            Self::Footer
        } else {
            Self::Body
        }
    }
}

/// Character formatting of a run as far as `w:rPr` states it directly.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunFormat {
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    pub underline: Option<String>,
    pub strike: Option<bool>,
    pub color: Option<String>,
    pub highlight: Option<String>,
    pub size: Option<String>,
    pub size_cs: Option<String>,
    pub style: Option<String>,
    pub vert_align: Option<String>,
    pub font_ascii: Option<String>,
    pub font_hansi: Option<String>,
    pub font_east_asia: Option<String>,
    pub font_cs: Option<String>,
}

impl RunFormat {
    fn apply_property(&mut self, name: &str, attrs: &[(String, String)]) {
        let v = || find_attr(attrs, "w:val").map(|v| v.to_string());
        match name {
            "w:b" => self.bold = Some(on_off(attrs)),
            "w:i" => self.italic = Some(on_off(attrs)),
            "w:strike" => self.strike = Some(on_off(attrs)),
            "w:u" => self.underline = v(),
            "w:color" => self.color = v(),
            "w:highlight" => self.highlight = v(),
            "w:sz" => self.size = v(),
            "w:szCs" => self.size_cs = v(),
            "w:rStyle" => self.style = v(),
            "w:vertAlign" => self.vert_align = v(),
            "w:rFonts" => {
                self.font_ascii = find_attr(attrs, "w:ascii").map(|v| v.to_string());
                self.font_hansi = find_attr(attrs, "w:hAnsi").map(|v| v.to_string());
                self.font_east_asia = find_attr(attrs, "w:eastAsia").map(|v| v.to_string());
                self.font_cs = find_attr(attrs, "w:cs").map(|v| v.to_string());
            }
            _ => {}
        }
    }
}

fn on_off(attrs: &[(String, String)]) -> bool {
    match find_attr(attrs, "w:val") {
        Some(v) => {
            let s = v.trim().to_ascii_lowercase();
            !(s == "0" || s == "false" || s == "off" || s == "none")
        }
        None => true,
    }
}

/// The original `w:r` element a run came from.
#[derive(Clone, Debug)]
pub struct RunSlot {
    pub start_event: usize,
    pub end_event: usize,
    /// Holds content other than text, tabs and line breaks; never rewritten.
    pub opaque: bool,
    attrs: Vec<(String, String)>,
    rpr: Vec<XmlEvent>,
}

#[derive(Clone, Debug)]
pub struct Run {
    pub slot: usize,
    pub format: RunFormat,
    text: String,
    /// Char count taken from the run's XML children while parsing, not from `text`.
    len: usize,
    edited: bool,
}

impl Run {
    fn new(slot: usize, format: RunFormat, text: String, len: usize) -> Self {
        Self {
            slot,
            format,
            text,
            len,
            edited: false,
        }
    }

    #[cfg(test)]
    pub(crate) fn set_recorded_len(&mut self, len: usize) {
        self.len = len;
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Recorded length in chars.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// A new run of the same slot and formatting holding `text`.
    pub fn fragment(&self, text: &str) -> Self {
        Self {
            slot: self.slot,
            format: self.format.clone(),
            text: text.to_string(),
            len: text.chars().count(),
            edited: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Paragraph {
    pub start_event: usize,
    pub end_event: usize,
    pub cells: Vec<CellAddress>,
    pub index_in_container: usize,
    pub slots: Vec<RunSlot>,
    pub runs: Vec<Run>,
}

impl Paragraph {
    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text()).collect()
    }

    fn is_dirty(&self) -> bool {
        self.runs.len() != self.slots.len() || self.runs.iter().any(|r| r.edited)
    }
}

#[derive(Clone, Debug)]
pub enum Block {
    Paragraph(usize),
    Table(Table),
}

#[derive(Clone, Debug, Default)]
pub struct Table {
    pub rows: Vec<TableRow>,
}

#[derive(Clone, Debug, Default)]
pub struct TableRow {
    pub cells: Vec<TableCell>,
}

#[derive(Clone, Debug, Default)]
pub struct TableCell {
    pub blocks: Vec<Block>,
}

pub struct DocumentPart {
    pub kind: PartKind,
    pub xml: XmlPart,
    pub blocks: Vec<Block>,
    pub paragraphs: Vec<Paragraph>,
}

impl DocumentPart {
    pub fn build(xml: XmlPart) -> Result<Self, ExtractionError> {
        let kind = PartKind::from_part_name(&xml.name);
        let (blocks, paragraphs) = {
            let mut b = Builder {
                part: &xml.name,
                events: &xml.events,
                paragraphs: Vec::new(),
            };
            let blocks = match b.block_root(kind)? {
                Some((open, close)) => b.parse_blocks(open, close, &[])?,
                None => Vec::new(),
            };
            (blocks, b.paragraphs)
        };
        Ok(Self {
            kind,
            xml,
            blocks,
            paragraphs,
        })
    }

    pub fn name(&self) -> &str {
        &self.xml.name
    }

    pub fn container_of(&self, paragraph: usize) -> ContainerKind {
        let in_cell = self
            .paragraphs
            .get(paragraph)
            .is_some_and(|p| !p.cells.is_empty());
        match self.kind {
            PartKind::Header => ContainerKind::Header,
            PartKind::Footer => ContainerKind::Footer,
            PartKind::Body if in_cell => ContainerKind::TableCell,
            PartKind::Body => ContainerKind::Body,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.paragraphs.iter().any(Paragraph::is_dirty)
    }

    /// The part's event list with every run slot replaced by its current runs.
    pub fn render(&self) -> Vec<XmlEvent> {
        let mut slot_at: HashMap<usize, (usize, usize)> = HashMap::new();
        for (p_idx, p) in self.paragraphs.iter().enumerate() {
            for (s_idx, s) in p.slots.iter().enumerate() {
                slot_at.insert(s.start_event, (p_idx, s_idx));
            }
        }

        let events = &self.xml.events;
        let mut out = Vec::with_capacity(events.len());
        let mut i = 0;
        while i < events.len() {
            if let Some(&(p_idx, s_idx)) = slot_at.get(&i) {
                let para = &self.paragraphs[p_idx];
                let slot = &para.slots[s_idx];
                self.render_slot(&mut out, para, s_idx);
                i = slot.end_event + 1;
                continue;
            }
            out.push(events[i].clone());
            i += 1;
        }
        out
    }

    /// Writes the runs of slot `s_idx`. A slot whose single run is unedited is copied
    /// event for event. Edited runs are re-encoded from their text with the slot's
    /// `w:rPr`, which is lossy: `w:softHyphen` and `w:lastRenderedPageBreak` vanish,
    /// `w:noBreakHyphen` becomes a plain `-`, `w:cr` and `w:ptab` come back as `w:br`
    /// and `w:tab`.
    fn render_slot(&self, out: &mut Vec<XmlEvent>, para: &Paragraph, s_idx: usize) {
        let slot = &para.slots[s_idx];
        let runs: Vec<&Run> = para.runs.iter().filter(|r| r.slot == s_idx).collect();
        if let [run] = runs.as_slice() {
            if !run.edited {
                out.extend_from_slice(&self.xml.events[slot.start_event..=slot.end_event]);
                return;
            }
        }
        for run in runs {
            if run.text.is_empty() {
                continue;
            }
            out.push(XmlEvent::start("w:r", slot.attrs.clone()));
            out.extend(slot.rpr.iter().cloned());
            encode_run_text(out, &run.text);
            out.push(XmlEvent::end("w:r"));
        }
    }
}

fn encode_run_text(out: &mut Vec<XmlEvent>, text: &str) {
    let mut pending = String::new();
    let flush = |out: &mut Vec<XmlEvent>, pending: &mut String| {
        if pending.is_empty() {
            return;
        }
        out.push(XmlEvent::start(
            "w:t",
            vec![("xml:space".to_string(), "preserve".to_string())],
        ));
        out.push(XmlEvent::text(pending));
        out.push(XmlEvent::end("w:t"));
        pending.clear();
    };
    for ch in text.chars() {
        match ch {
            '\t' => {
                flush(out, &mut pending);
                out.push(XmlEvent::empty("w:tab"));
            }
            '\n' => {
                flush(out, &mut pending);
                out.push(XmlEvent::empty("w:br"));
            }
            _ => pending.push(ch),
        }
    }
    flush(out, &mut pending);
}

/// All text-bearing parts of one package.
pub struct Document {
    pub parts: Vec<DocumentPart>,
}

impl Document {
    pub fn from_package(pkg: &DocxPackage) -> Result<Self, ExtractionError> {
        let mut parts = Vec::new();
        for name in pkg.text_part_names() {
            let entry = pkg.entry(&name).ok_or_else(|| ExtractionError::Xml {
                part: name.clone(),
                message: "part missing from package".to_string(),
            })?;
            let xml = XmlPart::parse(&name, &entry.data).map_err(|e| ExtractionError::Xml {
                part: name.clone(),
                message: format!("{e:#}"),
            })?;
            parts.push(DocumentPart::build(xml)?);
        }
        Ok(Self { parts })
    }

    pub fn from_xml(name: &str, xml: &[u8]) -> Result<Self, ExtractionError> {
        let xml = XmlPart::parse(name, xml).map_err(|e| ExtractionError::Xml {
            part: name.to_string(),
            message: format!("{e:#}"),
        })?;
        Ok(Self {
            parts: vec![DocumentPart::build(xml)?],
        })
    }

    /// Serialized bytes of every part that was modified since it was built.
    pub fn changed_parts(&self) -> anyhow::Result<HashMap<String, Vec<u8>>> {
        let mut out = HashMap::new();
        for part in self.parts.iter().filter(|p| p.is_dirty()) {
            let mut bytes = Vec::with_capacity(part.xml.events.len() * 16);
            write_events(&mut bytes, &part.render())
                .with_context(|| format!("serialize part: {}", part.name()))?;
            out.insert(part.name().to_string(), bytes);
        }
        Ok(out)
    }
}

struct Builder<'a> {
    part: &'a str,
    events: &'a [XmlEvent],
    paragraphs: Vec<Paragraph>,
}

impl<'a> Builder<'a> {
    fn malformed(&self, event: usize, reason: impl Into<String>) -> ExtractionError {
        ExtractionError::Malformed {
            part: self.part.to_string(),
            event,
            reason: reason.into(),
        }
    }

    fn name_at(&self, idx: usize) -> &'a str {
        let events: &'a [XmlEvent] = self.events;
        events[idx].name().unwrap_or("")
    }

    fn block_root(&self, kind: PartKind) -> Result<Option<(usize, usize)>, ExtractionError> {
        let wanted = |name: &str| match kind {
            PartKind::Body => name == "w:body",
            PartKind::Header => name == "w:hdr",
            PartKind::Footer => name == "w:ftr",
        };
        let Some(open) = self.events.iter().position(|ev| match ev {
            XmlEvent::Start { name, .. } | XmlEvent::Empty { name, .. } => wanted(name),
            _ => false,
        }) else {
            return match kind {
                PartKind::Body => Err(self.malformed(0, "document has no w:body")),
                _ => Ok(None),
            };
        };
        Ok(Some((open, self.close_of(open)?)))
    }

    /// Index of the event closing the element opened at `open`.
    fn close_of(&self, open: usize) -> Result<usize, ExtractionError> {
        let name = match &self.events[open] {
            XmlEvent::Empty { .. } => return Ok(open),
            XmlEvent::Start { name, .. } => name.as_str(),
            _ => return Err(self.malformed(open, "expected an element start")),
        };
        let mut depth = 0usize;
        for (i, ev) in self.events.iter().enumerate().skip(open) {
            match ev {
                XmlEvent::Start { name: n, .. } if n == name => depth += 1,
                XmlEvent::End { name: n } if n == name => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(i);
                    }
                }
                _ => {}
            }
        }
        Err(self.malformed(open, format!("unclosed {name}")))
    }

    /// Direct child elements of the element spanning `open..=close`.
    fn children(&self, open: usize, close: usize) -> Result<Vec<usize>, ExtractionError> {
        let mut out = Vec::new();
        let mut i = open + 1;
        while i < close {
            match &self.events[i] {
                XmlEvent::Start { .. } => {
                    out.push(i);
                    i = self.close_of(i)? + 1;
                }
                XmlEvent::Empty { .. } => {
                    out.push(i);
                    i += 1;
                }
                XmlEvent::End { name } => {
                    return Err(self.malformed(i, format!("unexpected </{name}>")));
                }
                _ => i += 1,
            }
        }
        Ok(out)
    }

    fn parse_blocks(
        &mut self,
        open: usize,
        close: usize,
        cells: &[CellAddress],
    ) -> Result<Vec<Block>, ExtractionError> {
        let mut blocks = Vec::new();
        let mut counters = (0usize, 0usize);
        self.collect_blocks(open, close, cells, &mut blocks, &mut counters)?;
        Ok(blocks)
    }

    fn collect_blocks(
        &mut self,
        open: usize,
        close: usize,
        cells: &[CellAddress],
        blocks: &mut Vec<Block>,
        counters: &mut (usize, usize),
    ) -> Result<(), ExtractionError> {
        for child in self.children(open, close)? {
            match self.name_at(child) {
                "w:p" => {
                    let idx = self.parse_paragraph(child, cells, counters.0)?;
                    counters.0 += 1;
                    blocks.push(Block::Paragraph(idx));
                }
                "w:tbl" => {
                    let table = self.parse_table(child, cells, counters.1)?;
                    counters.1 += 1;
                    blocks.push(Block::Table(table));
                }
                "w:sdt" | "w:sdtContent" | "w:customXml" => {
                    let end = self.close_of(child)?;
                    self.collect_blocks(child, end, cells, blocks, counters)?;
                }
                "w:tr" => return Err(self.malformed(child, "table row outside a table")),
                "w:tc" => return Err(self.malformed(child, "table cell outside a row")),
                _ => {}
            }
        }
        Ok(())
    }

    fn parse_table(
        &mut self,
        open: usize,
        cells: &[CellAddress],
        table: usize,
    ) -> Result<Table, ExtractionError> {
        let close = self.close_of(open)?;
        let mut out = Table::default();
        for child in self.children(open, close)? {
            match self.name_at(child) {
                "w:tr" => {
                    let row = out.rows.len();
                    let parsed = self.parse_row(child, cells, table, row)?;
                    out.rows.push(parsed);
                }
                "w:tc" => return Err(self.malformed(child, "table cell outside a row")),
                "w:p" => return Err(self.malformed(child, "paragraph directly inside a table")),
                _ => {}
            }
        }
        Ok(out)
    }

    fn parse_row(
        &mut self,
        open: usize,
        cells: &[CellAddress],
        table: usize,
        row: usize,
    ) -> Result<TableRow, ExtractionError> {
        let close = self.close_of(open)?;
        let mut out = TableRow::default();
        for child in self.children(open, close)? {
            match self.name_at(child) {
                "w:tc" => {
                    let mut path = cells.to_vec();
                    path.push(CellAddress {
                        table,
                        row,
                        column: out.cells.len(),
                    });
                    let end = self.close_of(child)?;
                    let blocks = self.parse_blocks(child, end, &path)?;
                    out.cells.push(TableCell { blocks });
                }
                "w:p" => return Err(self.malformed(child, "paragraph directly inside a row")),
                _ => {}
            }
        }
        Ok(out)
    }

    fn parse_paragraph(
        &mut self,
        open: usize,
        cells: &[CellAddress],
        index_in_container: usize,
    ) -> Result<usize, ExtractionError> {
        let close = self.close_of(open)?;
        let mut slots = Vec::new();
        let mut runs = Vec::new();
        self.collect_runs(open, close, &mut slots, &mut runs)?;
        self.paragraphs.push(Paragraph {
            start_event: open,
            end_event: close,
            cells: cells.to_vec(),
            index_in_container,
            slots,
            runs,
        });
        Ok(self.paragraphs.len() - 1)
    }

    fn collect_runs(
        &self,
        open: usize,
        close: usize,
        slots: &mut Vec<RunSlot>,
        runs: &mut Vec<Run>,
    ) -> Result<(), ExtractionError> {
        for child in self.children(open, close)? {
            match self.name_at(child) {
                "w:r" => {
                    let (slot, run) = self.parse_run(child, slots.len())?;
                    runs.push(run);
                    slots.push(slot);
                }
                "w:hyperlink" | "w:smartTag" | "w:ins" | "w:moveTo" | "w:sdt" | "w:sdtContent"
                | "w:customXml" | "w:fldSimple" | "w:dir" | "w:bdo" => {
                    let end = self.close_of(child)?;
                    self.collect_runs(child, end, slots, runs)?;
                }
                "w:p" => return Err(self.malformed(child, "paragraph nested in a paragraph")),
                "w:tbl" => return Err(self.malformed(child, "table nested in a paragraph")),
                _ => {}
            }
        }
        Ok(())
    }

    fn parse_run(&self, open: usize, slot_idx: usize) -> Result<(RunSlot, Run), ExtractionError> {
        let close = self.close_of(open)?;
        let mut format = RunFormat::default();
        let mut rpr = Vec::new();
        let mut text = String::new();
        let mut len = 0;
        let mut opaque = false;

        for child in self.children(open, close)? {
            let ev = &self.events[child];
            match self.name_at(child) {
                "w:rPr" => {
                    let end = self.close_of(child)?;
                    rpr = self.events[child..=end].to_vec();
                    for prop in self.children(child, end)? {
                        format.apply_property(self.name_at(prop), self.events[prop].attrs());
                    }
                }
                "w:t" => {
                    let end = self.close_of(child)?;
                    for inner in &self.events[child..end] {
                        if let XmlEvent::Text { text: t } = inner {
                            text.push_str(t);
                            len += t.chars().count();
                        }
                    }
                }
                "w:tab" | "w:ptab" => {
                    text.push('\t');
                    len += 1;
                }
                "w:cr" => {
                    text.push('\n');
                    len += 1;
                }
                "w:br" => match find_attr(ev.attrs(), "w:type") {
                    None | Some("textWrapping") => {
                        text.push('\n');
                        len += 1;
                    }
                    Some(_) => opaque = true,
                },
                "w:noBreakHyphen" => {
                    text.push('-');
                    len += 1;
                }
                "w:softHyphen" | "w:lastRenderedPageBreak" => {}
                _ => opaque = true,
            }
        }

        if opaque && len > 0 {
            log::debug!(
                "{}: run at event {open} holds non-text content; {len} chars left untouched",
                self.part
            );
            text.clear();
            len = 0;
        }

        let slot = RunSlot {
            start_event: open,
            end_event: close,
            opaque,
            attrs: self.events[open].attrs().to_vec(),
            rpr,
        };
        Ok((slot, Run::new(slot_idx, format, text, len)))
    }
}
