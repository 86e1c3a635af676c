use crate::docx::model::{Block, Document, DocumentPart};
use crate::error::ExtractionError;
use crate::ir::{FlattenedDocument, SegmentKind, StructuralLocation, TextSegment, PARAGRAPH_BREAK};

/// Flattens every text-bearing part of `doc` into one buffer. Parts are visited in
/// order (main document, headers, footers); tables row by row, cell by cell, to any
/// nesting depth. Consecutive paragraphs are separated by a single boundary char.
pub fn extract(doc: &Document) -> Result<FlattenedDocument, ExtractionError> {
    let mut flat = Flattener::default();
    for (part_idx, part) in doc.parts.iter().enumerate() {
        flat.walk_blocks(part_idx, part, &part.blocks)?;
    }
    let pos = flat.pos;
    let out = FlattenedDocument::new(flat.text, flat.segments);
    debug_assert_eq!(out.len(), pos);
    Ok(out)
}

#[derive(Default)]
struct Flattener {
    text: String,
    pos: usize,
    segments: Vec<TextSegment>,
    /// Location of the last paragraph emitted, owed a boundary before the next one.
    pending_break: Option<StructuralLocation>,
}

impl Flattener {
    fn walk_blocks(
        &mut self,
        part_idx: usize,
        part: &DocumentPart,
        blocks: &[Block],
    ) -> Result<(), ExtractionError> {
        for block in blocks {
            match block {
                Block::Paragraph(p) => self.paragraph(part_idx, part, *p)?,
                Block::Table(table) => {
                    for row in &table.rows {
                        for cell in &row.cells {
                            self.walk_blocks(part_idx, part, &cell.blocks)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn paragraph(
        &mut self,
        part_idx: usize,
        part: &DocumentPart,
        p_idx: usize,
    ) -> Result<(), ExtractionError> {
        let para = &part.paragraphs[p_idx];
        if let Some(location) = self.pending_break.take() {
            self.text.push(PARAGRAPH_BREAK);
            self.segments.push(TextSegment {
                start: self.pos,
                end: self.pos + 1,
                location,
                kind: SegmentKind::ParagraphBreak,
            });
            self.pos += 1;
        }

        let base = StructuralLocation {
            part: part_idx,
            container: part.container_of(p_idx),
            paragraph: p_idx,
            cells: para.cells.clone(),
            paragraph_in_container: para.index_in_container,
            run: 0,
            offset: 0,
        };

        for (r_idx, run) in para.runs.iter().enumerate() {
            let actual = run.text().chars().count();
            if actual != run.len() {
                return Err(ExtractionError::RunLength {
                    part: part.name().to_string(),
                    paragraph: p_idx,
                    run: r_idx,
                    recorded: run.len(),
                    actual,
                });
            }
            if run.is_empty() {
                continue;
            }
            self.text.push_str(run.text());
            self.segments.push(TextSegment {
                start: self.pos,
                end: self.pos + actual,
                location: StructuralLocation {
                    run: r_idx,
                    ..base.clone()
                },
                kind: SegmentKind::Run(run.format.clone()),
            });
            self.pos += actual;
        }

        self.pending_break = Some(StructuralLocation {
            run: para.runs.len(),
            ..base
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::fixtures::{document, document_xml, para, run, run_fmt, table};
    use crate::docx::model::DocumentPart;
    use crate::docx::xml::XmlPart;
    use crate::ir::{CellAddress, ContainerKind};

    #[test]
    fn runs_concatenate_and_paragraphs_are_separated() {
        let doc = document(&format!(
            "{}{}{}",
            para(&[run_fmt("account nu", "<w:b/>"), run("mber 12345")]),
            para(&[]),
            para(&[run("x"), run(""), run("y")])
        ));
        let flat = extract(&doc).expect("extract");
        assert_eq!(flat.text, "account number 12345\n\nxy");
        assert!(flat.is_fully_covered());

        let runs: Vec<(usize, usize)> = flat
            .segments
            .iter()
            .filter(|s| !s.is_boundary())
            .map(|s| (s.location.paragraph, s.location.run))
            .collect();
        assert_eq!(runs, vec![(0, 0), (0, 1), (2, 0), (2, 2)]);
        assert_eq!(flat.boundaries().collect::<Vec<_>>(), vec![20, 21]);
        let first_break = &flat.segments[2];
        assert_eq!((first_break.location.paragraph, first_break.location.run), (0, 2));
    }

    #[test]
    fn table_cells_follow_row_then_column_order() {
        let body = table(&[
            &[para(&[run("r0c0")]), para(&[run("r0c1")])],
            &[para(&[run("r1c0")]), para(&[run("r1c1")])],
        ]);
        let flat = extract(&document(&body)).expect("extract");
        assert_eq!(flat.text, "r0c0\nr0c1\nr1c0\nr1c1");

        let loc = flat.location_at(flat.text.find("r1c1").expect("find")).expect("loc");
        assert_eq!(loc.container, ContainerKind::TableCell);
        assert_eq!(loc.cells, vec![CellAddress { table: 0, row: 1, column: 1 }]);
    }

    #[test]
    fn header_text_follows_body() {
        let mut doc = document(&para(&[run("body")]));
        let hdr = br#"<w:hdr xmlns:w="urn:w"><w:p><w:r><w:t>Patient: Jane Roe</w:t></w:r></w:p></w:hdr>"#;
        let part = XmlPart::parse("word/header1.xml", hdr).expect("xml");
        doc.parts.push(DocumentPart::build(part).expect("build"));

        let flat = extract(&doc).expect("extract");
        assert_eq!(flat.text, "body\nPatient: Jane Roe");
        let loc = flat.location_at(10).expect("loc");
        assert_eq!(loc.part, 1);
        assert_eq!(loc.container, ContainerKind::Header);
        assert_eq!(loc.offset, 5);
    }

    #[test]
    fn empty_body_is_empty_buffer() {
        let doc = crate::docx::model::Document::from_xml(
            "word/document.xml",
            document_xml("").as_bytes(),
        )
        .expect("doc");
        let flat = extract(&doc).expect("extract");
        assert!(flat.is_empty());
        assert!(flat.segments.is_empty());
    }

    #[test]
    fn run_length_disagreeing_with_text_is_rejected() {
        let mut doc = document(&para(&[run("Jane"), run(" Roe")]));
        doc.parts[0].paragraphs[0].runs[1].set_recorded_len(7);
        let err = extract(&doc).expect_err("inconsistent run");
        assert!(matches!(
            err,
            ExtractionError::RunLength {
                paragraph: 0,
                run: 1,
                recorded: 7,
                actual: 4,
                ..
            }
        ));
    }
}
