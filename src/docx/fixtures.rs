//! WordprocessingML snippets for unit tests.

use crate::docx::model::Document;
use crate::docx::package::MAIN_DOCUMENT_PART;

pub fn document_xml(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><w:body>{body}<w:sectPr/></w:body></w:document>"#
    )
}

pub fn run(text: &str) -> String {
    format!(r#"<w:r><w:t xml:space="preserve">{text}</w:t></w:r>"#)
}

pub fn run_fmt(text: &str, rpr: &str) -> String {
    format!(r#"<w:r><w:rPr>{rpr}</w:rPr><w:t xml:space="preserve">{text}</w:t></w:r>"#)
}

pub fn para(runs: &[String]) -> String {
    format!("<w:p>{}</w:p>", runs.concat())
}

/// Rows of cells, each cell given as its inner block XML.
pub fn table(rows: &[&[String]]) -> String {
    let mut out = String::from("<w:tbl><w:tblPr/><w:tblGrid/>");
    for row in rows {
        out.push_str("<w:tr>");
        for cell in *row {
            out.push_str("<w:tc><w:tcPr/>");
            out.push_str(cell);
            out.push_str("</w:tc>");
        }
        out.push_str("</w:tr>");
    }
    out.push_str("</w:tbl>");
    out
}

pub fn document(body: &str) -> Document {
    Document::from_xml(MAIN_DOCUMENT_PART, document_xml(body).as_bytes()).expect("fixture document")
}

/// Text of every paragraph of the main part after rendering and reparsing.
pub fn rendered_paragraphs(doc: &Document) -> Vec<String> {
    let parts = doc.changed_parts().expect("render");
    let bytes = match parts.get(MAIN_DOCUMENT_PART) {
        Some(b) => b.clone(),
        None => {
            let mut out = Vec::new();
            crate::docx::xml::write_events(&mut out, &doc.parts[0].xml.events).expect("write");
            out
        }
    };
    let again = Document::from_xml(MAIN_DOCUMENT_PART, &bytes).expect("reparse");
    again.parts[0].paragraphs.iter().map(|p| p.text()).collect()
}
