//! DOCX packages: zip container, XML event stream, the paragraph/run arena built on
//! top of it, flattening to text and run-level rewriting.

pub mod apply;
pub mod extract;
pub mod model;
pub mod package;
pub mod xml;

#[cfg(test)]
pub(crate) mod fixtures;
