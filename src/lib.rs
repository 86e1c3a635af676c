//! Detects personal, health and payment data in Word documents and replaces it in
//! place without disturbing run formatting.

pub mod config;
pub mod docx;
pub mod error;
pub mod ir;
pub mod labels;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod replace;
pub mod resolve;
pub mod synthetic;
