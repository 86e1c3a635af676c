use std::time::Duration;

use anyhow::Context;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::error::DetectionError;
use crate::ir::Span;
use crate::labels::LabelSet;
use crate::models::EntityDetector;

#[derive(Serialize)]
struct PredictRequest<'a> {
    model: &'a str,
    texts: &'a [&'a str],
    labels: &'a [String],
    threshold: f32,
}

/// Offsets are signed so a bad entity can be told apart from a bad reply.
#[derive(Deserialize)]
struct PredictedEntity {
    label: String,
    start: i64,
    end: i64,
    score: f32,
}

impl PredictedEntity {
    fn into_span(self) -> Option<Span> {
        let start = usize::try_from(self.start).ok()?;
        let end = usize::try_from(self.end).ok()?;
        Some(Span::new(start, end, self.label, self.score))
    }
}

/// Client for a GLiNER-style inference server exposing `POST <endpoint>` with
/// `{model, texts, labels, threshold}` and answering one entity list per text.
pub struct HttpDetector {
    client: Client,
    endpoint: String,
    model: String,
    timeout: Duration,
}

impl HttpDetector {
    pub fn new(endpoint: &str, model: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            timeout,
        })
    }

    fn post(&self, body: &PredictRequest<'_>) -> Result<String, DetectionError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(body)
            .send()
            .map_err(|e| self.transport_error(e))?;
        let status = resp.status();
        let text = resp.text().map_err(|e| self.transport_error(e))?;
        if !status.is_success() {
            return Err(DetectionError::Status {
                status: status.as_u16(),
                body: text.chars().take(200).collect(),
            });
        }
        Ok(text)
    }

    fn transport_error(&self, e: reqwest::Error) -> DetectionError {
        if e.is_timeout() {
            DetectionError::Timeout(self.timeout)
        } else {
            DetectionError::Request(e.to_string())
        }
    }
}

impl EntityDetector for HttpDetector {
    fn name(&self) -> &str {
        &self.model
    }

    fn detect(
        &self,
        text: &str,
        labels: &LabelSet,
        threshold: f32,
    ) -> Result<Vec<Span>, DetectionError> {
        let mut out = self.detect_batch(&[text], labels, threshold)?;
        Ok(out.pop().unwrap_or_default())
    }

    fn detect_batch(
        &self,
        texts: &[&str],
        labels: &LabelSet,
        threshold: f32,
    ) -> Result<Vec<Vec<Span>>, DetectionError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = PredictRequest {
            model: &self.model,
            texts,
            labels: labels.as_slice(),
            threshold,
        };
        let raw = self.post(&body)?;
        parse_batch(&raw, texts.len())
    }
}

/// Entities that fail to decode or carry negative offsets are skipped; only a reply
/// that is not a list of lists fails the batch.
fn parse_batch(raw: &str, expected: usize) -> Result<Vec<Vec<Span>>, DetectionError> {
    let parsed: Vec<Vec<serde_json::Value>> =
        serde_json::from_str(raw).map_err(|e| DetectionError::Response(e.to_string()))?;
    if parsed.len() != expected {
        return Err(DetectionError::BatchShape {
            expected,
            got: parsed.len(),
        });
    }
    let mut skipped = 0;
    let out: Vec<Vec<Span>> = parsed
        .into_iter()
        .map(|list| {
            list.into_iter()
                .filter_map(|v| {
                    let span = serde_json::from_value::<PredictedEntity>(v.clone())
                        .ok()
                        .and_then(PredictedEntity::into_span);
                    if span.is_none() {
                        log::debug!("skipping malformed entity from detector: {v}");
                        skipped += 1;
                    }
                    span
                })
                .collect()
        })
        .collect();
    if skipped > 0 {
        log::warn!("skipped {skipped} malformed entities in detector reply");
    }
    Ok(out)
}
