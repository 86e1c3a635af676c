use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::DetectionError;
use crate::ir::Span;
use crate::labels::LabelSet;
use crate::models::EntityDetector;
use crate::synthetic::luhn_valid;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("email regex")
});

static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+1[\s.-]?)?(?:\(\d{3}\)\s?|\b\d{3}[\s.-])\d{3}[\s.-]\d{4}\b")
        .expect("phone regex")
});

static SSN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("ssn regex"));

static CARD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:\d{4}[\s-]?){3}\d{1,4}\b").expect("card regex"));

static DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:\d{1,2}/\d{1,2}/\d{2,4}|\d{4}-\d{2}-\d{2})\b").expect("date regex")
});

static ZIP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{5}(?:-\d{4})?\b").expect("zip regex"));

/// Offline detector for the labels that have a reliable surface form.
pub struct PatternDetector;

struct Rule {
    labels: &'static [&'static str],
    re: &'static Lazy<Regex>,
    score: f32,
    check: fn(&str) -> bool,
}

fn always(_: &str) -> bool {
    true
}

static RULES: &[Rule] = &[
    Rule {
        labels: &["email address"],
        re: &EMAIL_RE,
        score: 0.95,
        check: always,
    },
    Rule {
        labels: &["credit card"],
        re: &CARD_RE,
        score: 0.95,
        check: luhn_valid,
    },
    Rule {
        labels: &["ssn"],
        re: &SSN_RE,
        score: 0.9,
        check: always,
    },
    Rule {
        labels: &["phone number"],
        re: &PHONE_RE,
        score: 0.85,
        check: always,
    },
    Rule {
        labels: &["date"],
        re: &DATE_RE,
        score: 0.8,
        check: always,
    },
    Rule {
        labels: &["location zip", "zip"],
        re: &ZIP_RE,
        score: 0.6,
        check: always,
    },
];

impl EntityDetector for PatternDetector {
    fn name(&self) -> &str {
        "pattern"
    }

    fn detect(
        &self,
        text: &str,
        labels: &LabelSet,
        threshold: f32,
    ) -> Result<Vec<Span>, DetectionError> {
        let chars = CharIndex::new(text);
        let mut out = Vec::new();
        for rule in RULES {
            if rule.score < threshold {
                continue;
            }
            let Some(label) = rule.labels.iter().find(|l| labels.contains(l)) else {
                continue;
            };
            for m in rule.re.find_iter(text) {
                if !(rule.check)(m.as_str()) {
                    continue;
                }
                out.push(Span::new(
                    chars.char_at(m.start()),
                    chars.char_at(m.end()),
                    *label,
                    rule.score,
                ));
            }
        }
        Ok(out)
    }
}

/// Byte offset to char offset for one string.
struct CharIndex {
    starts: Vec<usize>,
}

impl CharIndex {
    fn new(text: &str) -> Self {
        Self {
            starts: text.char_indices().map(|(i, _)| i).collect(),
        }
    }

    fn char_at(&self, byte: usize) -> usize {
        self.starts.partition_point(|b| *b < byte)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::LabelSelection;

    fn detect(text: &str) -> Vec<(String, String)> {
        let labels = LabelSelection::All.resolve().expect("labels");
        let spans = PatternDetector.detect(text, &labels, 0.5).expect("detect");
        let chars: Vec<char> = text.chars().collect();
        spans
            .into_iter()
            .map(|s| (s.label, chars[s.start..s.end].iter().collect()))
            .collect()
    }

    #[test]
    fn finds_contact_and_identifiers() {
        let found = detect("Mail jo@example.org, call (415) 555-1234, SSN 123-45-6789.");
        assert!(found.contains(&("email address".into(), "jo@example.org".into())));
        assert!(found.contains(&("phone number".into(), "(415) 555-1234".into())));
        assert!(found.contains(&("ssn".into(), "123-45-6789".into())));
    }

    #[test]
    fn card_numbers_need_a_valid_checksum() {
        let found = detect("Visa 4111 1111 1111 1111 vs 4111 1111 1111 1112");
        let cards: Vec<_> = found.iter().filter(|(l, _)| l == "credit card").collect();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].1, "4111 1111 1111 1111");
    }

    #[test]
    fn offsets_are_in_chars() {
        let found = detect("Zoë’s e-mail: zoë@x.io → zoe@example.com");
        assert!(found.contains(&("email address".into(), "zoe@example.com".into())));
    }

    #[test]
    fn respects_label_set_and_threshold() {
        let labels = LabelSelection::Explicit(vec!["zip".into()]).resolve().expect("labels");
        let spans = PatternDetector
            .detect("Boston, MA 02118 or jo@x.io", &labels, 0.5)
            .expect("detect");
        assert_eq!(spans, vec![Span::new(11, 16, "zip", 0.6)]);
        let none = PatternDetector
            .detect("Boston, MA 02118", &labels, 0.7)
            .expect("detect");
        assert!(none.is_empty());
    }
}
