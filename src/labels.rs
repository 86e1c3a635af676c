use std::collections::HashSet;
use std::fmt;

use crate::error::UnknownLabelError;

/// Every label the detectors are asked about.
pub const ALL_LABELS: &[&str] = &[
    "number",
    "location address street",
    "pin",
    "name medical professional",
    "accounts",
    "policy number",
    "marital status",
    "passport number",
    "ssn",
    "discharge date",
    "occupation",
    "date",
    "origin",
    "test result",
    "name",
    "location zip",
    "gender",
    "organization medical facility",
    "esidno",
    "zip",
    "date interval",
    "dob",
    "rate",
    "organization",
    "location state",
    "confirmation number",
    "name given",
    "time",
    "cvv",
    "month",
    "credit card",
    "planduration",
    "filename",
    "age",
    "numerical pii",
    "money",
    "physical attribute",
    "address",
    "credit card expiration",
    "account number",
    "location",
    "language",
    "location city",
    "duration",
    "password",
    "medical process",
    "county",
    "phone number",
    "condition",
    "email address",
    "location address",
    "name family",
    "location country",
];

/// Personally identifiable information.
pub const PII_GROUP: &[&str] = &[
    "name",
    "name given",
    "name family",
    "phone number",
    "email address",
    "ssn",
    "dob",
    "age",
    "gender",
    "marital status",
    "origin",
    "location address",
    "location address street",
    "location city",
    "location state",
    "location country",
    "location zip",
    "location",
    "address",
    "zip",
    "county",
    "passport number",
    "occupation",
    "language",
    "physical attribute",
    "password",
    "filename",
    "date",
    "time",
    "duration",
    "date interval",
    "month",
    "number",
    "numerical pii",
    "esidno",
    "confirmation number",
];

/// Protected health information.
pub const PHI_GROUP: &[&str] = &[
    "name",
    "name medical professional",
    "dob",
    "age",
    "gender",
    "phone number",
    "email address",
    "ssn",
    "location address",
    "organization medical facility",
    "condition",
    "medical process",
    "test result",
    "discharge date",
    "policy number",
    "account number",
    "location city",
    "location state",
    "location zip",
];

/// Payment card industry data.
pub const PCI_GROUP: &[&str] = &[
    "credit card",
    "credit card expiration",
    "cvv",
    "account number",
    "accounts",
    "pin",
    "money",
    "rate",
    "planduration",
];

/// Tie-break order for spans with identical bounds and score, most specific first.
pub const LABEL_PRIORITY: &[&str] = &[
    // payment and government identifiers
    "credit card",
    "cvv",
    "credit card expiration",
    "account number",
    "accounts",
    "pin",
    "ssn",
    "passport number",
    "esidno",
    "policy number",
    "confirmation number",
    // health
    "condition",
    "medical process",
    "test result",
    "name medical professional",
    "organization medical facility",
    "discharge date",
    // names
    "name",
    "name given",
    "name family",
    // contact
    "email address",
    "phone number",
    "password",
    "filename",
    // locations
    "location address street",
    "location address",
    "address",
    "location zip",
    "zip",
    "location city",
    "county",
    "location state",
    "location country",
    "location",
    "origin",
    // organisations
    "organization",
    // dates and times
    "dob",
    "date interval",
    "date",
    "month",
    "time",
    "duration",
    "planduration",
    // personal attributes
    "age",
    "gender",
    "marital status",
    "occupation",
    "language",
    "physical attribute",
    // generic numbers
    "money",
    "rate",
    "numerical pii",
    "number",
];

/// Rank of `label` in [`LABEL_PRIORITY`]; unlisted labels share the last rank.
pub fn priority_rank(label: &str) -> usize {
    LABEL_PRIORITY
        .iter()
        .position(|l| *l == label)
        .unwrap_or(LABEL_PRIORITY.len())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LabelGroup {
    Pii,
    Phi,
    Pci,
}

impl LabelGroup {
    pub fn labels(self) -> &'static [&'static str] {
        match self {
            Self::Pii => PII_GROUP,
            Self::Phi => PHI_GROUP,
            Self::Pci => PCI_GROUP,
        }
    }
}

impl fmt::Display for LabelGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pii => "PII",
            Self::Phi => "PHI",
            Self::Pci => "PCI",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LabelSelection {
    All,
    Group(LabelGroup),
    /// User-supplied names; underscores stand for spaces.
    Explicit(Vec<String>),
}

impl LabelSelection {
    pub fn resolve(&self) -> Result<LabelSet, UnknownLabelError> {
        match self {
            Self::All => Ok(LabelSet::from_known(ALL_LABELS)),
            Self::Group(g) => Ok(LabelSet::from_known(g.labels())),
            Self::Explicit(raw) => {
                let mut labels = Vec::new();
                let mut unknown = Vec::new();
                let mut seen = HashSet::new();
                for r in raw {
                    let label = normalize_label(r);
                    if label.is_empty() || !seen.insert(label.clone()) {
                        continue;
                    }
                    if ALL_LABELS.contains(&label.as_str()) {
                        labels.push(label);
                    } else {
                        unknown.push(label);
                    }
                }
                if !unknown.is_empty() {
                    return Err(UnknownLabelError { labels: unknown });
                }
                if labels.is_empty() {
                    return Ok(LabelSet::from_known(ALL_LABELS));
                }
                Ok(LabelSet { labels })
            }
        }
    }
}

impl fmt::Display for LabelSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all labels"),
            Self::Group(g) => write!(f, "{g} group"),
            Self::Explicit(v) => write!(f, "{} explicit label(s)", v.len()),
        }
    }
}

pub fn normalize_label(raw: &str) -> String {
    raw.replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Concrete, ordered, duplicate-free labels sent to a detector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<String>,
}

impl LabelSet {
    fn from_known(labels: &[&str]) -> Self {
        let mut seen = HashSet::new();
        Self {
            labels: labels
                .iter()
                .filter(|l| seen.insert(**l))
                .map(|l| l.to_string())
                .collect(),
        }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.labels
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
