use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::SeedableRng;
use sha2::{Digest, Sha256};

use crate::ir::Entity;

/// Key under which an entity's replacement is cached: trimmed, inner whitespace
/// collapsed to one space, lowercased.
pub fn signature(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Source signature to replacement, scoped to one document.
#[derive(Clone, Debug, Default)]
pub struct ReplacementMap {
    values: HashMap<String, String>,
}

impl ReplacementMap {
    pub fn get(&self, source: &str) -> Option<&str> {
        self.values.get(&signature(source)).map(String::as_str)
    }

    pub fn insert(&mut self, source: &str, value: String) {
        self.values.insert(signature(source), value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Produces a fresh substitute for an entity of the given label.
pub trait ValueGenerator: Send + Sync {
    fn generate(&self, label: &str, rng: &mut StdRng) -> String;

    /// Whether generated values should follow the casing of the text they replace.
    fn adapts_case(&self) -> bool {
        false
    }
}

pub struct ReplacementProvider<'g> {
    generator: &'g dyn ValueGenerator,
    map: ReplacementMap,
    rng: StdRng,
    preserve_case: bool,
}

impl<'g> ReplacementProvider<'g> {
    pub fn new(generator: &'g dyn ValueGenerator, seed: u64, preserve_case: bool) -> Self {
        Self {
            generator,
            map: ReplacementMap::default(),
            rng: StdRng::seed_from_u64(seed),
            preserve_case,
        }
    }

    /// Cached value for the entity's text, generating it on first sight.
    pub fn value_for(&mut self, entity: &Entity) -> String {
        let value = match self.map.get(&entity.text) {
            Some(v) => v.to_string(),
            None => {
                let v = self.generator.generate(&entity.label, &mut self.rng);
                self.map.insert(&entity.text, v.clone());
                v
            }
        };
        if self.preserve_case && self.generator.adapts_case() {
            adapt_case(&entity.text, &value)
        } else {
            value
        }
    }

    pub fn map(&self) -> &ReplacementMap {
        &self.map
    }
}

/// All-caps source gives an all-caps value; a capitalized source capitalizes the value.
pub fn adapt_case(source: &str, value: &str) -> String {
    let source = source.trim();
    let mut cased = source.chars().filter(|c| c.is_alphabetic()).peekable();
    if cased.peek().is_some() && cased.all(|c| !c.is_lowercase()) {
        return value.to_uppercase();
    }
    if source.chars().next().is_some_and(char::is_uppercase) {
        let mut chars = value.chars();
        if let Some(first) = chars.next() {
            return first.to_uppercase().chain(chars).collect();
        }
    }
    value.to_string()
}

/// Per-document RNG seed. A configured seed is mixed with the document id so two
/// documents never share a sequence; without one the seed is random.
pub fn document_seed(base: Option<u64>, document_id: &str) -> u64 {
    match base {
        Some(seed) => {
            let digest = Sha256::digest(document_id.as_bytes());
            let mut head = [0u8; 8];
            head.copy_from_slice(&digest[..8]);
            seed ^ u64::from_le_bytes(head)
        }
        None => rand::random(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rand::Rng;

    use super::*;

    struct Counting {
        calls: AtomicUsize,
    }

    impl ValueGenerator for Counting {
        fn generate(&self, label: &str, rng: &mut StdRng) -> String {
            self.calls.fetch_add(1, Ordering::SeqCst);
            format!("{label}-{}", rng.gen_range(0..1_000_000))
        }

        fn adapts_case(&self) -> bool {
            true
        }
    }

    fn entity(text: &str, label: &str, score: f32) -> Entity {
        Entity {
            start: 0,
            end: text.chars().count(),
            label: label.into(),
            score,
            text: text.into(),
        }
    }

    #[test]
    fn signature_normalizes_whitespace_and_case() {
        assert_eq!(signature("  Jane \t Doe\n"), "jane doe");
        assert_eq!(signature("JANE DOE"), signature("jane  doe"));
    }

    #[test]
    fn same_text_same_value_regardless_of_label_or_score() {
        let gen = Counting {
            calls: AtomicUsize::new(0),
        };
        let mut p = ReplacementProvider::new(&gen, 7, false);
        let a = p.value_for(&entity("415-555-1234", "phone number", 0.91));
        let b = p.value_for(&entity("415-555-1234", "number", 0.42));
        let c = p.value_for(&entity("Boston", "location city", 0.8));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(gen.calls.load(Ordering::SeqCst), 2);
        assert_eq!(p.map().len(), 2);
    }

    #[test]
    fn case_follows_source_after_cache_lookup() {
        let gen = Counting {
            calls: AtomicUsize::new(0),
        };
        let mut p = ReplacementProvider::new(&gen, 1, true);
        let lower = p.value_for(&entity("jane doe", "name", 0.9));
        let upper = p.value_for(&entity("JANE DOE", "name", 0.9));
        let title = p.value_for(&entity("Jane  doe", "name", 0.9));
        assert_eq!(upper, lower.to_uppercase());
        assert_eq!(title, format!("N{}", &lower[1..]));
        assert_eq!(gen.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn adapt_case_rules() {
        assert_eq!(adapt_case("SMITH", "jones"), "JONES");
        assert_eq!(adapt_case("Smith", "jones"), "Jones");
        assert_eq!(adapt_case("smith", "Jones"), "Jones");
        assert_eq!(adapt_case("415-555", "x"), "x");
    }

    #[test]
    fn seeds_are_reproducible_and_document_scoped() {
        assert_eq!(document_seed(Some(42), "a.docx"), document_seed(Some(42), "a.docx"));
        assert_ne!(document_seed(Some(42), "a.docx"), document_seed(Some(42), "b.docx"));
    }
}
