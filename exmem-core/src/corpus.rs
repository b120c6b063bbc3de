//! Serialized corpus — the JSON shape of initial input and final snapshots.
//!
//! ```json
//! {
//!   "apple": { "frequency": 9, "exemplars": { "1.2": [0.31, 1.0], "3.0": [0.8] } },
//!   "pear":  { "frequency": 2, "exemplars": [1.0, 2.5, 2.5] }
//! }
//! ```
//!
//! Exemplar values arrive as JSON object keys, i.e. strings. They are parsed
//! here and nowhere else; the numerical core only ever sees `f64`. A flat
//! list of values is accepted as shorthand for one unit-strength occurrence
//! each, and the legacy `{"Category": {"words": {...}}}` wrapper is
//! unwrapped on load. Output always uses the keyed form so a final snapshot
//! can seed the next run.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ExmemError, Result};
use crate::types::FRESH_STRENGTH;

/// Exemplars of one word as they appear on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExemplarSet {
    /// `{"<value>": [strength, ...]}`.
    Weighted(BTreeMap<String, Vec<f64>>),
    /// `[value, ...]`, each occurrence at unit strength.
    Flat(Vec<f64>),
}

/// One word's serialized entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordEntry {
    /// Occurrence frequency class; drives sampling weight and grouping.
    pub frequency: u32,
    /// Stored exemplars.
    pub exemplars: ExemplarSet,
}

/// Parsed exemplar trace: `(value, strengths)` pairs.
pub type ParsedTraces = Vec<(f64, Vec<f64>)>;

impl WordEntry {
    /// Parse this entry's exemplars into numeric `(value, strengths)` pairs.
    ///
    /// # Errors
    /// Returns [`ExmemError::MalformedCorpus`] for an empty exemplar set,
    /// unparseable keys, empty strength lists, or non-positive strengths.
    pub fn parse_traces(&self, word: &str) -> Result<ParsedTraces> {
        let malformed = |reason: String| ExmemError::MalformedCorpus {
            word: word.to_string(),
            reason,
        };

        let traces: ParsedTraces = match &self.exemplars {
            ExemplarSet::Weighted(map) => map
                .iter()
                .map(|(key, strengths)| {
                    let value = parse_value(key)
                        .ok_or_else(|| malformed(format!("exemplar key '{key}' is not a number")))?;
                    Ok((value, strengths.clone()))
                })
                .collect::<Result<_>>()?,
            ExemplarSet::Flat(values) => values.iter().map(|&v| (v, vec![FRESH_STRENGTH])).collect(),
        };

        if traces.is_empty() {
            return Err(malformed("exemplar set is empty".into()));
        }
        for (value, strengths) in &traces {
            if !value.is_finite() {
                return Err(malformed(format!("exemplar value {value} is not finite")));
            }
            if strengths.is_empty() {
                return Err(malformed(format!("exemplar {value} has no strengths")));
            }
            if let Some(bad) = strengths.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
                return Err(malformed(format!(
                    "exemplar {value} has non-positive strength {bad}"
                )));
            }
        }
        Ok(traces)
    }
}

/// A whole corpus: word identifier → entry, in identifier order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Corpus {
    /// Entries keyed by word identifier.
    pub words: BTreeMap<String, WordEntry>,
}

/// Accepted top-level input shapes.
#[derive(Deserialize)]
#[serde(untagged)]
enum CorpusInput {
    Legacy {
        #[serde(rename = "Category")]
        category: LegacyCategory,
    },
    Plain(BTreeMap<String, WordEntry>),
}

#[derive(Deserialize)]
struct LegacyCategory {
    words: BTreeMap<String, WordEntry>,
}

impl Corpus {
    /// Parse a corpus from JSON text.
    ///
    /// # Errors
    /// Returns [`ExmemError::Serialization`] if the text matches neither
    /// accepted shape (including entries missing `frequency`).
    pub fn from_json_str(json: &str) -> Result<Self> {
        let words = match serde_json::from_str::<CorpusInput>(json)? {
            CorpusInput::Legacy { category } => category.words,
            CorpusInput::Plain(words) => words,
        };
        Ok(Self { words })
    }

    /// Load a corpus from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let corpus = Self::from_json_str(&content)?;
        info!(path = %path.display(), words = corpus.words.len(), "corpus loaded");
        Ok(corpus)
    }

    /// Render as pretty-printed JSON in the keyed form.
    ///
    /// # Errors
    /// Returns [`ExmemError::Serialization`] on encoder failure.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Number of words.
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Whether the corpus holds no words.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Parse a serialized exemplar key.
#[must_use]
pub fn parse_value(key: &str) -> Option<f64> {
    key.trim().parse::<f64>().ok()
}

/// Format an exemplar value as a key: integral values keep one decimal
/// (`3.0`), everything else uses the shortest round-tripping form (`1.2`).
#[must_use]
pub fn format_value(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}
