//! The word population — every word, its frequency class and exemplar store.
//!
//! A [`Population`] is the explicit simulation state that every component
//! borrows: the sampler reads frequencies, the driver decays and reinforces
//! stores, the tracker reads strengths to recompute statistics.

use std::collections::BTreeMap;

use tracing::debug;

use crate::bins::BinScheme;
use crate::corpus::{Corpus, ExemplarSet, WordEntry, format_value};
use crate::error::{ExmemError, Result};
use crate::store::ExemplarStore;
use crate::types::{GroupId, WordIndex};

/// One word of the population.
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    /// Identifier from the corpus.
    pub id: String,
    /// Static frequency class.
    pub frequency: u32,
    /// Group under the population's bin scheme.
    pub group: GroupId,
    /// Remembered exemplars.
    pub store: ExemplarStore,
}

/// All words of a run, in corpus identifier order.
#[derive(Debug, Clone, PartialEq)]
pub struct Population {
    words: Vec<Word>,
    scheme: BinScheme,
}

impl Population {
    /// Build the population from a parsed corpus.
    ///
    /// # Errors
    /// Returns [`ExmemError::MalformedCorpus`] if the corpus is empty, a
    /// word's exemplars are invalid, or its frequency does not fit `scheme`.
    pub fn from_corpus(corpus: &Corpus, scheme: BinScheme) -> Result<Self> {
        if corpus.is_empty() {
            return Err(ExmemError::MalformedCorpus {
                word: String::new(),
                reason: "corpus contains no words".into(),
            });
        }

        let mut words = Vec::with_capacity(corpus.len());
        for (id, entry) in &corpus.words {
            let group = scheme
                .group_of(entry.frequency)
                .map_err(|e| ExmemError::MalformedCorpus {
                    word: id.clone(),
                    reason: e.to_string(),
                })?;

            let mut store = ExemplarStore::new();
            for (value, strengths) in entry.parse_traces(id)? {
                store.insert_trace(value, &strengths);
            }

            words.push(Word {
                id: id.clone(),
                frequency: entry.frequency,
                group,
                store,
            });
        }

        debug!(words = words.len(), %scheme, "population built");
        Ok(Self { words, scheme })
    }

    /// Serialize the current stores back into corpus form.
    #[must_use]
    pub fn to_corpus(&self) -> Corpus {
        let words = self
            .words
            .iter()
            .map(|word| {
                let exemplars: BTreeMap<String, Vec<f64>> = word
                    .store
                    .traces()
                    .map(|(value, strengths)| (format_value(value), strengths.to_vec()))
                    .collect();
                (
                    word.id.clone(),
                    WordEntry {
                        frequency: word.frequency,
                        exemplars: ExemplarSet::Weighted(exemplars),
                    },
                )
            })
            .collect();
        Corpus { words }
    }

    /// Bin scheme the groups were assigned with.
    #[must_use]
    pub fn scheme(&self) -> BinScheme {
        self.scheme
    }

    /// All words.
    #[must_use]
    pub fn words(&self) -> &[Word] {
        &self.words
    }

    /// Number of words.
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Whether there are no words (never true for a loaded population).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Borrow one word.
    #[must_use]
    pub fn word(&self, index: WordIndex) -> &Word {
        &self.words[index.0]
    }

    /// Mutably borrow one word.
    pub fn word_mut(&mut self, index: WordIndex) -> &mut Word {
        &mut self.words[index.0]
    }

    /// Look a word up by identifier.
    #[must_use]
    pub fn find(&self, id: &str) -> Option<WordIndex> {
        self.words
            .binary_search_by(|w| w.id.as_str().cmp(id))
            .ok()
            .map(WordIndex)
    }

    /// Decay every strength of every word by `rate`.
    pub fn decay(&mut self, rate: f64) {
        for word in &mut self.words {
            word.store.decay(rate);
        }
    }

    /// Total number of live strength entries.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.words.iter().map(|w| w.store.entry_count()).sum()
    }

    /// Identifier of the first word whose store is empty, if any.
    #[must_use]
    pub fn first_empty_store(&self) -> Option<&str> {
        self.words
            .iter()
            .find(|w| w.store.is_empty())
            .map(|w| w.id.as_str())
    }

    /// Identifier of the first word holding an entry whose strength is not
    /// exactly 1, if any.
    #[must_use]
    pub fn first_weighted_store(&self) -> Option<&str> {
        self.words
            .iter()
            .find(|w| w.store.traces().any(|(_, list)| list.iter().any(|&s| s != 1.0)))
            .map(|w| w.id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Corpus {
        Corpus::from_json_str(
            r#"{
                "b": {"frequency": 9, "exemplars": {"2.0": [1.0, 0.5]}},
                "a": {"frequency": 2, "exemplars": [1.0, 1.0, 3.5]}
            }"#,
        )
        .expect("valid corpus")
    }

    #[test]
    fn builds_words_in_identifier_order() {
        let pop = Population::from_corpus(&corpus(), BinScheme::TwoWay).expect("valid");
        assert_eq!(pop.len(), 2);
        assert_eq!(pop.words()[0].id, "a");
        assert_eq!(pop.words()[0].group, 0);
        assert_eq!(pop.words()[1].group, 1);
        assert_eq!(pop.find("b"), Some(WordIndex(1)));
        assert_eq!(pop.find("zzz"), None);
    }

    #[test]
    fn flat_duplicates_accumulate_strength() {
        let pop = Population::from_corpus(&corpus(), BinScheme::TwoWay).expect("valid");
        let a = pop.word(WordIndex(0));
        assert_eq!(a.store.strengths(1.0), Some(&[1.0, 1.0][..]));
        assert_eq!(a.store.strengths(3.5), Some(&[1.0][..]));
    }

    #[test]
    fn strengths_are_sorted_on_load() {
        let pop = Population::from_corpus(&corpus(), BinScheme::TwoWay).expect("valid");
        let b = pop.word(WordIndex(1));
        assert_eq!(b.store.strengths(2.0), Some(&[0.5, 1.0][..]));
    }

    #[test]
    fn decay_reaches_every_word() {
        let mut pop = Population::from_corpus(&corpus(), BinScheme::TwoWay).expect("valid");
        pop.decay(0.5);
        assert_eq!(pop.word(WordIndex(0)).store.strengths(3.5), Some(&[0.5][..]));
        assert_eq!(pop.word(WordIndex(1)).store.strengths(2.0), Some(&[0.25, 0.5][..]));
    }

    #[test]
    fn frequency_outside_scheme_is_malformed() {
        let corpus = Corpus::from_json_str(r#"{"x": {"frequency": 20, "exemplars": [1.0]}}"#)
            .expect("shape is fine");
        let err = Population::from_corpus(&corpus, BinScheme::TwelveWay).unwrap_err();
        assert!(matches!(err, ExmemError::MalformedCorpus { ref word, .. } if word == "x"));
    }

    #[test]
    fn empty_corpus_is_malformed() {
        assert!(Population::from_corpus(&Corpus::default(), BinScheme::TwoWay).is_err());
    }

    #[test]
    fn weighted_store_is_found() {
        let pop = Population::from_corpus(&corpus(), BinScheme::TwoWay).expect("valid");
        assert_eq!(pop.first_weighted_store(), Some("b"));
        let flat = Corpus::from_json_str(r#"{"a": {"frequency": 1, "exemplars": [1.0, 2.0]}}"#)
            .expect("valid corpus");
        let pop = Population::from_corpus(&flat, BinScheme::TwoWay).expect("valid");
        assert_eq!(pop.first_weighted_store(), None);
    }

    #[test]
    fn corpus_round_trip_keeps_stores() {
        let pop = Population::from_corpus(&corpus(), BinScheme::TwoWay).expect("valid");
        let again = Population::from_corpus(&pop.to_corpus(), BinScheme::TwoWay).expect("valid");
        assert_eq!(pop, again);
    }
}
