//! Learning a merge table from a training corpus.
//!
//! This is the naive algorithm: every iteration re-counts all adjacent pairs of the corpus, picks
//! the most frequent one and merges it everywhere.  That's O(vocab size * corpus length), which is
//! fine for the corpus sizes this is used with.
use crate::bpe::{self, PairCounts};
use crate::error::*;
use crate::iterator::WordIterator;
use crate::{
    Codec, CodecParams, MergeTable, Pattern, Result, SpecialTokens, TokenInt, TokenPair,
    Vocabulary, BASE_VOCAB_SIZE,
};
use snafu::ensure;
use std::borrow::Cow;
use tracing::*;

/// Training configuration: how big the vocabulary may get, and how to split the corpus into words.
#[derive(Clone, Debug)]
pub struct Trainer {
    vocab_size: usize,
    pattern: Option<Pattern>,
}

impl Trainer {
    /// Train up to `vocab_size` tokens, including the 256 base tokens.
    ///
    /// Training may stop before reaching `vocab_size`, when no pair occurs more than once.
    pub fn new(vocab_size: usize) -> Result<Self> {
        ensure!(
            vocab_size >= BASE_VOCAB_SIZE,
            InvalidConfigurationSnafu {
                reason: format!(
                    "vocab size {vocab_size} is smaller than the {BASE_VOCAB_SIZE} base byte tokens"
                )
            }
        );

        Ok(Self {
            vocab_size,
            pattern: None,
        })
    }

    /// Split the corpus into words with `pattern` before training.
    ///
    /// Pairs are counted across all words but never across word boundaries.  The pattern is stored
    /// in the trained codec and applied the same way when encoding.
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self> {
        self.pattern = Pattern::parse_optional(pattern)?;

        Ok(self)
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    /// Learn a codec from UTF-8 text.
    pub fn train(&self, text: &str) -> Codec {
        let words: Vec<&[u8]> = match &self.pattern {
            Some(pattern) => WordIterator::new(Some(pattern), text)
                .map(str::as_bytes)
                .collect(),
            None => vec![text.as_bytes()],
        };

        self.train_words(words)
    }

    /// Learn a codec from raw bytes.
    ///
    /// Without a pattern any byte sequence is valid input.  With a pattern the bytes have to be
    /// split as text, so invalid UTF-8 is replaced first.
    pub fn train_bytes(&self, bytes: &[u8]) -> Codec {
        if self.pattern.is_none() {
            return self.train_words(vec![bytes]);
        }

        let text = String::from_utf8_lossy(bytes);
        if let Cow::Owned(_) = &text {
            // The training corpus wasn't entirely valid UTF-8, so the invalid bytes were replaced
            // with a placeholder before splitting it into words.
            warn!(
                len = bytes.len(),
                "Training input did not decode as clean UTF-8.  \
                Invalid bytes have been replaced with a UTF-8 placeholder sequence"
            );
        }

        self.train(&text)
    }

    fn train_words(&self, words: Vec<&[u8]>) -> Codec {
        let mut state = TrainingState::new(words);

        while state.merges.next_id() < self.vocab_size {
            match state.merge_most_frequent() {
                Some((pair, count, token)) => {
                    trace!(%pair, count, token, "Merged pair");
                }
                None => {
                    debug!(
                        next_id = state.merges.next_id(),
                        "No pair occurs more than once; stopping early"
                    );
                    break;
                }
            }
        }

        info!(
            requested_vocab_size = self.vocab_size,
            vocab_size = state.vocab.learned_len(),
            merges = state.merges.len(),
            "Training finished"
        );

        Codec::from_params(CodecParams::with_vocab(
            state.merges,
            SpecialTokens::empty(),
            state.vocab,
            self.pattern.clone(),
        ))
    }
}

/// The state that one training run mutates in place
struct TrainingState {
    /// The corpus, one token sequence per word
    words: Vec<Vec<TokenInt>>,

    merges: MergeTable,
    vocab: Vocabulary,
}

impl TrainingState {
    fn new(words: Vec<&[u8]>) -> Self {
        Self {
            words: words
                .into_iter()
                .filter(|word| word.len() >= 2)
                .map(|word| word.iter().map(|&byte| TokenInt::from(byte)).collect())
                .collect(),
            merges: MergeTable::new(),
            vocab: Vocabulary::base(),
        }
    }

    /// Find the most frequent pair and merge it everywhere.
    ///
    /// Returns the pair, how often it occurred and its new token, or `None` without changing
    /// anything if no pair occurs at least twice.
    fn merge_most_frequent(&mut self) -> Option<(TokenPair, usize, TokenInt)> {
        let mut counts = PairCounts::default();
        for word in &self.words {
            bpe::count_pairs_into(&mut counts, word);
        }

        let (pair, count) = bpe::most_frequent(&counts)?;
        if count < 2 {
            // Merging a pair that occurs once doesn't compress anything
            return None;
        }

        let token = self.merges.push_learned(pair);
        let vocab_token = self.vocab.push_merge(pair);
        debug_assert_eq!(token, vocab_token);

        for word in &mut self.words {
            *word = bpe::apply_merge(word, pair, token);
        }
        self.words.retain(|word| word.len() >= 2);

        Some((pair, count, token))
    }
}
