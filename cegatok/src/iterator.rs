//! Contains the implementation of the bulk of the encoding logic, implemented as a Rust
//! [`Iterator`].
//!
//! Text is first split on special tokens (when requested), then each remaining chunk is split into
//! words by the optional pre-tokenization pattern, and finally each word is broken up into tokens
//! with BPE.

use crate::error::*;
use crate::{bpe, CodecParams, Result, SpecialTokens, TokenInt};
use snafu::{ensure, ResultExt};
use std::collections::VecDeque;
use std::ops::Range;
use tracing::*;

/// A regex that splits text into words before BPE is applied.
///
/// Merges are never learned or applied across word boundaries.  This uses `fancy_regex` so that
/// the usual GPT-style word patterns with look-around work.
#[derive(Clone, Debug)]
pub struct Pattern(fancy_regex::Regex);

impl Pattern {
    pub fn new(pattern: &str) -> Result<Self> {
        // Model files store the pattern on a single line
        ensure!(
            !pattern.contains(['\n', '\r']),
            InvalidConfigurationSnafu {
                reason: "the pre-tokenization pattern can't contain a line break; use \\n or \\r instead"
            }
        );
        let regex = fancy_regex::Regex::new(pattern).context(InvalidPatternSnafu { pattern })?;

        Ok(Self(regex))
    }

    /// Parse the pattern as stored in a model file, where the empty string means no pattern.
    pub fn parse_optional(pattern: &str) -> Result<Option<Self>> {
        if pattern.is_empty() {
            Ok(None)
        } else {
            Self::new(pattern).map(Some)
        }
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Pattern {}

/// Applies the pre-tokenization pattern to get the next "word" of the text.
///
/// Text that the pattern doesn't match is not dropped: each gap between two matches is yielded as
/// a word of its own, so the words always add up to the whole text.  Without a pattern the whole
/// text is one word.
pub(crate) struct WordIterator<'r, 't> {
    text: &'t str,

    /// `None` when there is no pattern, or when matching failed and the rest of the text is treated
    /// as one word
    matches: Option<fancy_regex::Matches<'r, 't>>,

    /// The offset into `text` where the next word starts
    pos: usize,

    /// A match found after a gap, to be yielded after the gap itself
    pending: Option<Range<usize>>,
}

impl<'r, 't> WordIterator<'r, 't> {
    pub(crate) fn new(pattern: Option<&'r Pattern>, text: &'t str) -> Self {
        Self {
            text,
            matches: pattern.map(|pattern| pattern.0.find_iter(text)),
            pos: 0,
            pending: None,
        }
    }

    fn next_match(&mut self) -> Option<Range<usize>> {
        let matches = self.matches.as_mut()?;
        loop {
            match matches.next()? {
                Ok(m) if m.start() == m.end() => continue,
                Ok(m) => return Some(m.start()..m.end()),
                Err(e) => {
                    warn!(err = %e, pos = self.pos,
                        "Pre-tokenization pattern failed to match; treating the rest of the text as one word");
                    self.matches = None;
                    return None;
                }
            }
        }
    }
}

impl<'r, 't> Iterator for WordIterator<'r, 't> {
    type Item = &'t str;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(range) = self.pending.take() {
            self.pos = range.end;
            return Some(&self.text[range]);
        }

        match self.next_match() {
            Some(range) if range.start > self.pos => {
                let gap = self.pos..range.start;
                self.pos = range.start;
                self.pending = Some(range);
                Some(&self.text[gap])
            }
            Some(range) => {
                self.pos = range.end;
                Some(&self.text[range])
            }
            None if self.pos < self.text.len() => {
                let rest = self.pos..self.text.len();
                self.pos = self.text.len();
                Some(&self.text[rest])
            }
            None => None,
        }
    }
}

/// A piece of the input text after splitting it on special tokens
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Chunk<'t> {
    /// Ordinary text, to be encoded with BPE
    Text(&'t str),

    /// A special token found in the text, already resolved to its id
    Special(TokenInt),
}

/// Splits text into ordinary text and special tokens in a single left to right pass.
///
/// Without a special token table the whole text is a single [`Chunk::Text`].
pub(crate) struct SpecialSplitIterator<'a, 't> {
    special_tokens: Option<&'a SpecialTokens>,
    text: &'t str,
    pos: usize,

    /// Special token found after some ordinary text, to be yielded after that text
    pending: Option<TokenInt>,
}

impl<'a, 't> SpecialSplitIterator<'a, 't> {
    pub(crate) fn new(special_tokens: Option<&'a SpecialTokens>, text: &'t str) -> Self {
        Self {
            special_tokens,
            text,
            pos: 0,
            pending: None,
        }
    }
}

impl<'a, 't> Iterator for SpecialSplitIterator<'a, 't> {
    type Item = Chunk<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(token) = self.pending.take() {
            return Some(Chunk::Special(token));
        }

        let rest = &self.text[self.pos..];
        if rest.is_empty() {
            return None;
        }

        match self.special_tokens.and_then(|special| special.find(rest)) {
            Some((range, token)) => {
                self.pos += range.end;
                if range.start == 0 {
                    Some(Chunk::Special(token))
                } else {
                    self.pending = Some(token);
                    Some(Chunk::Text(&rest[..range.start]))
                }
            }
            None => {
                self.pos = self.text.len();
                Some(Chunk::Text(rest))
            }
        }
    }
}

/// The iterator which yields the tokens of a string of text.
///
/// See [`crate::Codec::encode`]
pub struct EncodeIterator<'a> {
    params: &'a CodecParams,
    chunks: SpecialSplitIterator<'a, 'a>,

    /// Words of the current text chunk
    words: Option<WordIterator<'a, 'a>>,

    /// Tokens of the current word that haven't been yielded yet
    current_word_tokens: VecDeque<TokenInt>,
}

impl<'a> EncodeIterator<'a> {
    pub(crate) fn new(params: &'a CodecParams, text: &'a str, include_special: bool) -> Self {
        let special_tokens = include_special.then_some(&params.special_tokens);

        Self {
            params,
            chunks: SpecialSplitIterator::new(special_tokens, text),
            words: None,
            current_word_tokens: VecDeque::new(),
        }
    }
}

impl<'a> Iterator for EncodeIterator<'a> {
    type Item = TokenInt;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            // If there are still tokens left from a previously encoded word, use one of them
            if let Some(token) = self.current_word_tokens.pop_front() {
                return Some(token);
            }

            if let Some(word) = self.words.as_mut().and_then(Iterator::next) {
                self.current_word_tokens
                    .extend(bpe::byte_pair_encode(word.as_bytes(), &self.params.merges));
                continue;
            }

            // This chunk is exhausted (or there wasn't one yet), move on to the next one.  End of
            // the line when there are no more chunks.
            match self.chunks.next()? {
                Chunk::Special(token) => return Some(token),
                Chunk::Text(text) => {
                    self.words = Some(WordIterator::new(self.params.pattern.as_ref(), text));
                }
            }
        }
    }
}
