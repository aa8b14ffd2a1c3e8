//! The vocabulary maps every token id a codec knows about to the bytes it stands for.
use crate::{MergeTable, SpecialTokens, TokenInt, TokenPair, TokenString};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Token id to byte sequence lookup.
///
/// This is always derived from a merge table and a special token table, never edited directly:
/// base tokens are their own byte, each merged token is the concatenation of the two tokens it
/// merged, and each special token is its UTF-8 string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Vocabulary {
    /// Base and merged tokens; the index is the token id
    tokens: Vec<TokenString>,

    /// Special tokens, ordered by id
    special: BTreeMap<TokenInt, TokenString>,
}

impl Vocabulary {
    /// A vocabulary of just the 256 base tokens
    pub fn base() -> Self {
        Self {
            tokens: (0..=u8::MAX).map(|byte| vec![byte]).collect(),
            special: BTreeMap::new(),
        }
    }

    /// Build the full vocabulary for a merge table and a set of special tokens.
    pub fn build(merges: &MergeTable, special_tokens: &SpecialTokens) -> Self {
        let mut vocab = Self::base();
        for (pair, _) in merges.iter() {
            vocab.push_merge(pair);
        }
        vocab.set_special_tokens(special_tokens);

        vocab
    }

    /// Add the token produced by the next merge, which must be `pair`.
    ///
    /// Returns the id of the new token.  Both halves of the pair must already be base or merged
    /// tokens.
    pub(crate) fn push_merge(&mut self, pair: TokenPair) -> TokenInt {
        let mut bytes = Vec::with_capacity(self.tokens[pair.0].len() + self.tokens[pair.1].len());
        bytes.extend_from_slice(&self.tokens[pair.0]);
        bytes.extend_from_slice(&self.tokens[pair.1]);

        self.tokens.push(bytes);
        self.tokens.len() - 1
    }

    /// Replace all of the special tokens in this vocabulary
    pub(crate) fn set_special_tokens(&mut self, special_tokens: &SpecialTokens) {
        self.special = special_tokens
            .iter()
            .map(|(token, id)| (id, token.as_bytes().to_vec()))
            .collect();
    }

    /// The bytes of `token`, or `None` if this vocabulary doesn't know `token`.
    ///
    /// If a special token was given the same id as a base or merged token, the special token wins.
    pub fn bytes_for_token(&self, token: TokenInt) -> Option<&[u8]> {
        self.special
            .get(&token)
            .or_else(|| self.tokens.get(token))
            .map(Vec::as_slice)
    }

    /// Number of distinct token ids, special tokens included.
    ///
    /// A special token that reuses a base or merged id replaces that entry rather than adding one.
    pub fn len(&self) -> usize {
        self.tokens.len() + self.special_tail().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of base and merged tokens, that is one more than the highest learned id
    pub fn learned_len(&self) -> usize {
        self.tokens.len()
    }

    /// All entries in ascending id order, each id once: base tokens, merged tokens, then special
    /// tokens.
    ///
    /// Like [`Self::bytes_for_token`], a special token shadows a learned token with the same id.
    pub fn iter(&self) -> impl Iterator<Item = (TokenInt, &[u8])> {
        self.tokens
            .iter()
            .enumerate()
            .map(|(id, bytes)| {
                let bytes = self.special.get(&id).unwrap_or(bytes);
                (id, bytes.as_slice())
            })
            .chain(self.special_tail().map(|(id, bytes)| (*id, bytes.as_slice())))
    }

    /// Special tokens whose ids are past the learned tokens
    fn special_tail(&self) -> std::collections::btree_map::Range<'_, TokenInt, TokenString> {
        self.special.range(self.tokens.len()..)
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::base()
    }
}

/// Render a token's bytes for people to read.
///
/// Invalid UTF-8 shows up as the replacement character.  Every character in the Unicode "Other"
/// categories (controls, format characters like zero width spaces, private use and unassigned
/// code points) is escaped as `\uXXXX`, so every token renders visibly on a single line.
pub fn render_token(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .map(|c| {
            if is_other_char(c) {
                format!("\\u{:04x}", c as u32)
            } else {
                c.to_string()
            }
        })
        .collect()
}

fn is_other_char(c: char) -> bool {
    static OTHER: OnceLock<fancy_regex::Regex> = OnceLock::new();
    let other =
        OTHER.get_or_init(|| fancy_regex::Regex::new(r"\p{C}").expect("BUG: Invalid regex"));

    let mut buf = [0u8; 4];
    other
        .is_match(c.encode_utf8(&mut buf))
        .unwrap_or_else(|_| c.is_control())
}
