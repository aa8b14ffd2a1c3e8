//! Special tokens: out-of-band strings like separators or mask markers that the caller assigns
//! fixed ids to, and that are never produced by merge learning.
use crate::encoder::HashMap;
use crate::error::*;
use crate::{Result, TokenInt};
use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use snafu::ensure;
use std::ops::Range;

/// The special token strings of a codec and their ids, in registration order.
#[derive(Clone, Debug)]
pub struct SpecialTokens {
    /// Token strings and ids in the order they were registered.  Pattern `i` of `finder` is
    /// `tokens[i]`
    tokens: Vec<(String, TokenInt)>,

    encode: HashMap<String, TokenInt>,
    decode: HashMap<TokenInt, String>,

    /// A/C automaton for finding special tokens in text.
    ///
    /// Uses leftmost-longest semantics, so if one special token is a prefix of another one that
    /// also matches at the same position, the longer one wins.
    finder: AhoCorasick,
}

impl SpecialTokens {
    /// Build the table from `(string, id)` pairs.
    ///
    /// Each string must be non-empty and free of line breaks (the model file stores one token per
    /// line), and no two strings may share an id.  Registering the same string twice keeps the last
    /// id.
    pub fn new<Iter, S>(tokens: Iter) -> Result<Self>
    where
        Iter: IntoIterator<Item = (S, TokenInt)>,
        S: Into<String>,
    {
        let mut ordered: Vec<(String, TokenInt)> = Vec::new();
        let mut encode = HashMap::default();

        for (token, id) in tokens {
            let token = token.into();
            ensure!(!token.is_empty(), AmbiguousSpecialTokenSplitSnafu);
            ensure!(
                !token.contains(['\n', '\r']),
                InvalidSpecialTokenSnafu { token }
            );

            if encode.insert(token.clone(), id).is_some() {
                ordered.retain(|(existing, _)| existing != &token);
            }
            ordered.push((token, id));
        }

        let mut decode = HashMap::default();
        for (token, id) in &ordered {
            if let Some(other) = decode.insert(*id, token.clone()) {
                return DuplicateSpecialTokenIdSnafu {
                    token: token.clone(),
                    other,
                    id: *id,
                }
                .fail();
            }
        }

        Ok(Self::assemble(ordered, encode, decode))
    }

    /// A table with no special tokens
    pub fn empty() -> Self {
        Self::assemble(Vec::new(), HashMap::default(), HashMap::default())
    }

    fn assemble(
        tokens: Vec<(String, TokenInt)>,
        encode: HashMap<String, TokenInt>,
        decode: HashMap<TokenInt, String>,
    ) -> Self {
        let finder = AhoCorasickBuilder::new()
            .match_kind(MatchKind::LeftmostLongest)
            .dfa(true)
            .build(tokens.iter().map(|(token, _)| token.as_str()));

        Self {
            tokens,
            encode,
            decode,
            finder,
        }
    }

    /// The special token strings and their ids, in registration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, TokenInt)> {
        self.tokens.iter().map(|(token, id)| (token.as_str(), *id))
    }

    pub fn token_for_str(&self, token: &str) -> Option<TokenInt> {
        self.encode.get(token).copied()
    }

    pub fn str_for_token(&self, token: TokenInt) -> Option<&str> {
        self.decode.get(&token).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Find the leftmost special token in `text`, returning its byte range and id.
    pub fn find(&self, text: &str) -> Option<(Range<usize>, TokenInt)> {
        if self.is_empty() {
            return None;
        }

        self.finder
            .find(text)
            .map(|m| (m.start()..m.end(), self.tokens[m.pattern()].1))
    }
}

impl PartialEq for SpecialTokens {
    fn eq(&self, other: &Self) -> bool {
        // Everything else is derived from the token list
        self.tokens == other.tokens
    }
}

impl Eq for SpecialTokens {}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn lookups_work_both_ways() {
        let special = SpecialTokens::new([("<SEP>", 1000), ("<MASK>", 1001)]).unwrap();

        assert_eq!(2, special.len());
        assert_eq!(Some(1000), special.token_for_str("<SEP>"));
        assert_eq!(Some("<MASK>"), special.str_for_token(1001));
        assert_eq!(None, special.token_for_str("<CLS>"));
        assert_eq!(None, special.str_for_token(97));
        assert_eq!(
            vec![("<SEP>", 1000), ("<MASK>", 1001)],
            special.iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn finds_leftmost_token() {
        let special = SpecialTokens::new([("<SEP>", 1000), ("<MASK>", 1001)]).unwrap();

        assert_eq!(Some((4..10, 1001)), special.find("abc <MASK> <SEP>"));
        assert_eq!(Some((0..5, 1000)), special.find("<SEP>"));
        assert_eq!(None, special.find("no tokens here <SEP"));
    }

    #[test]
    fn prefers_longest_match() {
        let special = SpecialTokens::new([("<|end|>", 1), ("<|end|>>", 2)]).unwrap();

        assert_eq!(Some((1..9, 2)), special.find("x<|end|>>"));
        assert_eq!(Some((1..8, 1)), special.find("x<|end|>"));
    }

    #[test]
    fn empty_table_finds_nothing() {
        let special = SpecialTokens::empty();

        assert!(special.is_empty());
        assert_eq!(None, special.find("anything"));
    }

    #[test]
    fn reregistering_a_string_keeps_last_id() {
        let special = SpecialTokens::new([("<SEP>", 1000), ("<CLS>", 1001), ("<SEP>", 1002)]).unwrap();

        assert_eq!(
            vec![("<CLS>", 1001), ("<SEP>", 1002)],
            special.iter().collect::<Vec<_>>()
        );
        assert_eq!(None, special.str_for_token(1000));
    }

    #[test]
    fn rejects_invalid_tables() {
        assert_matches!(
            SpecialTokens::new([("", 1000)]),
            Err(CegatokError::AmbiguousSpecialTokenSplit)
        );
        assert_matches!(
            SpecialTokens::new([("<A>\n", 1000)]),
            Err(CegatokError::InvalidSpecialToken { .. })
        );
        assert_matches!(
            SpecialTokens::new([("<A>", 1000), ("<B>", 1000)]),
            Err(CegatokError::DuplicateSpecialTokenId { id: 1000, .. })
        );
    }
}
