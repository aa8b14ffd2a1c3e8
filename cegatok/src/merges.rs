//! The merge table learned by training: which adjacent pairs get merged into which new tokens, and
//! in what order.
use crate::encoder::HashMap;
use crate::error::*;
use crate::{Result, TokenInt, TokenPair, BASE_VOCAB_SIZE};
use snafu::ensure;

/// Ordered mapping of token pairs to the token they merge into.
///
/// The n-th merge always produces token `256 + n`, so the id of a merge is also its rank: when
/// encoding, lower ids are applied first.  Iteration yields merges in the order they were learned.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeTable {
    /// Merged pairs in the order they were learned
    pairs: Vec<TokenPair>,

    /// Reverse lookup from a pair to the token it was merged into
    ranks: HashMap<TokenPair, TokenInt>,
}

impl MergeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a merge table from pairs in learning order.
    ///
    /// Fails if a pair refers to a token that doesn't exist when that pair is added, or if the same
    /// pair appears twice.
    pub fn from_pairs(pairs: impl IntoIterator<Item = TokenPair>) -> Result<Self> {
        let mut merges = Self::new();
        for pair in pairs {
            merges.push(pair)?;
        }

        Ok(merges)
    }

    /// Add a merge for `pair`, returning the id of the new token.
    pub fn push(&mut self, pair: TokenPair) -> Result<TokenInt> {
        let next_id = self.next_id();
        ensure!(
            pair.0 < next_id && pair.1 < next_id,
            UndefinedMergeTokenSnafu { pair, next_id }
        );
        if let Some(&existing) = self.ranks.get(&pair) {
            return DuplicateMergeSnafu { pair, existing }.fail();
        }

        Ok(self.push_learned(pair))
    }

    /// Add a merge that training just picked from the current token sequence.
    ///
    /// Both tokens of such a pair always exist already, and a merged pair never shows up in the
    /// sequence again, so there's nothing to check.
    pub(crate) fn push_learned(&mut self, pair: TokenPair) -> TokenInt {
        let id = self.next_id();
        debug_assert!(pair.0 < id && pair.1 < id);
        debug_assert!(!self.ranks.contains_key(&pair));

        self.pairs.push(pair);
        self.ranks.insert(pair, id);

        id
    }

    /// The id of the token that `pair` merges into, if `pair` is in the table.
    pub fn rank(&self, pair: TokenPair) -> Option<TokenInt> {
        self.ranks.get(&pair).copied()
    }

    /// The pair that was merged to produce `token`, if `token` is a merged token.
    pub fn pair_for_token(&self, token: TokenInt) -> Option<TokenPair> {
        token
            .checked_sub(BASE_VOCAB_SIZE)
            .and_then(|index| self.pairs.get(index))
            .copied()
    }

    /// The id the next merge will get.
    pub fn next_id(&self) -> TokenInt {
        BASE_VOCAB_SIZE + self.pairs.len()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// All merges and their token ids, in learning order.
    pub fn iter(&self) -> impl Iterator<Item = (TokenPair, TokenInt)> + '_ {
        self.pairs
            .iter()
            .enumerate()
            .map(|(index, pair)| (*pair, BASE_VOCAB_SIZE + index))
    }
}
