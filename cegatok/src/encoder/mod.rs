use crate::{MergeTable, Pattern, SpecialTokens, Vocabulary};

mod hash;

pub(crate) use hash::HashMap;

/// Everything a codec needs to encode and decode text.
///
/// A codec shares one of these behind an `Arc`; it is only ever modified through
/// [`std::sync::Arc::make_mut`], so clones of a codec never see each other's changes.
#[derive(Clone, Debug)]
pub(crate) struct CodecParams {
    /// Learned merges, in learning order
    pub(crate) merges: MergeTable,

    /// Special token strings and their ids
    pub(crate) special_tokens: SpecialTokens,

    /// Mapping of token ids back to byte sequences, derived from `merges` and `special_tokens`
    pub(crate) vocab: Vocabulary,

    /// Regex used to break up text into words before BPE, if any
    pub(crate) pattern: Option<Pattern>,
}

impl CodecParams {
    pub(crate) fn new(
        merges: MergeTable,
        special_tokens: SpecialTokens,
        pattern: Option<Pattern>,
    ) -> Self {
        let vocab = Vocabulary::build(&merges, &special_tokens);

        Self::with_vocab(merges, special_tokens, vocab, pattern)
    }

    /// Like [`Self::new`], for callers that already have the matching vocabulary at hand.
    pub(crate) fn with_vocab(
        merges: MergeTable,
        special_tokens: SpecialTokens,
        vocab: Vocabulary,
        pattern: Option<Pattern>,
    ) -> Self {
        debug_assert_eq!(vocab.learned_len(), merges.next_id());

        Self {
            merges,
            special_tokens,
            vocab,
            pattern,
        }
    }

    /// Replace the whole special token table, keeping the vocabulary in sync.
    pub(crate) fn set_special_tokens(&mut self, special_tokens: SpecialTokens) {
        self.vocab.set_special_tokens(&special_tokens);
        self.special_tokens = special_tokens;
    }
}
