/// A token output by the tokenizer, represented in its integer form.
///
/// The id space is split three ways: `0..256` are the base tokens, one per possible byte value,
/// `256..N` are the tokens learned by merging pairs during training, and special tokens use
/// whatever ids the caller assigned to them.  For learned tokens the id is also the merge rank:
/// lower ids were learned earlier and are applied first when encoding.
pub type TokenInt = usize;

/// A token represented in its byte string form, as stored in the vocabulary.
pub type TokenString = Vec<u8>;

/// The number of base tokens, one per byte value.  The first learned merge gets this id.
pub const BASE_VOCAB_SIZE: usize = 256;

/// Two tokens that appear next to each other in a token sequence, left one first.
///
/// Pairs order by the left token then the right token.  Training relies on this ordering to break
/// ties between equally frequent pairs, so it must never change.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct TokenPair(pub TokenInt, pub TokenInt);

impl std::fmt::Display for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.0, self.1)
    }
}
