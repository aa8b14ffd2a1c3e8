//! Implementation of the building blocks of BPE (byte pair encoding): counting adjacent pairs,
//! merging a pair into a new token, and encoding a word with an already learned merge table.
use crate::encoder::HashMap;
use crate::{MergeTable, TokenInt, TokenPair};

/// Number of times each adjacent pair occurs in one or more token sequences.
pub type PairCounts = HashMap<TokenPair, usize>;

/// Count every adjacent pair in `tokens`.
///
/// A sequence of length `L` contributes `L - 1` pairs, so empty and single-token sequences produce
/// an empty map.
pub fn count_pairs(tokens: &[TokenInt]) -> PairCounts {
    let mut counts = PairCounts::default();
    count_pairs_into(&mut counts, tokens);
    counts
}

/// Like [`count_pairs`], but adds the counts for `tokens` to existing `counts`.
///
/// Used when the input is split into words that are counted separately but ranked together.
pub fn count_pairs_into(counts: &mut PairCounts, tokens: &[TokenInt]) {
    for window in tokens.windows(2) {
        *counts.entry(TokenPair(window[0], window[1])).or_default() += 1;
    }
}

/// The pair with the highest count, and that count.
///
/// When several pairs share the highest count the smallest pair wins, comparing the left token
/// first and then the right one.  The result therefore doesn't depend on the iteration order of
/// the hash map.
pub fn most_frequent(counts: &PairCounts) -> Option<(TokenPair, usize)> {
    counts
        .iter()
        .max_by(|(pair_a, count_a), (pair_b, count_b)| {
            count_a.cmp(count_b).then_with(|| pair_b.cmp(pair_a))
        })
        .map(|(pair, count)| (*pair, *count))
}

/// Replace every occurrence of `pair` in `tokens` with `new_token`.
///
/// The scan goes left to right and never overlaps: after a match it resumes right after the two
/// merged tokens, so `[a, a, a]` merged on `(a, a)` becomes `[new_token, a]`.
pub fn apply_merge(tokens: &[TokenInt], pair: TokenPair, new_token: TokenInt) -> Vec<TokenInt> {
    let mut merged = Vec::with_capacity(tokens.len());
    let mut pos = 0;

    while pos < tokens.len() {
        if pos + 1 < tokens.len() && tokens[pos] == pair.0 && tokens[pos + 1] == pair.1 {
            merged.push(new_token);
            pos += 2;
        } else {
            merged.push(tokens[pos]);
            pos += 1;
        }
    }

    merged
}

/// Using the BPE algorithm, break a word up into tokens and return their integer form.
///
/// Every byte starts out as its own base token.  Then, as long as any adjacent pair is in the merge
/// table, the pair with the lowest merge id is merged everywhere it occurs.  This applies merges in
/// exactly the order they were learned, no matter how often each pair occurs in `word` itself.
pub fn byte_pair_encode(word: &[u8], merges: &MergeTable) -> Vec<TokenInt> {
    let mut tokens: Vec<TokenInt> = word.iter().map(|&byte| TokenInt::from(byte)).collect();

    // If you have n tokens and m applicable merges this does O(mn) work.  Words are usually short
    // so this hasn't been worth a heap.
    while tokens.len() >= 2 {
        let mut min_rank: Option<(TokenInt, TokenPair)> = None;
        for window in tokens.windows(2) {
            let pair = TokenPair(window[0], window[1]);
            if let Some(rank) = merges.rank(pair) {
                if min_rank.map_or(true, |(min, _)| rank < min) {
                    min_rank = Some((rank, pair));
                }
            }
        }

        match min_rank {
            Some((rank, pair)) => tokens = apply_merge(&tokens, pair, rank),
            None => break,
        }
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_pairs_sums_duplicates() {
        let counts = count_pairs(&[12, 13, 18, 12, 13]);

        assert_eq!(3, counts.len());
        assert_eq!(Some(&2), counts.get(&TokenPair(12, 13)));
        assert_eq!(Some(&1), counts.get(&TokenPair(13, 18)));
        assert_eq!(Some(&1), counts.get(&TokenPair(18, 12)));
    }

    #[test]
    fn count_pairs_of_short_sequences_is_empty() {
        assert!(count_pairs(&[]).is_empty());
        assert!(count_pairs(&[42]).is_empty());
    }

    #[test]
    fn count_pairs_into_accumulates() {
        let mut counts = count_pairs(&[1, 2, 3]);
        count_pairs_into(&mut counts, &[3, 1, 2]);

        assert_eq!(Some(&2), counts.get(&TokenPair(1, 2)));
        assert_eq!(Some(&1), counts.get(&TokenPair(2, 3)));
        assert_eq!(Some(&1), counts.get(&TokenPair(3, 1)));
        // Nothing is counted across the boundary between the two sequences
        assert_eq!(None, counts.get(&TokenPair(3, 3)));
    }

    #[test]
    fn most_frequent_breaks_ties_with_smallest_pair() {
        let mut counts = PairCounts::default();
        counts.insert(TokenPair(256, 97), 2);
        counts.insert(TokenPair(97, 98), 2);
        counts.insert(TokenPair(97, 99), 2);
        counts.insert(TokenPair(1, 1), 1);

        assert_eq!(Some((TokenPair(97, 98), 2)), most_frequent(&counts));

        counts.insert(TokenPair(300, 300), 3);
        assert_eq!(Some((TokenPair(300, 300), 3)), most_frequent(&counts));

        assert_eq!(None, most_frequent(&PairCounts::default()));
    }

    #[test]
    fn apply_merge_replaces_all_occurrences() {
        assert_eq!(
            vec![19, 18, 19],
            apply_merge(&[12, 13, 18, 12, 13], TokenPair(12, 13), 19)
        );
    }

    #[test]
    fn apply_merge_never_overlaps() {
        assert_eq!(vec![256, 97, 98], apply_merge(&[97, 97, 97, 98], TokenPair(97, 97), 256));
        assert_eq!(vec![256, 256], apply_merge(&[97, 97, 97, 97], TokenPair(97, 97), 256));
    }

    #[test]
    fn apply_merge_handles_trailing_half_pair() {
        assert_eq!(vec![5, 1], apply_merge(&[5, 1], TokenPair(1, 2), 256));
        assert_eq!(vec![1], apply_merge(&[1], TokenPair(1, 2), 256));
        assert!(apply_merge(&[], TokenPair(1, 2), 256).is_empty());
    }

    #[test]
    fn byte_pair_encode_without_merges_yields_bytes() {
        let merges = MergeTable::new();

        assert_eq!(vec![104, 105], byte_pair_encode(b"hi", &merges));
        assert!(byte_pair_encode(b"", &merges).is_empty());
    }

    #[test]
    fn byte_pair_encode_applies_merges_in_learned_order() {
        // (a, b) is learned first, then (ab, c), then (b, c)
        let merges = MergeTable::from_pairs([
            TokenPair(97, 98),
            TokenPair(256, 99),
            TokenPair(98, 99),
        ])
        .unwrap();

        // (b, c) is the most frequent pair in the word, but (a, b) has the lowest rank so it goes
        // first, which lets (ab, c) win over (b, c) at the start of the word
        assert_eq!(vec![257, 258, 258], byte_pair_encode(b"abcbcbc", &merges));
        assert_eq!(vec![257], byte_pair_encode(b"abc", &merges));
        assert_eq!(vec![258, 97], byte_pair_encode(b"bca", &merges));
    }
}
