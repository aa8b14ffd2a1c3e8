use std::path::Path;
use std::sync::Arc;

pub mod bpe;
mod encoder;
mod error;
mod iterator;
mod merges;
mod special;
pub mod store;
mod token;
mod trainer;
mod vocab;

pub(crate) use encoder::CodecParams;
pub use error::*;
pub use iterator::{EncodeIterator, Pattern};
pub use merges::*;
pub use special::*;
pub use token::*;
pub use trainer::*;
pub use vocab::*;

pub type Result<T> = std::result::Result<T, CegatokError>;

/// Background colours cycled through by [`Codec::render_tokens`], as `r;g;b` triples
const TOKEN_COLORS: &[&str] = &[
    "102;194;165",
    "252;141;98",
    "141;160;203",
    "231;138;195",
    "166;216;84",
    "255;217;47",
];

/// A byte-level BPE tokenizer: a learned merge table, the vocabulary derived from it, and a table
/// of special tokens.
///
/// With a codec it's possible to encode text into integer tokens and decode tokens back into the
/// text they came from.  A codec is created either by training on a corpus (see [`Codec::train`]
/// and [`Trainer`]) or by loading a previously saved model file (see [`Codec::load`]).
///
/// Instances of `Codec` are cheap to clone and thread safe; encoding and decoding never modify the
/// codec, so a single instance can be used from multiple threads simultaneously.
#[derive(Clone, Debug)]
pub struct Codec {
    params: Arc<CodecParams>,
}

impl Codec {
    /// Train a codec on `text`, learning merges until the vocabulary has `vocab_size` tokens or no
    /// pair occurs more than once.
    ///
    /// Fails if `vocab_size` is smaller than 256.  For more control over training, use [`Trainer`].
    pub fn train(text: &str, vocab_size: usize) -> Result<Self> {
        Ok(Trainer::new(vocab_size)?.train(text))
    }

    /// Create a codec from an existing merge table, with no special tokens and no pre-tokenization
    /// pattern.
    pub fn from_merges(merges: MergeTable) -> Self {
        Self::from_params(CodecParams::new(merges, SpecialTokens::empty(), None))
    }

    pub(crate) fn from_params(params: CodecParams) -> Self {
        Self {
            params: Arc::new(params),
        }
    }

    /// Load a codec saved with [`Self::save`], reading `<prefix>.model`.
    pub fn load(prefix: impl AsRef<Path>) -> Result<Self> {
        store::load(prefix)
    }

    /// Save this codec to `<prefix>.model`, and a human readable dump of the vocabulary to
    /// `<prefix>.vocab`.
    pub fn save(&self, prefix: impl AsRef<Path>) -> Result<()> {
        store::save(self, prefix)
    }
}

impl Codec {
    /// Replace the special tokens of this codec with `special_tokens`, pairs of token string and
    /// token id.
    ///
    /// Special token ids are not checked against the ids of base and learned tokens; pick ids that
    /// don't collide with them.  Fails if a token string is empty or contains a line break, or if
    /// two strings share an id.  On failure the codec is left unchanged.
    ///
    /// Other clones of this codec are not affected.
    pub fn register_special_tokens<Iter, S>(&mut self, special_tokens: Iter) -> Result<()>
    where
        Iter: IntoIterator<Item = (S, TokenInt)>,
        S: Into<String>,
    {
        let special_tokens = SpecialTokens::new(special_tokens)?;
        Arc::make_mut(&mut self.params).set_special_tokens(special_tokens);

        Ok(())
    }

    /// The learned merges, in learning order
    pub fn merges(&self) -> &MergeTable {
        &self.params.merges
    }

    /// The special token strings and their ids
    pub fn special_tokens(&self) -> &SpecialTokens {
        &self.params.special_tokens
    }

    /// The full vocabulary, special tokens included
    pub fn vocab(&self) -> &Vocabulary {
        &self.params.vocab
    }

    /// The pre-tokenization pattern, if this codec splits text into words before BPE
    pub fn pattern(&self) -> Option<&str> {
        self.params.pattern.as_ref().map(Pattern::as_str)
    }

    /// Number of tokens in the vocabulary, special tokens included
    pub fn vocab_size(&self) -> usize {
        self.params.vocab.len()
    }

    /// Search the given input text for special tokens, returning an iterator that yields all
    /// special tokens in the input text.
    ///
    /// If you just need to know if there are any special tokens in the text, you can call
    /// [`Iterator::any`]
    pub fn find_special_tokens<'me, 'text>(
        &'me self,
        text: &'text str,
    ) -> impl Iterator<Item = &'text str> + 'text
    where
        'me: 'text,
    {
        let special_tokens = self.special_tokens();
        let mut pos = 0;

        std::iter::from_fn(move || {
            let (range, _) = special_tokens.find(&text[pos..])?;
            let start = pos + range.start;
            pos += range.end;

            Some(&text[start..pos])
        })
    }

    /// Encode `text` into tokens.
    ///
    /// If `include_special` is true, any registered special token strings in `text` are encoded as
    /// their special token ids, and the text around them is encoded as usual.  Where special
    /// tokens overlap, the leftmost one wins, and of those starting at the same position, the
    /// longest.  If `include_special` is false, special token strings are treated like any other
    /// text and broken up into ordinary tokens.
    ///
    /// If `text` comes from an untrusted source, consider checking it with
    /// [`Self::find_special_tokens`] before encoding it with `include_special`.
    pub fn encode(&self, text: impl AsRef<str>, include_special: bool) -> Vec<TokenInt> {
        self.encode_iter(text.as_ref(), include_special).collect()
    }

    /// Encode `text` into tokens, without any special handling for special tokens.
    ///
    /// The same as [`Self::encode`] with `include_special` set to false.
    pub fn encode_ordinary(&self, text: impl AsRef<str>) -> Vec<TokenInt> {
        self.encode(text, false)
    }

    /// Like [`Self::encode`], but yields tokens lazily.
    pub fn encode_iter<'a>(&'a self, text: &'a str, include_special: bool) -> EncodeIterator<'a> {
        EncodeIterator::new(&self.params, text, include_special)
    }

    /// Decode tokens back into the text they came from.
    ///
    /// Tokens don't necessarily end on UTF-8 character boundaries, so a sequence of tokens that was
    /// truncated or modified can decode to invalid UTF-8.  Invalid sequences are replaced with
    /// U+FFFD rather than causing an error.  If you need the exact bytes, use
    /// [`Self::decode_to_bytes`].
    ///
    /// Fails if any token is neither in the vocabulary nor a special token.
    pub fn decode(&self, tokens: &[TokenInt]) -> Result<String> {
        let bytes = self.decode_to_bytes(tokens)?;

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Decode tokens into the bytes that they came from.
    ///
    /// This is fallible only in case `tokens` contains ids that this codec doesn't know, for
    /// example because they came from a different codec.
    pub fn decode_to_bytes(&self, tokens: &[TokenInt]) -> Result<TokenString> {
        let mut bytes = Vec::with_capacity(tokens.len() * 2);
        for &token in tokens {
            let token_bytes = self
                .params
                .vocab
                .bytes_for_token(token)
                .ok_or_else(|| UnknownTokenIdSnafu { token }.build())?;
            bytes.extend_from_slice(token_bytes);
        }

        Ok(bytes)
    }

    /// Show how `text` is split into tokens.
    ///
    /// Each token of `text` (encoded without special tokens) is decoded on its own and drawn with a
    /// 24-bit ANSI background colour, cycling through a handful of colours so neighbouring tokens
    /// stand out.  Tokens are separated by a space.  Meant for printing to a terminal.
    pub fn render_tokens(&self, text: impl AsRef<str>) -> String {
        self.encode_iter(text.as_ref(), false)
            .enumerate()
            .map(|(index, token)| {
                let color = TOKEN_COLORS[index % TOKEN_COLORS.len()];
                let token_text = self
                    .params
                    .vocab
                    .bytes_for_token(token)
                    .map(String::from_utf8_lossy)
                    .unwrap_or_default();

                format!("\x1b[48;2;{color}m{token_text}\x1b[0m")
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::init_test_logging;
    use assert_matches::assert_matches;

    const CORPUS: &str = "the cat sat on the mat, the cat ate the rat. \
        the rat sat on the cat? no, the cat sat on the rat.";

    fn trained() -> Codec {
        init_test_logging();
        Codec::train(CORPUS, 300).unwrap()
    }

    #[test]
    fn codec_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Codec>();
    }

    #[test]
    fn train_rejects_small_vocab() {
        assert_matches!(
            Codec::train(CORPUS, 100),
            Err(CegatokError::InvalidConfiguration { .. })
        );
    }

    #[test]
    fn encode_compresses_training_text() {
        let codec = trained();
        let tokens = codec.encode(CORPUS, false);

        assert!(!codec.merges().is_empty());
        assert!(tokens.len() < CORPUS.len());
        assert_eq!(CORPUS, codec.decode(&tokens).unwrap());
    }

    #[test]
    fn encode_empty_text() {
        let codec = trained();

        assert!(codec.encode("", false).is_empty());
        assert!(codec.encode("", true).is_empty());
        assert_eq!("", codec.decode(&[]).unwrap());
    }

    #[test]
    fn encode_follows_learned_order() {
        let merges = MergeTable::from_pairs([
            TokenPair(97, 98),
            TokenPair(256, 99),
            TokenPair(98, 99),
        ])
        .unwrap();
        let codec = Codec::from_merges(merges);

        assert_eq!(vec![257, 258, 258], codec.encode("abcbcbc", false));
        assert_eq!("abcbcbc", codec.decode(&[257, 258, 258]).unwrap());
    }

    #[test]
    fn special_tokens_isolated_from_merges() {
        let mut codec = trained();
        codec.register_special_tokens([("<SEP>", 1000)]).unwrap();

        let hello = codec.encode("hello", false);
        let tokens = codec.encode("<SEP>hello<SEP>", true);

        let mut expected = vec![1000];
        expected.extend(&hello);
        expected.push(1000);
        assert_eq!(expected, tokens);
        assert_eq!("<SEP>hello<SEP>", codec.decode(&tokens).unwrap());

        // Without include_special the marker is just text
        let ordinary = codec.encode("<SEP>hello<SEP>", false);
        assert!(!ordinary.contains(&1000));
        assert_eq!("<SEP>hello<SEP>", codec.decode(&ordinary).unwrap());
    }

    #[test]
    fn special_tokens_prefer_longest_match() {
        let mut codec = trained();
        codec
            .register_special_tokens([("<M>", 1000), ("<M><M>", 1001)])
            .unwrap();

        let tokens = codec.encode("<M><M><M>", true);
        assert_eq!(vec![1001, 1000], tokens);
        assert_eq!(
            vec!["<M><M>", "<M>"],
            codec.find_special_tokens("<M><M><M>").collect::<Vec<_>>()
        );
    }

    #[test]
    fn find_special_tokens() {
        let mut codec = trained();
        assert_eq!(None, codec.find_special_tokens("<SEP>").next());

        codec
            .register_special_tokens([("<SEP>", 1000), ("<MASK>", 1001)])
            .unwrap();
        assert_eq!(
            vec!["<MASK>", "<SEP>"],
            codec
                .find_special_tokens("the <MASK> sat <SEP> on")
                .collect::<Vec<_>>()
        );
        assert!(!codec.find_special_tokens("the cat").any(|_| true));
    }

    #[test]
    fn register_special_tokens_replaces_table() {
        let mut codec = trained();
        let learned = codec.vocab_size();

        codec
            .register_special_tokens([("<SEP>", 1000), ("<MASK>", 1001)])
            .unwrap();
        assert_eq!(learned + 2, codec.vocab_size());

        codec.register_special_tokens([("<CLS>", 2000)]).unwrap();
        assert_eq!(learned + 1, codec.vocab_size());
        assert_eq!(None, codec.special_tokens().token_for_str("<SEP>"));
        assert_matches!(
            codec.decode(&[1000]),
            Err(CegatokError::UnknownTokenId { token: 1000 })
        );
        assert_eq!("<CLS>", codec.decode(&[2000]).unwrap());
    }

    #[test]
    fn failed_registration_leaves_codec_unchanged() {
        let mut codec = trained();
        codec.register_special_tokens([("<SEP>", 1000)]).unwrap();

        assert_matches!(
            codec.register_special_tokens([("", 1001)]),
            Err(CegatokError::AmbiguousSpecialTokenSplit)
        );
        assert_eq!(Some(1000), codec.special_tokens().token_for_str("<SEP>"));
    }

    #[test]
    fn clones_are_independent() {
        let codec = trained();
        let mut with_special = codec.clone();
        with_special
            .register_special_tokens([("<SEP>", 1000)])
            .unwrap();

        assert!(codec.special_tokens().is_empty());
        assert_eq!(1, with_special.special_tokens().len());
        assert_eq!(codec.merges(), with_special.merges());
    }

    #[test]
    fn decode_rejects_unknown_tokens() {
        let codec = trained();
        let unknown = codec.vocab_size();

        assert_matches!(
            codec.decode(&[116, unknown]),
            Err(CegatokError::UnknownTokenId { token }) if token == unknown
        );
    }

    #[test]
    fn decode_replaces_invalid_utf8() {
        let codec = Codec::from_merges(MergeTable::new());

        // A lone continuation byte and a truncated two byte sequence
        assert_eq!("a\u{fffd}b\u{fffd}", codec.decode(&[97, 0x80, 98, 0xc3]).unwrap());
        assert_eq!(
            vec![97, 0x80, 98, 0xc3],
            codec.decode_to_bytes(&[97, 0x80, 98, 0xc3]).unwrap()
        );
    }

    #[test]
    fn multibyte_text_round_trips() {
        let codec = Codec::train("né né né 日本語 日本語 🦀🦀🦀", 280).unwrap();

        for text in ["né", "日本語", "🦀", "plain ascii", "mixed né 🦀 日本"] {
            assert_eq!(text, codec.decode(&codec.encode(text, false)).unwrap());
        }
    }

    #[test]
    fn render_tokens_colors_each_token() {
        let codec = Codec::from_merges(MergeTable::from_pairs([TokenPair(104, 105)]).unwrap());

        assert_eq!(
            "\x1b[48;2;102;194;165mhi\x1b[0m \x1b[48;2;252;141;98m!\x1b[0m",
            codec.render_tokens("hi!")
        );
        assert_eq!("", codec.render_tokens(""));
    }

    #[test]
    fn pattern_is_applied_when_encoding() {
        let codec = Trainer::new(300)
            .unwrap()
            .with_pattern(r" ?\p{L}+")
            .unwrap()
            .train("ab ab ab ab");

        // (a, b) and (' ', ab) were learned, but "b a" never merges across words
        assert_eq!(vec![256, 257, 257], codec.encode("ab ab ab", false));
        assert_eq!("ab ab ab", codec.decode(&[256, 257, 257]).unwrap());
    }
}
