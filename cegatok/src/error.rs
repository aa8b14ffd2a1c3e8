use crate::{TokenInt, TokenPair};
use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CegatokError {
    #[snafu(display("Invalid tokenizer configuration: {reason}"))]
    InvalidConfiguration { reason: String },

    #[snafu(display("The pre-tokenization pattern '{pattern}' is not a valid regex"))]
    InvalidPattern {
        pattern: String,
        source: fancy_regex::Error,
    },

    #[snafu(display("Token id {token} is neither in the vocabulary nor a special token"))]
    UnknownTokenId { token: TokenInt },

    #[snafu(display(
        "Merge {pair} can't be assigned id {next_id} because it refers to a token that doesn't exist yet"
    ))]
    UndefinedMergeToken { pair: TokenPair, next_id: TokenInt },

    #[snafu(display("Merge {pair} is already in the merge table with id {existing}"))]
    DuplicateMerge { pair: TokenPair, existing: TokenInt },

    #[snafu(display("The empty string can't be a special token, it would match everywhere"))]
    AmbiguousSpecialTokenSplit,

    #[snafu(display("Special tokens '{token}' and '{other}' both use id {id}"))]
    DuplicateSpecialTokenId {
        token: String,
        other: String,
        id: TokenInt,
    },

    #[snafu(display("Special token {token:?} contains a line break"))]
    InvalidSpecialToken { token: String },

    #[snafu(display("Model file{} is corrupt at line {line}: {reason}", display_path(path)))]
    CorruptModelFile {
        path: Option<PathBuf>,
        line: usize,
        reason: String,
    },

    #[snafu(display("File I/O error on file '{}'", path.display()))]
    FileIo {
        path: PathBuf,
        source: std::io::Error,
    },
}

fn display_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|path| format!(" '{}'", path.display()))
        .unwrap_or_default()
}
