//! Saving a codec to disk and loading it back.
//!
//! A saved codec is two files next to each other:
//!
//! - `<prefix>.model` is what [`load`] reads.  It's a small line oriented text file: a version
//!   line, the pre-tokenization pattern (empty if there is none), the number of special tokens
//!   followed by one `<token> <id>` line for each of them, and then one `<left id> <right id>` line
//!   per merge in learning order.  Merge ids aren't stored; the n-th merge line is token `256 + n`.
//! - `<prefix>.vocab` is a rendering of the whole vocabulary for people to look at.  It is never
//!   read back.
//!
//! The vocabulary itself is never stored as the source of truth; loading rebuilds it from the merges
//! and special tokens.
use crate::error::*;
use crate::{
    Codec, CodecParams, MergeTable, Pattern, Result, SpecialTokens, TokenInt, TokenPair,
};
use snafu::ResultExt;
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use strum::{EnumIter, EnumString};
use tracing::*;

/// First word of the version line of every model file
pub const MODEL_MAGIC: &str = "cegaBBPE";

/// Versions of the model file format.
#[derive(Clone, Copy, Debug, Eq, PartialEq, EnumString, EnumIter, strum::Display)]
pub enum ModelVersion {
    #[strum(serialize = "v0")]
    V0,
}

impl ModelVersion {
    /// The version new model files are written with
    pub const CURRENT: ModelVersion = ModelVersion::V0;
}

/// The model file path for a prefix: `<prefix>.model`.
///
/// The suffix is appended rather than set as an extension, so prefixes with dots in the file name
/// keep them.
pub fn model_path(prefix: impl AsRef<Path>) -> PathBuf {
    path_with_suffix(prefix.as_ref(), ".model")
}

/// The vocab dump path for a prefix: `<prefix>.vocab`.
pub fn vocab_path(prefix: impl AsRef<Path>) -> PathBuf {
    path_with_suffix(prefix.as_ref(), ".vocab")
}

fn path_with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut path = OsString::from(prefix.as_os_str());
    path.push(suffix);
    PathBuf::from(path)
}

/// Write `<prefix>.model` and `<prefix>.vocab` for `codec`.
pub fn save(codec: &Codec, prefix: impl AsRef<Path>) -> Result<()> {
    let model_path = model_path(&prefix);
    write_file(&model_path, |writer| write_model(codec, writer))?;

    let vocab_path = vocab_path(&prefix);
    write_file(&vocab_path, |writer| write_vocab(codec, writer))?;

    debug!(model = %model_path.display(),
        vocab = %vocab_path.display(),
        merges = codec.merges().len(),
        special_tokens = codec.special_tokens().len(),
        "Saved codec");

    Ok(())
}

fn write_file(
    path: &Path,
    write: impl FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
) -> Result<()> {
    let file = File::create(path).with_context(|_| FileIoSnafu { path })?;
    let mut writer = BufWriter::new(file);
    write(&mut writer)
        .and_then(|_| writer.flush())
        .with_context(|_| FileIoSnafu { path })
}

/// Load the codec saved with `prefix`, reading only `<prefix>.model`.
pub fn load(prefix: impl AsRef<Path>) -> Result<Codec> {
    let path = model_path(prefix);
    let bytes = std::fs::read(&path).with_context(|_| FileIoSnafu { path: path.clone() })?;

    let result = match std::str::from_utf8(&bytes) {
        Ok(text) => parse_model(text),
        Err(e) => CorruptModelFileSnafu {
            path: None::<PathBuf>,
            line: 0usize,
            reason: format!("not valid UTF-8: {e}"),
        }
        .fail(),
    };

    match result {
        Ok(codec) => {
            debug!(model = %path.display(),
                merges = codec.merges().len(),
                special_tokens = codec.special_tokens().len(),
                "Loaded codec");
            Ok(codec)
        }
        Err(CegatokError::CorruptModelFile { line, reason, .. }) => CorruptModelFileSnafu {
            path: Some(path),
            line,
            reason,
        }
        .fail(),
        Err(e) => Err(e),
    }
}

/// Write the model file contents for `codec`.
pub fn write_model(codec: &Codec, writer: &mut impl Write) -> std::io::Result<()> {
    writeln!(writer, "{MODEL_MAGIC} {}", ModelVersion::CURRENT)?;
    writeln!(writer, "{}", codec.pattern().unwrap_or_default())?;

    writeln!(writer, "{}", codec.special_tokens().len())?;
    for (token, id) in codec.special_tokens().iter() {
        writeln!(writer, "{token} {id}")?;
    }

    for (TokenPair(left, right), _) in codec.merges().iter() {
        writeln!(writer, "{left} {right}")?;
    }

    Ok(())
}

/// Write the human readable vocabulary dump for `codec`.
///
/// Merged tokens are rendered as `[left][right] -> [merged] id`, everything else as `[token] id`.
pub fn write_vocab(codec: &Codec, writer: &mut impl Write) -> std::io::Result<()> {
    let vocab = codec.vocab();
    let render = |token| vocab.bytes_for_token(token).map(crate::render_token);

    for (id, bytes) in vocab.iter() {
        let rendered = crate::render_token(bytes);

        // Special tokens never have children, even when they reuse a merged token's id
        let children = match codec.special_tokens().str_for_token(id) {
            Some(_) => None,
            None => codec.merges().pair_for_token(id),
        };

        match children.and_then(|TokenPair(left, right)| Some((render(left)?, render(right)?))) {
            Some((left, right)) => writeln!(writer, "[{left}][{right}] -> [{rendered}] {id}")?,
            None => writeln!(writer, "[{rendered}] {id}")?,
        }
    }

    Ok(())
}

/// Parse the contents of a model file.
pub fn parse_model(text: &str) -> Result<Codec> {
    let mut lines = ModelLines::new(text);

    let header = lines.next_line("version line")?;
    let version = match header.split_once(' ') {
        Some((MODEL_MAGIC, version)) => ModelVersion::from_str(version)
            .map_err(|_| lines.corrupt(format!("unsupported version '{version}'")))?,
        _ => {
            return Err(lines.corrupt(format!(
                "expected '{MODEL_MAGIC} <version>', found '{header}'"
            )))
        }
    };

    let pattern = lines.next_line("pattern line")?;
    let pattern = Pattern::parse_optional(pattern).map_err(|e| lines.corrupt(e.to_string()))?;

    let count = lines.next_line("special token count")?;
    let count = count.trim().parse::<usize>().map_err(|e| {
        lines.corrupt(format!("invalid special token count '{count}': {e}"))
    })?;

    // The count is untrusted; missing lines show up as a missing special token line below
    let mut special_tokens = Vec::new();
    for _ in 0..count {
        let line = lines.next_line("special token line")?;
        let token = parse_special_token(line)
            .ok_or_else(|| lines.corrupt(format!("expected '<token> <id>', found '{line}'")))?;
        special_tokens.push(token);
    }
    let special_tokens =
        SpecialTokens::new(special_tokens).map_err(|e| lines.corrupt(e.to_string()))?;

    let mut merges = MergeTable::new();
    while let Some(line) = lines.next_merge_line() {
        let pair = parse_merge(line).ok_or_else(|| {
            lines.corrupt(format!("expected '<left id> <right id>', found '{line}'"))
        })?;
        merges
            .push(pair)
            .map_err(|e| lines.corrupt(e.to_string()))?;
    }

    trace!(%version, merges = merges.len(), special_tokens = special_tokens.len(), "Parsed model file");

    Ok(Codec::from_params(CodecParams::new(
        merges,
        special_tokens,
        pattern,
    )))
}

/// Lines of a model file, keeping track of the (1-based) number of the line last read so errors
/// can point at it
struct ModelLines<'t> {
    lines: std::str::Lines<'t>,
    line_number: usize,
}

impl<'t> ModelLines<'t> {
    fn new(text: &'t str) -> Self {
        Self {
            lines: text.lines(),
            line_number: 0,
        }
    }

    /// The next line, which must be there
    fn next_line(&mut self, what: &str) -> Result<&'t str> {
        self.line_number += 1;
        match self.lines.next() {
            Some(line) => Ok(line),
            None => Err(self.corrupt(format!("missing {what}"))),
        }
    }

    /// The next line, if there are any left.  Merges run to the end of the file.
    fn next_merge_line(&mut self) -> Option<&'t str> {
        let line = self.lines.next()?;
        self.line_number += 1;
        Some(line)
    }

    fn corrupt(&self, reason: String) -> CegatokError {
        CorruptModelFileSnafu {
            path: None::<PathBuf>,
            line: self.line_number,
            reason,
        }
        .build()
    }
}

fn parse_special_token(line: &str) -> Option<(String, TokenInt)> {
    // The token itself may contain spaces, the id never does
    let (token, id) = line.rsplit_once(' ')?;
    let id = id.trim().parse().ok()?;

    Some((token.to_string(), id))
}

fn parse_merge(line: &str) -> Option<TokenPair> {
    let mut ids = line.split_whitespace().map(str::parse::<TokenInt>);
    match (ids.next(), ids.next(), ids.next()) {
        (Some(Ok(left)), Some(Ok(right)), None) => Some(TokenPair(left, right)),
        _ => None,
    }
}
