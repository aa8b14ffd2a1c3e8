use std::sync::OnceLock;
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

static TRACING: OnceLock<()> = OnceLock::new();

/// Initialize tracing for integration tests with the same subscriber the unit tests use.
/// Safe to call multiple times - will only initialize once.
pub fn init_test_logging() {
    TRACING.get_or_init(|| {
        let filter = std::env::var("RUST_LOG")
            .map(EnvFilter::new)
            .unwrap_or_else(|_| EnvFilter::new("debug"));

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// A small corpus in the style of the random walk text the tokenizer is trained on
pub const WALK_CORPUS: &str = "\
Albert_Einstein bornIn Ulm locatedIn Germany <|endofrandomwalk|>
Ulm locatedIn Germany hasCapital Berlin <|endofrandomwalk|>
Marie_Curie bornIn Warsaw locatedIn Poland hasCapital Warsaw <|endofrandomwalk|>
Albert_Einstein awarded Nobel_Prize_in_Physics awardedTo Marie_Curie <|endofrandomwalk|>
Berlin locatedIn Germany bornIn Albert_Einstein <|endofrandomwalk|>
";
