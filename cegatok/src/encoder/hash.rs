//! The choice of hash algorithm used by the lookup tables (pair counts, merge ranks, special
//! tokens) has a big impact on training performance, since training re-counts every pair of the
//! corpus once per merge.
//!
//! This is isolated to this module to make it easier to experiment with different impls.
pub use rustc_hash::FxHashMap as HashMap;
