//! # Identypo
//!
//! Typo correction for identifier sub-tokens, trained on real renames.
//!
//! ## Features
//!
//! - Token index over a frequency-ranked vocabulary with embeddings
//! - Dual-strategy candidate generation (embedding neighbors, edit distance)
//! - Gradient-boosted candidate ranking with deterministic training
//! - Batched suggestion with identical output to single-shot calls
//! - Single-file model persistence with integrity checking

pub mod candidates;
pub mod corrector;
pub mod distance;
pub mod embedding;
pub mod error;
pub mod index;
pub mod ranker;
pub mod records;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
