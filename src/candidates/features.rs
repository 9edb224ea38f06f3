//! Feature extraction for (typo, candidate) pairs.
//!
//! Extraction is pure: given the same candidate and the same index state it
//! always yields the same vector, so feature rows can be cached to disk and
//! reused across runs.

use serde::{Deserialize, Serialize};

use crate::candidates::Candidate;
use crate::distance::normalized_distance;
use crate::embedding::cosine;
use crate::error::Result;
use crate::index::TokenIndex;

/// Width of the feature vector consumed by the ranker.
pub const FEATURE_DIM: usize = 8;

/// Fixed-width numeric features for one (typo, candidate) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateFeatures {
    /// Edit distance divided by the longer token's length.
    pub normalized_distance: f64,
    /// Raw candidate frequency in the vocabulary.
    pub frequency: f64,
    /// ln(1 + frequency).
    pub log_frequency: f64,
    /// Frequency rank percentile within the vocabulary, in (0, 1].
    pub rank_percentile: f64,
    /// Cosine similarity between typo and candidate embeddings, 0.0 when
    /// the typo has no embedding.
    pub embedding_similarity: f64,
    /// 1.0 if the neighbor strategy produced this candidate.
    pub from_neighbor: f64,
    /// 1.0 if the edit-distance strategy produced this candidate.
    pub from_distance: f64,
    /// Candidate length minus typo length, in chars.
    pub length_difference: f64,
}

impl CandidateFeatures {
    /// The features as a fixed-width array, in declaration order.
    pub fn as_array(&self) -> [f64; FEATURE_DIM] {
        [
            self.normalized_distance,
            self.frequency,
            self.log_frequency,
            self.rank_percentile,
            self.embedding_similarity,
            self.from_neighbor,
            self.from_distance,
            self.length_difference,
        ]
    }

    /// An all-zero feature vector.
    pub fn zeroed() -> Self {
        CandidateFeatures {
            normalized_distance: 0.0,
            frequency: 0.0,
            log_frequency: 0.0,
            rank_percentile: 0.0,
            embedding_similarity: 0.0,
            from_neighbor: 0.0,
            from_distance: 0.0,
            length_difference: 0.0,
        }
    }
}

/// Computes feature vectors against a token index.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    /// Create a new feature extractor.
    pub fn new() -> Self {
        FeatureExtractor
    }

    /// Extract the feature vector for one candidate.
    pub fn extract(&self, index: &TokenIndex, candidate: &Candidate) -> Result<CandidateFeatures> {
        let frequency = index.frequency(&candidate.token) as f64;

        let embedding_similarity = match (
            index.embeddings().get(&candidate.typo),
            index.embeddings().get(&candidate.token),
        ) {
            (Some(typo_vector), Some(token_vector)) => {
                cosine(typo_vector, token_vector) as f64
            }
            _ => 0.0,
        };

        let typo_len = candidate.typo.chars().count() as f64;
        let token_len = candidate.token.chars().count() as f64;

        Ok(CandidateFeatures {
            normalized_distance: normalized_distance(&candidate.typo, &candidate.token),
            frequency,
            log_frequency: (1.0 + frequency).ln(),
            rank_percentile: index.rank_percentile(&candidate.token),
            embedding_similarity,
            from_neighbor: if candidate.provenance.neighbor { 1.0 } else { 0.0 },
            from_distance: if candidate.provenance.distance { 1.0 } else { 0.0 },
            length_difference: token_len - typo_len,
        })
    }
}
