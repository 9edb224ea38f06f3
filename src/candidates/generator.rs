//! Candidate generation combining embedding neighbors and edit distance.
//!
//! Each typo is handled independently and only reads the shared token
//! index, so a batch is partitioned across a fixed-size rayon pool with no
//! locking. Output order depends only on input order, never on scheduling.

use ahash::AHashMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::candidates::{Candidate, Provenance};
use crate::distance::{levenshtein, levenshtein_bounded};
use crate::error::{IdentypoError, Result};
use crate::index::TokenIndex;

/// Configuration for candidate generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// How many embedding nearest neighbors to fetch per typo.
    pub neighbors_number: usize,
    /// How many of the most frequent tokens to compare by edit distance.
    pub taken_for_distance: usize,
    /// Maximum edit distance for the distance strategy.
    pub max_distance: usize,
    /// Length-difference band: tokens whose char-length gap to the typo
    /// exceeds this are never compared by edit distance.
    pub radius: usize,
    /// Worker pool width for batch generation.
    pub threads: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            neighbors_number: 20,
            taken_for_distance: 10,
            max_distance: 3,
            radius: 4,
            threads: 16,
        }
    }
}

/// Generates bounded candidate sets for typo tokens.
pub struct CandidateGenerator {
    config: GeneratorConfig,
    pool: rayon::ThreadPool,
}

impl CandidateGenerator {
    /// Create a generator with its worker pool.
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        if config.threads == 0 {
            return Err(IdentypoError::invalid_config(
                "generator thread count must be at least 1",
            ));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .build()
            .map_err(|e| IdentypoError::internal(format!("worker pool: {e}")))?;

        Ok(CandidateGenerator { config, pool })
    }

    /// The generator's configuration.
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Generate candidate sets for a batch of typos, one set per input in
    /// input order. Empty sets are legal and mean "no suggestion available".
    pub fn generate(&self, index: &TokenIndex, typos: &[String]) -> Vec<Vec<Candidate>> {
        self.pool.install(|| {
            typos
                .par_iter()
                .map(|typo| self.generate_for(index, typo))
                .collect()
        })
    }

    /// Generate the candidate set for a single typo.
    pub fn generate_for(&self, index: &TokenIndex, typo: &str) -> Vec<Candidate> {
        let mut merged: AHashMap<String, Candidate> = AHashMap::new();

        // A typo that is itself a vocabulary token is always its own
        // candidate, so "no correction needed" stays representable.
        if index.contains(typo) {
            merge_candidate(
                &mut merged,
                typo,
                typo.to_string(),
                Some(0),
                Provenance::distance(),
            );
        }

        for token in self.neighbor_candidates(index, typo) {
            merge_candidate(&mut merged, typo, token, None, Provenance::neighbor());
        }

        for (token, distance) in self.distance_candidates(index, typo) {
            merge_candidate(
                &mut merged,
                typo,
                token,
                Some(distance),
                Provenance::distance(),
            );
        }

        let mut candidates: Vec<Candidate> = merged.into_values().collect();
        candidates.sort_by(|a, b| {
            a.distance
                .cmp(&b.distance)
                .then_with(|| index.frequency(&b.token).cmp(&index.frequency(&a.token)))
                .then_with(|| a.token.cmp(&b.token))
        });
        candidates
    }

    /// Neighbor strategy: nearest index tokens to the typo's embedding, or
    /// to its closest embedded vocabulary token when the typo itself has no
    /// embedding.
    fn neighbor_candidates(&self, index: &TokenIndex, typo: &str) -> Vec<String> {
        let embeddings = index.embeddings();

        if let Some(vector) = embeddings.get(typo) {
            return index
                .nearest_excluding(vector, self.config.neighbors_number, Some(typo))
                .into_iter()
                .map(|(token, _)| token)
                .collect();
        }

        // Out-of-vocabulary fallback: borrow the embedding of the nearest
        // embedded vocabulary token within the distance bounds. The proxy
        // itself then ranks first among the fetched neighbors.
        let Some(proxy) = self.embedding_proxy(index, typo) else {
            return Vec::new();
        };
        let Some(vector) = embeddings.get(&proxy) else {
            return Vec::new();
        };
        index
            .nearest(vector, self.config.neighbors_number)
            .into_iter()
            .map(|(token, _)| token)
            .collect()
    }

    /// The embedded vocabulary token closest to the typo by edit distance,
    /// within the band and max-distance bounds. Ties break by frequency
    /// descending, then token ascending; entries() already yields that order.
    fn embedding_proxy(&self, index: &TokenIndex, typo: &str) -> Option<String> {
        let typo_len = typo.chars().count();
        let mut best: Option<(usize, String)> = None;

        for (token, _) in index.entries() {
            if token.chars().count().abs_diff(typo_len) > self.config.radius {
                continue;
            }
            if !index.embeddings().contains(token) {
                continue;
            }
            if let Some(distance) = levenshtein_bounded(typo, token, self.config.max_distance) {
                let better = match &best {
                    Some((best_distance, _)) => distance < *best_distance,
                    None => true,
                };
                if better {
                    best = Some((distance, token.to_string()));
                }
            }
        }

        best.map(|(_, token)| token)
    }

    /// Edit-distance strategy: frequent tokens within `max_distance`,
    /// restricted to the length band.
    fn distance_candidates(&self, index: &TokenIndex, typo: &str) -> Vec<(String, usize)> {
        let typo_len = typo.chars().count();
        let mut found = Vec::new();

        for token in index.top_frequent(self.config.taken_for_distance) {
            if token.chars().count().abs_diff(typo_len) > self.config.radius {
                continue;
            }
            if let Some(distance) = levenshtein_bounded(typo, token, self.config.max_distance) {
                found.push((token.clone(), distance));
            }
        }

        found
    }
}

fn merge_candidate(
    merged: &mut AHashMap<String, Candidate>,
    typo: &str,
    token: String,
    distance: Option<usize>,
    provenance: Provenance,
) {
    match merged.get_mut(&token) {
        Some(existing) => existing.provenance.merge(provenance),
        None => {
            let distance = distance.unwrap_or_else(|| levenshtein(typo, &token));
            merged.insert(
                token.clone(),
                Candidate {
                    typo: typo.to_string(),
                    token,
                    distance,
                    provenance,
                },
            );
        }
    }
}
