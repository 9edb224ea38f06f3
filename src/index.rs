//! Token index over the known vocabulary.
//!
//! Holds per-token frequencies and the embedding table, and answers the two
//! queries candidate generation needs: nearest tokens by embedding cosine
//! similarity, and the most frequent tokens used as the edit-distance pool.
//! The index is immutable after construction and can be shared across
//! threads without locking.

use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use ahash::AHashMap;
use regex::Regex;

use crate::embedding::{EmbeddingTable, cosine};
use crate::error::{IdentypoError, Result};

/// Read-only vocabulary index with frequencies and embeddings.
#[derive(Debug, Clone)]
pub struct TokenIndex {
    frequencies: AHashMap<String, u64>,
    /// Tokens ordered by frequency descending, token ascending.
    by_rank: Vec<String>,
    /// Token -> position in `by_rank`.
    ranks: AHashMap<String, usize>,
    embeddings: Arc<EmbeddingTable>,
}

impl TokenIndex {
    /// Build an index from (token, frequency) entries and an embedding table.
    ///
    /// Duplicate tokens fail with `DataFormat`. Tokens without an embedding
    /// are allowed; they simply never appear in nearest-neighbor results.
    pub fn new(entries: Vec<(String, u64)>, embeddings: Arc<EmbeddingTable>) -> Result<Self> {
        let mut frequencies = AHashMap::with_capacity(entries.len());
        for (token, frequency) in entries {
            if frequencies.insert(token.clone(), frequency).is_some() {
                return Err(IdentypoError::data_format(format!(
                    "duplicate vocabulary token '{token}'"
                )));
            }
        }

        let mut by_rank: Vec<String> = frequencies.keys().cloned().collect();
        by_rank.sort_by(|a, b| {
            frequencies[b]
                .cmp(&frequencies[a])
                .then_with(|| a.cmp(b))
        });

        let ranks = by_rank
            .iter()
            .enumerate()
            .map(|(rank, token)| (token.clone(), rank))
            .collect();

        Ok(TokenIndex {
            frequencies,
            by_rank,
            ranks,
            embeddings,
        })
    }

    /// Load an index from a vocabulary file and a frequency file.
    ///
    /// The vocabulary file has one token per line; the frequency file has
    /// `token count` per line. The two token sets must agree exactly, and
    /// tokens must look like identifier sub-tokens; anything else fails with
    /// `DataFormat` before any partial state is exposed.
    pub fn load<P: AsRef<Path>>(
        vocabulary_path: P,
        frequencies_path: P,
        embeddings: Arc<EmbeddingTable>,
    ) -> Result<Self> {
        let token_re = Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("static pattern");

        let vocab_file = File::open(vocabulary_path)?;
        let mut vocabulary = Vec::new();
        for (line_no, line) in BufReader::new(vocab_file).lines().enumerate() {
            let line = line?;
            let token = line.trim();
            if token.is_empty() {
                continue;
            }
            if !token_re.is_match(token) {
                return Err(IdentypoError::data_format(format!(
                    "vocabulary line {}: invalid token '{}'",
                    line_no + 1,
                    token
                )));
            }
            vocabulary.push(token.to_string());
        }

        let freq_file = File::open(frequencies_path)?;
        let mut entries = Vec::new();
        for (line_no, line) in BufReader::new(freq_file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() != 2 {
                return Err(IdentypoError::data_format(format!(
                    "frequency line {}: expected 'token count'",
                    line_no + 1
                )));
            }
            let frequency = parts[1].parse::<u64>().map_err(|_| {
                IdentypoError::data_format(format!(
                    "frequency line {}: invalid count '{}'",
                    line_no + 1,
                    parts[1]
                ))
            })?;
            entries.push((parts[0].to_string(), frequency));
        }

        // The two files describe the same closed token set.
        let vocab_set: AHashMap<&str, ()> =
            vocabulary.iter().map(|t| (t.as_str(), ())).collect();
        if vocabulary.len() != entries.len() {
            return Err(IdentypoError::data_format(format!(
                "vocabulary has {} tokens but frequency file has {}",
                vocabulary.len(),
                entries.len()
            )));
        }
        for (token, _) in &entries {
            if !vocab_set.contains_key(token.as_str()) {
                return Err(IdentypoError::data_format(format!(
                    "frequency token '{token}' is not in the vocabulary"
                )));
            }
        }

        Self::new(entries, embeddings)
    }

    /// Frequency of a token, 0 for unknown tokens.
    pub fn frequency(&self, token: &str) -> u64 {
        self.frequencies.get(token).copied().unwrap_or(0)
    }

    /// Check whether a token is in the vocabulary.
    pub fn contains(&self, token: &str) -> bool {
        self.frequencies.contains_key(token)
    }

    /// Number of vocabulary tokens.
    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    /// Whether the vocabulary is empty.
    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    /// The embedding table backing this index.
    pub fn embeddings(&self) -> &Arc<EmbeddingTable> {
        &self.embeddings
    }

    /// Iterate over (token, frequency) entries in rank order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, u64)> {
        self.by_rank
            .iter()
            .map(|token| (token.as_str(), self.frequencies[token]))
    }

    /// The `n` most frequent tokens, ties broken by token ascending.
    pub fn top_frequent(&self, n: usize) -> &[String] {
        &self.by_rank[..n.min(self.by_rank.len())]
    }

    /// Frequency rank percentile in (0.0, 1.0]; the most frequent token has
    /// percentile 1.0. Unknown tokens have percentile 0.0.
    pub fn rank_percentile(&self, token: &str) -> f64 {
        match self.ranks.get(token) {
            Some(&rank) => (self.by_rank.len() - rank) as f64 / self.by_rank.len() as f64,
            None => 0.0,
        }
    }

    /// Up to `k` nearest vocabulary tokens to the query vector by cosine
    /// similarity.
    ///
    /// Tokens without an embedding are skipped. Ties break by similarity
    /// descending, then frequency descending, then token ascending, so the
    /// result order is deterministic.
    pub fn nearest(&self, vector: &[f32], k: usize) -> Vec<(String, f32)> {
        self.nearest_excluding(vector, k, None)
    }

    /// Nearest tokens to a vocabulary token, excluding the token itself.
    pub fn nearest_token(&self, token: &str, k: usize) -> Vec<(String, f32)> {
        match self.embeddings.get(token) {
            Some(vector) => self.nearest_excluding(vector, k, Some(token)),
            None => Vec::new(),
        }
    }

    pub(crate) fn nearest_excluding(
        &self,
        vector: &[f32],
        k: usize,
        exclude: Option<&str>,
    ) -> Vec<(String, f32)> {
        let mut scored: Vec<(f32, u64, &String)> = Vec::new();
        for token in &self.by_rank {
            if exclude == Some(token.as_str()) {
                continue;
            }
            if let Some(embedded) = self.embeddings.get(token) {
                let similarity = cosine(vector, embedded);
                scored.push((similarity, self.frequencies[token], token));
            }
        }

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.1.cmp(&a.1))
                .then_with(|| a.2.cmp(b.2))
        });
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(similarity, _, token)| (token.clone(), similarity))
            .collect()
    }
}
