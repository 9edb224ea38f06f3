//! Pretrained token embedding table.
//!
//! The embedding model itself is trained elsewhere; this module only holds
//! the resulting lookup table of fixed-dimension `f32` vectors and the
//! cosine similarity used by the nearest-neighbor index and the feature
//! extractor.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{IdentypoError, Result};

/// A read-only table mapping tokens to dense embedding vectors.
///
/// All vectors share one fixed dimensionality, established by the first
/// insertion. Tokens absent from the table yield `None`; callers decide how
/// to handle out-of-vocabulary tokens.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingTable {
    vectors: AHashMap<String, Vec<f32>>,
    dimension: usize,
}

impl EmbeddingTable {
    /// Create an empty table. The dimension is fixed by the first insert.
    pub fn new() -> Self {
        EmbeddingTable {
            vectors: AHashMap::new(),
            dimension: 0,
        }
    }

    /// Build a table from (token, vector) pairs.
    pub fn from_pairs<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, Vec<f32>)>,
    {
        let mut table = EmbeddingTable::new();
        for (token, vector) in pairs {
            table.insert(token, vector)?;
        }
        Ok(table)
    }

    /// Insert a vector for a token.
    ///
    /// Fails with `DimensionMismatch` if the vector width differs from the
    /// table's established dimension.
    pub fn insert(&mut self, token: String, vector: Vec<f32>) -> Result<()> {
        if self.vectors.is_empty() {
            self.dimension = vector.len();
        } else if vector.len() != self.dimension {
            return Err(IdentypoError::dimension_mismatch(
                self.dimension,
                vector.len(),
            ));
        }
        self.vectors.insert(token, vector);
        Ok(())
    }

    /// Look up the embedding vector for a token.
    pub fn get(&self, token: &str) -> Option<&[f32]> {
        self.vectors.get(token).map(|v| v.as_slice())
    }

    /// Check whether a token has an embedding.
    pub fn contains(&self, token: &str) -> bool {
        self.vectors.contains_key(token)
    }

    /// The fixed vector dimensionality (0 for an empty table).
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of tokens in the table.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Iterate over all (token, vector) entries.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f32])> {
        self.vectors
            .iter()
            .map(|(token, vector)| (token.as_str(), vector.as_slice()))
    }

    /// Load a table from a word2vec-style text file.
    ///
    /// Each line holds a token followed by its vector components, separated
    /// by whitespace. Ragged rows or unparsable components fail with
    /// `DataFormat`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut table = EmbeddingTable::new();

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let mut parts = line.split_whitespace();
            let Some(token) = parts.next() else {
                continue; // blank line
            };

            let mut vector = Vec::new();
            for part in parts {
                let value = part.parse::<f32>().map_err(|_| {
                    IdentypoError::data_format(format!(
                        "embedding line {}: invalid component '{}'",
                        line_no + 1,
                        part
                    ))
                })?;
                vector.push(value);
            }

            if vector.is_empty() {
                return Err(IdentypoError::data_format(format!(
                    "embedding line {}: token '{}' has no vector",
                    line_no + 1,
                    token
                )));
            }

            table.insert(token.to_string(), vector).map_err(|_| {
                IdentypoError::data_format(format!(
                    "embedding line {}: inconsistent vector width",
                    line_no + 1
                ))
            })?;
        }

        Ok(table)
    }
}

/// Cosine similarity between two vectors.
///
/// Returns 0.0 when either vector has zero norm, so zero vectors never rank
/// above real neighbors.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}
