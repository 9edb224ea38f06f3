//! Candidate generation and feature extraction.
//!
//! A candidate is a vocabulary token proposed as a correction for one typo.
//! Candidates come from two independent strategies (embedding neighbors and
//! edit distance against frequent tokens) and carry provenance so the
//! feature extractor can tell which strategies produced them.

pub mod features;
pub mod generator;

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{IdentypoError, Result};
use crate::records::TypoRecord;

pub use features::{CandidateFeatures, FEATURE_DIM, FeatureExtractor};
pub use generator::{CandidateGenerator, GeneratorConfig};

/// Which strategies produced a candidate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Found by embedding nearest-neighbor search.
    pub neighbor: bool,
    /// Found by edit-distance search over frequent tokens.
    pub distance: bool,
}

impl Provenance {
    /// Provenance for the neighbor strategy only.
    pub fn neighbor() -> Self {
        Provenance {
            neighbor: true,
            distance: false,
        }
    }

    /// Provenance for the edit-distance strategy only.
    pub fn distance() -> Self {
        Provenance {
            neighbor: false,
            distance: true,
        }
    }

    /// Merge provenance from another sighting of the same token.
    pub fn merge(&mut self, other: Provenance) {
        self.neighbor |= other.neighbor;
        self.distance |= other.distance;
    }
}

/// One proposed correction for a typo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// The misspelled token this candidate corrects.
    pub typo: String,
    /// The proposed vocabulary token.
    pub token: String,
    /// Edit distance between typo and token.
    pub distance: usize,
    /// Which strategies produced this candidate.
    pub provenance: Provenance,
}

/// A candidate together with its extracted feature vector. This is the unit
/// persisted to the candidate cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub features: CandidateFeatures,
}

/// Candidates with features for a batch of typo records, one group per
/// record, in record order.
#[derive(Debug, Clone, Default)]
pub struct CandidateTable {
    groups: Vec<Vec<ScoredCandidate>>,
}

impl CandidateTable {
    /// Build a table from per-record groups.
    pub fn from_groups(groups: Vec<Vec<ScoredCandidate>>) -> Self {
        CandidateTable { groups }
    }

    /// Regroup flat cache rows against a batch of records.
    ///
    /// Every row's typo must belong to the batch; a typo with no rows gets
    /// an empty group, matching the "no suggestion available" contract.
    pub fn from_rows(rows: Vec<ScoredCandidate>, records: &[TypoRecord]) -> Result<Self> {
        let mut by_typo: AHashMap<&str, Vec<&ScoredCandidate>> = AHashMap::new();
        for record in records {
            by_typo.entry(record.typo.as_str()).or_default();
        }
        for row in &rows {
            match by_typo.get_mut(row.candidate.typo.as_str()) {
                Some(group) => group.push(row),
                None => {
                    return Err(IdentypoError::data_format(format!(
                        "candidate row for '{}' does not match any record in the batch",
                        row.candidate.typo
                    )));
                }
            }
        }

        let groups = records
            .iter()
            .map(|record| {
                by_typo[record.typo.as_str()]
                    .iter()
                    .map(|row| (*row).clone())
                    .collect()
            })
            .collect();

        Ok(CandidateTable { groups })
    }

    /// Per-record candidate groups.
    pub fn groups(&self) -> &[Vec<ScoredCandidate>] {
        &self.groups
    }

    /// Number of record groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether the table has no groups.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total number of candidate rows across all groups.
    pub fn row_count(&self) -> usize {
        self.groups.iter().map(|group| group.len()).sum()
    }

    /// Write all rows to a JSON-lines cache file.
    pub fn write_cache<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        for group in &self.groups {
            for row in group {
                serde_json::to_writer(&mut writer, row)?;
                writer.write_all(b"\n")?;
            }
        }
        writer.flush()?;
        Ok(())
    }

    /// Read cache rows and regroup them against a batch of records.
    ///
    /// Unparsable or schema-incompatible lines fail with `DataFormat`.
    pub fn read_cache<P: AsRef<Path>>(path: P, records: &[TypoRecord]) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let mut rows = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let row: ScoredCandidate = serde_json::from_str(&line).map_err(|e| {
                IdentypoError::data_format(format!(
                    "candidate cache line {}: {}",
                    line_no + 1,
                    e
                ))
            })?;
            rows.push(row);
        }

        Self::from_rows(rows, records)
    }
}
