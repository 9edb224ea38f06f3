//! Input typo records and output suggestion types.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{IdentypoError, Result};

/// One input unit: a misspelled token, optionally with the identifier it
/// came from and the identifier's token split.
///
/// For training, `identifier` carries the ground-truth corrected token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypoRecord {
    /// The misspelled token.
    pub typo: String,
    /// The corrected token (training) or source identifier context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Pre-tokenized identifier parts, when available. Carried through
    /// record IO for downstream consumers; candidate generation and ranking
    /// do not read it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_split: Option<Vec<String>>,
}

impl TypoRecord {
    /// A bare record with just the typo.
    pub fn new<S: Into<String>>(typo: S) -> Self {
        TypoRecord {
            typo: typo.into(),
            identifier: None,
            token_split: None,
        }
    }

    /// A training record with its ground-truth correction.
    pub fn with_identifier<S: Into<String>, T: Into<String>>(typo: S, identifier: T) -> Self {
        TypoRecord {
            typo: typo.into(),
            identifier: Some(identifier.into()),
            token_split: None,
        }
    }
}

/// Read typo records from a JSON-lines file.
pub fn read_typo_records<P: AsRef<Path>>(path: P) -> Result<Vec<TypoRecord>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: TypoRecord = serde_json::from_str(&line).map_err(|e| {
            IdentypoError::data_format(format!("typo record line {}: {}", line_no + 1, e))
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Write typo records to a JSON-lines file.
pub fn write_typo_records<P: AsRef<Path>>(path: P, records: &[TypoRecord]) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// One ranked correction for a typo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    /// The proposed vocabulary token.
    pub token: String,
    /// Correction probability from the ranker, in (0, 1).
    pub score: f64,
}

/// A flattened suggestion, one row per (typo, candidate), for tabular
/// serialization of a whole [`SuggestionMap`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionRow {
    pub typo: String,
    pub rank: usize,
    pub token: String,
    pub score: f64,
}

/// Ordered mapping from typo to ranked suggestions.
///
/// Preserves first-seen input order; inserting a typo that is already
/// present is a no-op, which is what makes batched suggestion
/// concatenation order-stable.
#[derive(Debug, Clone, Default)]
pub struct SuggestionMap {
    entries: Vec<(String, Vec<Suggestion>)>,
    positions: AHashMap<String, usize>,
}

impl SuggestionMap {
    /// Create an empty map.
    pub fn new() -> Self {
        SuggestionMap::default()
    }

    /// Insert suggestions for a typo; first insertion wins.
    pub fn insert(&mut self, typo: String, suggestions: Vec<Suggestion>) {
        if self.positions.contains_key(&typo) {
            return;
        }
        self.positions.insert(typo.clone(), self.entries.len());
        self.entries.push((typo, suggestions));
    }

    /// Suggestions for a typo, if present.
    pub fn get(&self, typo: &str) -> Option<&[Suggestion]> {
        self.positions
            .get(typo)
            .map(|&at| self.entries[at].1.as_slice())
    }

    /// Whether the map has an entry for a typo.
    pub fn contains(&self, typo: &str) -> bool {
        self.positions.contains_key(typo)
    }

    /// Number of typos in the map.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Suggestion])> {
        self.entries
            .iter()
            .map(|(typo, suggestions)| (typo.as_str(), suggestions.as_slice()))
    }

    /// Absorb another map, keeping this map's entries on conflict.
    pub fn merge(&mut self, other: SuggestionMap) {
        for (typo, suggestions) in other.entries {
            self.insert(typo, suggestions);
        }
    }

    /// Flatten to tabular rows for downstream serialization.
    pub fn to_rows(&self) -> Vec<SuggestionRow> {
        let mut rows = Vec::new();
        for (typo, suggestions) in &self.entries {
            for (rank, suggestion) in suggestions.iter().enumerate() {
                rows.push(SuggestionRow {
                    typo: typo.clone(),
                    rank,
                    token: suggestion.token.clone(),
                    score: suggestion.score,
                });
            }
        }
        rows
    }
}

impl PartialEq for SuggestionMap {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}
