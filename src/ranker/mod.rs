//! Candidate ranking with a learned scorer.
//!
//! The ranker turns candidate feature vectors into correction
//! probabilities and assembles the final per-typo suggestion lists. The
//! underlying model is the boosted ensemble in [`gbdt`].

pub mod gbdt;

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::candidates::{CandidateTable, ScoredCandidate};
use crate::error::{IdentypoError, Result};
use crate::index::TokenIndex;
use crate::records::{Suggestion, SuggestionMap, TypoRecord};

pub use gbdt::{GbdtParams, GradientBoostedTrees, TrainingReport};

/// Ranks correction candidates by learned correction probability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidatesRanker {
    model: GradientBoostedTrees,
}

impl CandidatesRanker {
    /// Create an untrained ranker.
    pub fn new(params: GbdtParams) -> Self {
        CandidatesRanker {
            model: GradientBoostedTrees::new(params),
        }
    }

    /// Whether the ranker has a trained model.
    pub fn is_trained(&self) -> bool {
        self.model.is_trained()
    }

    /// The last training report, if any.
    pub fn report(&self) -> Option<&TrainingReport> {
        self.model.report()
    }

    /// Fit the scorer on a training batch.
    ///
    /// A candidate is a positive example when its token equals the
    /// record's ground-truth correction (the `identifier` field); every
    /// other candidate for the same typo is a negative. Records without an
    /// identifier cannot be used for training.
    pub fn fit(&mut self, records: &[TypoRecord], candidates: &CandidateTable) -> Result<()> {
        if records.len() != candidates.len() {
            return Err(IdentypoError::internal(format!(
                "{} records but {} candidate groups",
                records.len(),
                candidates.len()
            )));
        }

        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for (record, group) in records.iter().zip(candidates.groups()) {
            let Some(truth) = record.identifier.as_deref() else {
                return Err(IdentypoError::data_format(format!(
                    "training record for '{}' has no identifier",
                    record.typo
                )));
            };
            for scored in group {
                rows.push(scored.features.as_array().to_vec());
                labels.push(if scored.candidate.token == truth {
                    1.0
                } else {
                    0.0
                });
            }
        }

        if rows.is_empty() {
            return Err(IdentypoError::other(
                "cannot train ranker: batch produced no candidate rows",
            ));
        }

        self.model.fit(&rows, &labels)
    }

    /// Score and rank candidates into per-typo suggestion lists.
    ///
    /// Suggestions sort by score descending, with ties broken by candidate
    /// frequency descending and then token ascending. Each list is
    /// truncated to `n_candidates`. With `return_all` false, typos whose
    /// top suggestion is the typo itself are left out of the result; with
    /// it true every input typo is present, using an empty list when no
    /// candidates exist.
    pub fn rank(
        &self,
        records: &[TypoRecord],
        candidates: &CandidateTable,
        index: &TokenIndex,
        n_candidates: usize,
        return_all: bool,
    ) -> Result<SuggestionMap> {
        if !self.is_trained() {
            return Err(IdentypoError::not_trained(
                "ranker must be trained or loaded before suggesting",
            ));
        }
        if records.len() != candidates.len() {
            return Err(IdentypoError::internal(format!(
                "{} records but {} candidate groups",
                records.len(),
                candidates.len()
            )));
        }

        let mut map = SuggestionMap::new();
        for (record, group) in records.iter().zip(candidates.groups()) {
            if map.contains(&record.typo) {
                continue;
            }

            let suggestions = self.rank_group(group, index, n_candidates)?;
            if !return_all
                && suggestions
                    .first()
                    .is_some_and(|top| top.token == record.typo)
            {
                continue;
            }
            map.insert(record.typo.clone(), suggestions);
        }

        Ok(map)
    }

    fn rank_group(
        &self,
        group: &[ScoredCandidate],
        index: &TokenIndex,
        n_candidates: usize,
    ) -> Result<Vec<Suggestion>> {
        let mut scored: Vec<(f64, u64, &str)> = Vec::with_capacity(group.len());
        for candidate in group {
            let score = self
                .model
                .predict_probability(&candidate.features.as_array())?;
            scored.push((
                score,
                index.frequency(&candidate.candidate.token),
                candidate.candidate.token.as_str(),
            ));
        }

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.1.cmp(&a.1))
                .then_with(|| a.2.cmp(b.2))
        });
        scored.truncate(n_candidates);

        Ok(scored
            .into_iter()
            .map(|(score, _, token)| Suggestion {
                token: token.to_string(),
                score,
            })
            .collect())
    }
}
