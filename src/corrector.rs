//! The end-to-end correction pipeline.
//!
//! [`TyposCorrector`] ties the token index, candidate generator, feature
//! extractor, and ranker together behind a train/suggest surface, adds
//! batched processing for large inputs, and persists the whole trained
//! model to a single checksummed file.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::candidates::{
    CandidateGenerator, CandidateTable, FeatureExtractor, GeneratorConfig, ScoredCandidate,
};
use crate::embedding::EmbeddingTable;
use crate::error::{IdentypoError, Result};
use crate::index::TokenIndex;
use crate::ranker::{CandidatesRanker, GbdtParams, TrainingReport};
use crate::records::{SuggestionMap, TypoRecord, read_typo_records};

/// File magic for persisted models.
const MAGIC: &[u8; 4] = b"IDTY";
/// Bumped whenever the persisted payload layout changes.
const FORMAT_VERSION: u32 = 1;
/// Bytes before the payload: magic, version, payload length.
const HEADER_LEN: usize = 4 + 4 + 8;

/// Configuration for the whole pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectorConfig {
    /// Candidate generation settings.
    pub generator: GeneratorConfig,
    /// Ranker training hyperparameters.
    pub gbdt: GbdtParams,
    /// Maximum suggestions returned per typo.
    pub n_candidates: usize,
    /// Records per chunk in batched suggestion.
    pub batch_size: usize,
}

impl Default for CorrectorConfig {
    fn default() -> Self {
        CorrectorConfig {
            generator: GeneratorConfig::default(),
            gbdt: GbdtParams::default(),
            n_candidates: 3,
            batch_size: 2048,
        }
    }
}

/// Everything needed to reconstruct a trained corrector.
#[derive(Serialize, Deserialize)]
struct ModelState {
    embeddings: EmbeddingTable,
    vocabulary: Vec<(String, u64)>,
    config: CorrectorConfig,
    ranker: CandidatesRanker,
}

/// Trains on labeled typo records and suggests corrections for new ones.
///
/// The corrector is immutable after construction except for the ranker,
/// which sits behind a lock so suggestion calls can share the corrector
/// across threads while training replaces the model.
pub struct TyposCorrector {
    index: TokenIndex,
    generator: CandidateGenerator,
    extractor: FeatureExtractor,
    ranker: RwLock<CandidatesRanker>,
    config: CorrectorConfig,
}

impl TyposCorrector {
    /// Create an untrained corrector over a token index.
    pub fn new(index: TokenIndex, config: CorrectorConfig) -> Result<Self> {
        if config.n_candidates == 0 {
            return Err(IdentypoError::invalid_config(
                "n_candidates must be at least 1",
            ));
        }
        if config.batch_size == 0 {
            return Err(IdentypoError::invalid_config(
                "batch_size must be at least 1",
            ));
        }

        let generator = CandidateGenerator::new(config.generator.clone())?;
        let ranker = CandidatesRanker::new(config.gbdt.clone());
        Ok(TyposCorrector {
            index,
            generator,
            extractor: FeatureExtractor::new(),
            ranker: RwLock::new(ranker),
            config,
        })
    }

    /// The token index the corrector works against.
    pub fn index(&self) -> &TokenIndex {
        &self.index
    }

    /// The pipeline configuration.
    pub fn config(&self) -> &CorrectorConfig {
        &self.config
    }

    /// Whether the ranker has a trained model.
    pub fn is_trained(&self) -> bool {
        self.ranker.read().is_trained()
    }

    /// The last training report, if the corrector was trained this session
    /// or loaded from a trained model.
    pub fn training_report(&self) -> Option<TrainingReport> {
        self.ranker.read().report().cloned()
    }

    /// Generate candidates with features for a batch of records.
    pub fn generate_candidates(&self, records: &[TypoRecord]) -> Result<CandidateTable> {
        let typos: Vec<String> = records.iter().map(|r| r.typo.clone()).collect();
        let raw = self.generator.generate(&self.index, &typos);

        let mut groups = Vec::with_capacity(raw.len());
        for candidates in raw {
            let mut group = Vec::with_capacity(candidates.len());
            for candidate in candidates {
                let features = self.extractor.extract(&self.index, &candidate)?;
                group.push(ScoredCandidate {
                    candidate,
                    features,
                });
            }
            groups.push(group);
        }
        Ok(CandidateTable::from_groups(groups))
    }

    /// Train the ranker on labeled records.
    ///
    /// Pass `candidates` to reuse a previously generated (or cached) table
    /// instead of regenerating; pass `save_candidates_to` to write the
    /// generated table to a cache file for later runs.
    pub fn train(
        &self,
        records: &[TypoRecord],
        candidates: Option<&CandidateTable>,
        save_candidates_to: Option<&Path>,
    ) -> Result<()> {
        let generated;
        let table = match candidates {
            Some(table) => table,
            None => {
                generated = self.generate_candidates(records)?;
                &generated
            }
        };
        if let Some(path) = save_candidates_to {
            table.write_cache(path)?;
        }

        self.ranker.write().fit(records, table)
    }

    /// Train from a JSON-lines file of labeled records.
    ///
    /// `candidates_path` points at a previously written candidate cache to
    /// skip generation; `save_candidates_to` writes the candidates used for
    /// this run.
    pub fn train_from_file<P: AsRef<Path>>(
        &self,
        path: P,
        candidates_path: Option<&Path>,
        save_candidates_to: Option<&Path>,
    ) -> Result<()> {
        let records = read_typo_records(path)?;
        match candidates_path {
            Some(cache) => {
                let table = CandidateTable::read_cache(cache, &records)?;
                self.train(&records, Some(&table), save_candidates_to)
            }
            None => self.train(&records, None, save_candidates_to),
        }
    }

    /// Suggest corrections for a batch of records.
    ///
    /// `candidates` and `save_candidates_to` work as in [`train`]. Each
    /// suggestion list is truncated to `n_candidates`. With `return_all`
    /// false, typos the model considers already correct are left out of
    /// the result.
    ///
    /// [`train`]: TyposCorrector::train
    pub fn suggest(
        &self,
        records: &[TypoRecord],
        candidates: Option<&CandidateTable>,
        n_candidates: usize,
        return_all: bool,
        save_candidates_to: Option<&Path>,
    ) -> Result<SuggestionMap> {
        if n_candidates == 0 {
            return Err(IdentypoError::invalid_config(
                "n_candidates must be at least 1",
            ));
        }

        let generated;
        let table = match candidates {
            Some(table) => table,
            None => {
                generated = self.generate_candidates(records)?;
                &generated
            }
        };
        if let Some(path) = save_candidates_to {
            table.write_cache(path)?;
        }

        self.ranker
            .read()
            .rank(records, table, &self.index, n_candidates, return_all)
    }

    /// Suggest corrections in fixed-size chunks of `batch_size` records.
    ///
    /// Output is identical to a single [`suggest`] call over the whole
    /// batch; chunking only bounds peak candidate memory. Candidate caching
    /// is not available here since each chunk generates and drops its own
    /// table.
    ///
    /// [`suggest`]: TyposCorrector::suggest
    pub fn suggest_by_batches(
        &self,
        records: &[TypoRecord],
        batch_size: usize,
        return_all: bool,
    ) -> Result<SuggestionMap> {
        if batch_size == 0 {
            return Err(IdentypoError::invalid_config(
                "batch_size must be at least 1",
            ));
        }

        let mut merged = SuggestionMap::new();
        for chunk in records.chunks(batch_size) {
            let partial = self.suggest(chunk, None, self.config.n_candidates, return_all, None)?;
            merged.merge(partial);
        }
        Ok(merged)
    }

    /// Suggest corrections for a JSON-lines file of records.
    ///
    /// With a `candidates_path` cache (or a `save_candidates_to` target)
    /// the whole file is processed in one call so the cache covers every
    /// record; otherwise records are processed in configured-size batches.
    pub fn suggest_from_file<P: AsRef<Path>>(
        &self,
        path: P,
        return_all: bool,
        candidates_path: Option<&Path>,
        save_candidates_to: Option<&Path>,
    ) -> Result<SuggestionMap> {
        let records = read_typo_records(path)?;
        match candidates_path {
            Some(cache) => {
                let table = CandidateTable::read_cache(cache, &records)?;
                self.suggest(
                    &records,
                    Some(&table),
                    self.config.n_candidates,
                    return_all,
                    save_candidates_to,
                )
            }
            None if save_candidates_to.is_some() => self.suggest(
                &records,
                None,
                self.config.n_candidates,
                return_all,
                save_candidates_to,
            ),
            None => self.suggest_by_batches(&records, self.config.batch_size, return_all),
        }
    }

    /// Persist the corrector to a single file.
    ///
    /// Layout: magic, format version, payload length, bincode payload,
    /// CRC32 of the payload. The worker pools are rebuilt on load and are
    /// not part of the payload.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let state = ModelState {
            embeddings: EmbeddingTable::clone(self.index.embeddings()),
            vocabulary: self
                .index
                .entries()
                .map(|(token, frequency)| (token.to_string(), frequency))
                .collect(),
            config: self.config.clone(),
            ranker: self.ranker.read().clone(),
        };
        let payload = bincode::serialize(&state)
            .map_err(|e| IdentypoError::persistence(format!("encode model: {e}")))?;

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(MAGIC)?;
        writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
        writer.write_all(&(payload.len() as u64).to_le_bytes())?;
        writer.write_all(&payload)?;
        writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
        writer.flush()?;
        Ok(())
    }

    /// Load a corrector persisted with [`save`].
    ///
    /// Fails with `Persistence` on a bad magic, an unsupported version, a
    /// truncated file, or a checksum mismatch.
    ///
    /// [`save`]: TyposCorrector::save
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = fs::read(path)?;
        if bytes.len() < HEADER_LEN + 4 {
            return Err(IdentypoError::persistence("model file is truncated"));
        }
        if &bytes[..4] != MAGIC {
            return Err(IdentypoError::persistence(
                "not a corrector model file (bad magic)",
            ));
        }
        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != FORMAT_VERSION {
            return Err(IdentypoError::persistence(format!(
                "unsupported model format version {version}, expected {FORMAT_VERSION}"
            )));
        }
        let payload_len = u64::from_le_bytes([
            bytes[8], bytes[9], bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15],
        ]) as usize;
        if bytes.len() != HEADER_LEN + payload_len + 4 {
            return Err(IdentypoError::persistence(
                "model file length does not match header",
            ));
        }
        let payload = &bytes[HEADER_LEN..HEADER_LEN + payload_len];
        let stored_crc = u32::from_le_bytes([
            bytes[HEADER_LEN + payload_len],
            bytes[HEADER_LEN + payload_len + 1],
            bytes[HEADER_LEN + payload_len + 2],
            bytes[HEADER_LEN + payload_len + 3],
        ]);
        if crc32fast::hash(payload) != stored_crc {
            return Err(IdentypoError::persistence("model file checksum mismatch"));
        }

        let state: ModelState = bincode::deserialize(payload)
            .map_err(|e| IdentypoError::persistence(format!("decode model: {e}")))?;

        let index = TokenIndex::new(state.vocabulary, Arc::new(state.embeddings))?;
        let generator = CandidateGenerator::new(state.config.generator.clone())?;
        Ok(TyposCorrector {
            index,
            generator,
            extractor: FeatureExtractor::new(),
            ranker: RwLock::new(state.ranker),
            config: state.config,
        })
    }
}
