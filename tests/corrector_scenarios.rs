//! End-to-end scenarios for the correction pipeline.

use std::sync::Arc;

use identypo::candidates::GeneratorConfig;
use identypo::corrector::{CorrectorConfig, TyposCorrector};
use identypo::embedding::EmbeddingTable;
use identypo::error::Result;
use identypo::index::TokenIndex;
use identypo::ranker::GbdtParams;
use identypo::records::TypoRecord;
use tempfile::NamedTempFile;

fn scenario_config() -> CorrectorConfig {
    CorrectorConfig {
        generator: GeneratorConfig {
            threads: 2,
            ..GeneratorConfig::default()
        },
        gbdt: GbdtParams {
            rounds: 120,
            early_stopping_rounds: 0,
            max_depth: 3,
            learning_rate: 0.3,
            subsample_rows: 1.0,
            subsample_columns: 1.0,
            l1_regularization: 0.0,
            min_child_weight: 0.0,
            validation_fraction: 0.0,
            seed: 42,
            threads: 2,
        },
        n_candidates: 3,
        batch_size: 3,
    }
}

fn scenario_corrector() -> Result<TyposCorrector> {
    let embeddings = Arc::new(EmbeddingTable::from_pairs(vec![
        ("length".to_string(), vec![1.0, 0.0, 0.0, 0.1]),
        ("width".to_string(), vec![0.0, 1.0, 0.0, 0.1]),
        ("height".to_string(), vec![0.7, 0.1, 0.7, 0.1]),
        ("size".to_string(), vec![0.5, 0.5, 0.0, 0.2]),
        ("count".to_string(), vec![0.1, 0.2, 0.9, 0.3]),
    ])?);
    let index = TokenIndex::new(
        vec![
            ("length".to_string(), 500),
            ("width".to_string(), 400),
            ("height".to_string(), 300),
            ("size".to_string(), 200),
            ("count".to_string(), 100),
        ],
        embeddings,
    )?;
    TyposCorrector::new(index, scenario_config())
}

fn training_records() -> Vec<TypoRecord> {
    [
        ("lenght", "length"),
        ("lengt", "length"),
        ("lenth", "length"),
        ("legnth", "length"),
        ("widht", "width"),
        ("widt", "width"),
        ("wdith", "width"),
        ("witdh", "width"),
        ("heigth", "height"),
        ("heihgt", "height"),
        ("hight", "height"),
        ("sizee", "size"),
        ("sze", "size"),
        ("coutn", "count"),
        ("cnt", "count"),
        ("lenght", "length"),
        ("widhts", "width"),
    ]
    .into_iter()
    .map(|(typo, truth)| TypoRecord::with_identifier(typo, truth))
    .collect()
}

fn trained_corrector() -> Result<TyposCorrector> {
    let corrector = scenario_corrector()?;
    corrector.train(&training_records(), None, None)?;
    Ok(corrector)
}

#[test]
fn test_known_typo_gets_confident_correction() -> Result<()> {
    let corrector = trained_corrector()?;

    let queries = vec![TypoRecord::new("lenght")];
    let suggestions = corrector.suggest(&queries, None, 3, true, None)?;
    let list = suggestions.get("lenght").unwrap();

    assert_eq!(list[0].token, "length");
    assert!(list[0].score > 0.5, "top score was {}", list[0].score);
    assert!(list.len() <= 3);
    Ok(())
}

#[test]
fn test_correct_token_suppressed_unless_return_all() -> Result<()> {
    let corrector = trained_corrector()?;

    let queries = vec![TypoRecord::new("length"), TypoRecord::new("widht")];
    let all = corrector.suggest(&queries, None, 3, true, None)?;
    assert!(all.contains("length"));
    assert_eq!(all.get("length").unwrap()[0].token, "length");

    let corrected_only = corrector.suggest(&queries, None, 3, false, None)?;
    assert!(!corrected_only.contains("length"));
    assert_eq!(corrected_only.get("widht").unwrap()[0].token, "width");
    Ok(())
}

#[test]
fn test_uncoverable_typo_yields_empty_list() -> Result<()> {
    let corrector = trained_corrector()?;

    // Nothing in the vocabulary is within reach of this token.
    let queries = vec![TypoRecord::new("zzzzzzzzzzzzzzzzzzzz")];
    let suggestions = corrector.suggest(&queries, None, 3, true, None)?;
    assert_eq!(
        suggestions.get("zzzzzzzzzzzzzzzzzzzz").unwrap().len(),
        0
    );
    Ok(())
}

#[test]
fn test_suggestions_are_deterministic() -> Result<()> {
    let corrector = trained_corrector()?;

    let queries: Vec<TypoRecord> = ["lenght", "heigth", "sze", "widt"]
        .iter()
        .map(|t| TypoRecord::new(*t))
        .collect();
    let first = corrector.suggest(&queries, None, 3, true, None)?;
    let second = corrector.suggest(&queries, None, 3, true, None)?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn test_retraining_is_deterministic() -> Result<()> {
    let first = trained_corrector()?;
    let second = trained_corrector()?;

    let queries: Vec<TypoRecord> = ["lenght", "heigth", "coutn"]
        .iter()
        .map(|t| TypoRecord::new(*t))
        .collect();
    assert_eq!(
        first.suggest(&queries, None, 3, true, None)?,
        second.suggest(&queries, None, 3, true, None)?
    );
    Ok(())
}

#[test]
fn test_batched_output_matches_single_call() -> Result<()> {
    let corrector = trained_corrector()?;

    // Includes a duplicate typo and a hopeless one to exercise the merge.
    let queries: Vec<TypoRecord> = [
        "lenght", "widht", "heigth", "sze", "lenght", "qqqqqqqq", "coutn", "hight",
    ]
    .iter()
    .map(|t| TypoRecord::new(*t))
    .collect();

    let single = corrector.suggest(&queries, None, 3, true, None)?;
    let batched = corrector.suggest_by_batches(&queries, 3, true)?;
    assert_eq!(single, batched);
    Ok(())
}

#[test]
fn test_duplicate_typos_keep_first_position() -> Result<()> {
    let corrector = trained_corrector()?;

    let queries: Vec<TypoRecord> = ["widht", "lenght", "widht"]
        .iter()
        .map(|t| TypoRecord::new(*t))
        .collect();
    let suggestions = corrector.suggest(&queries, None, 3, true, None)?;

    let order: Vec<&str> = suggestions.iter().map(|(typo, _)| typo).collect();
    assert_eq!(order, vec!["widht", "lenght"]);
    Ok(())
}

#[test]
fn test_persistence_round_trip_preserves_output() -> Result<()> {
    let corrector = trained_corrector()?;
    let file = NamedTempFile::new().unwrap();
    corrector.save(file.path())?;

    let loaded = TyposCorrector::load(file.path())?;
    assert!(loaded.is_trained());
    assert_eq!(loaded.index().len(), corrector.index().len());

    let queries: Vec<TypoRecord> = ["lenght", "widht", "heigth", "sze"]
        .iter()
        .map(|t| TypoRecord::new(*t))
        .collect();
    assert_eq!(
        corrector.suggest(&queries, None, 3, true, None)?,
        loaded.suggest(&queries, None, 3, true, None)?
    );
    Ok(())
}

#[test]
fn test_file_to_file_workflow() -> Result<()> {
    let corrector = scenario_corrector()?;

    let train_file = NamedTempFile::new().unwrap();
    identypo::records::write_typo_records(train_file.path(), &training_records())?;
    corrector.train_from_file(train_file.path(), None, None)?;

    let query_file = NamedTempFile::new().unwrap();
    let queries = vec![TypoRecord::new("lenght"), TypoRecord::new("widht")];
    identypo::records::write_typo_records(query_file.path(), &queries)?;

    let suggestions = corrector.suggest_from_file(query_file.path(), true, None, None)?;
    assert_eq!(suggestions.get("lenght").unwrap()[0].token, "length");
    assert_eq!(suggestions.get("widht").unwrap()[0].token, "width");
    Ok(())
}

#[test]
fn test_file_workflow_with_candidate_cache() -> Result<()> {
    let corrector = scenario_corrector()?;

    // First training run writes the candidate cache.
    let train_file = NamedTempFile::new().unwrap();
    identypo::records::write_typo_records(train_file.path(), &training_records())?;
    let train_cache = NamedTempFile::new().unwrap();
    corrector.train_from_file(train_file.path(), None, Some(train_cache.path()))?;

    // A second corrector retrains from the cache alone.
    let retrained = scenario_corrector()?;
    retrained.train_from_file(train_file.path(), Some(train_cache.path()), None)?;

    let query_file = NamedTempFile::new().unwrap();
    let queries = vec![TypoRecord::new("lenght"), TypoRecord::new("heigth")];
    identypo::records::write_typo_records(query_file.path(), &queries)?;

    // Suggestion cache round trip: writing the cache then reading it back
    // must not change the output.
    let query_cache = NamedTempFile::new().unwrap();
    let fresh = corrector.suggest_from_file(
        query_file.path(),
        true,
        None,
        Some(query_cache.path()),
    )?;
    let from_cache =
        corrector.suggest_from_file(query_file.path(), true, Some(query_cache.path()), None)?;
    assert_eq!(fresh, from_cache);

    assert_eq!(
        retrained.suggest_from_file(query_file.path(), true, None, None)?,
        corrector.suggest_from_file(query_file.path(), true, None, None)?
    );
    Ok(())
}
