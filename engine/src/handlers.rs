//! Command handlers for CLI operations
//!
//! - search: evolve agents on the validation split
//! - evaluate: score the archive on the test split
//! - run: search, then evaluate
//! - summary: print the archives of an experiment

use anyhow::{Context, Result};
use sdk::types::{Candidate, Generation};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

use crate::archive::{ArchiveKind, ArchiveStore};
use crate::config::Config;
use crate::dataset::JsonlQuestionSource;
use crate::llm::openai::OpenAIOracle;
use crate::search::{EvaluationPassReport, SearchReport, Searcher};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

fn build_searcher(config: &Config, experiment: &str) -> Result<Searcher> {
    let oracle = OpenAIOracle::from_config(&config.oracle).context("Failed to create oracle client")?;
    let source = JsonlQuestionSource::new(config.dataset.clone());
    Ok(Searcher::new(
        Arc::new(oracle),
        Arc::new(source),
        config,
        experiment,
    ))
}

/// Run the search phase
pub async fn handle_search(config: &Config, experiment: &str, format: OutputFormat) -> Result<()> {
    let searcher = build_searcher(config, experiment)?;
    let started = chrono::Local::now();

    let report = searcher
        .search()
        .await
        .with_context(|| format!("Search failed for experiment {}", experiment))?;

    print_search_report(&report, searcher.archive_store().path(), started, format)
}

/// Run the evaluation phase
pub async fn handle_evaluate(config: &Config, experiment: &str, format: OutputFormat) -> Result<()> {
    let searcher = build_searcher(config, experiment)?;
    let started = chrono::Local::now();

    let report = searcher
        .evaluate()
        .await
        .with_context(|| format!("Evaluation failed for experiment {}", experiment))?;

    print_evaluation_report(&report, searcher.evaluation_store().path(), started, format)
}

/// Search, then evaluate, on the same searcher
pub async fn handle_run(config: &Config, experiment: &str, format: OutputFormat) -> Result<()> {
    let searcher = build_searcher(config, experiment)?;

    let started = chrono::Local::now();
    let search = searcher
        .search()
        .await
        .with_context(|| format!("Search failed for experiment {}", experiment))?;
    print_search_report(&search, searcher.archive_store().path(), started, format)?;

    let started = chrono::Local::now();
    let evaluation = searcher
        .evaluate()
        .await
        .with_context(|| format!("Evaluation failed for experiment {}", experiment))?;
    print_evaluation_report(&evaluation, searcher.evaluation_store().path(), started, format)
}

fn print_search_report(
    report: &SearchReport,
    path: &Path,
    started: chrono::DateTime<chrono::Local>,
    format: OutputFormat,
) -> Result<()> {
    let elapsed = chrono::Local::now().signed_duration_since(started);
    match format {
        OutputFormat::Text => {
            println!("Search finished in {}s", elapsed.num_seconds());
            println!("  Seeds scored: {}", report.seeds_scored);
            println!("  Generations committed: {}", report.committed);
            println!("  Generations abandoned: {}", report.abandoned);
            println!("  Archive: {} ({} entries)", path.display(), report.archive_len);
        }
        OutputFormat::Json => {
            let output = json!({
                "phase": "search",
                "seeds_scored": report.seeds_scored,
                "committed": report.committed,
                "abandoned": report.abandoned,
                "archive_len": report.archive_len,
                "archive": path,
                "started_at": started.to_rfc3339(),
                "elapsed_secs": elapsed.num_seconds(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn print_evaluation_report(
    report: &EvaluationPassReport,
    path: &Path,
    started: chrono::DateTime<chrono::Local>,
    format: OutputFormat,
) -> Result<()> {
    let elapsed = chrono::Local::now().signed_duration_since(started);
    match format {
        OutputFormat::Text => {
            println!("Evaluation finished in {}s", elapsed.num_seconds());
            println!("  Evaluated: {}", report.evaluated);
            println!("  Already done: {}", report.skipped);
            println!("  Failed: {}", report.failed);
            println!("  Archive: {}", path.display());
        }
        OutputFormat::Json => {
            let output = json!({
                "phase": "evaluation",
                "evaluated": report.evaluated,
                "skipped": report.skipped,
                "failed": report.failed,
                "archive": path,
                "started_at": started.to_rfc3339(),
                "elapsed_secs": elapsed.num_seconds(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Best seed and best generated entry by the given accuracy
fn best_by<'a>(
    archive: &'a [Candidate],
    accuracy: impl Fn(&Candidate) -> Option<f64>,
) -> (Option<&'a Candidate>, Option<&'a Candidate>) {
    let best = |initial: bool| {
        archive
            .iter()
            .filter(|c| matches!(c.generation, Some(Generation::Initial)) == initial)
            .filter(|c| accuracy(c).is_some())
            .max_by(|a, b| {
                let a = accuracy(a).unwrap_or_default();
                let b = accuracy(b).unwrap_or_default();
                a.total_cmp(&b)
            })
    };
    (best(true), best(false))
}

fn modified_at(path: &Path) -> String {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(|t| {
            chrono::DateTime::<chrono::Local>::from(t)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|_| "Unknown".to_string())
}

/// Print both archives of an experiment
pub async fn handle_summary(config: &Config, experiment: &str, format: OutputFormat) -> Result<()> {
    let save_dir = &config.core.save_dir;
    let search_store = ArchiveStore::for_experiment(save_dir, experiment, ArchiveKind::Search);
    let eval_store = ArchiveStore::for_experiment(save_dir, experiment, ArchiveKind::Evaluation);

    let archive = search_store
        .load()
        .context("Failed to read search archive")?
        .with_context(|| format!("No archive at {}", search_store.path().display()))?;
    let evaluated = eval_store
        .load()
        .context("Failed to read evaluation archive")?
        .unwrap_or_default();

    let (best_seed, best_evolved) = best_by(&archive, |c| c.accuracy);
    let (best_seed_test, best_evolved_test) = best_by(&evaluated, |c| c.test_accuracy);

    match format {
        OutputFormat::Text => {
            println!("Experiment: {}", experiment);
            println!(
                "Archive: {} (updated {})",
                search_store.path().display(),
                modified_at(search_store.path())
            );
            println!();

            for (index, entry) in archive.iter().enumerate() {
                let generation = entry
                    .generation
                    .map(|g| g.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("[{}] generation {}: {}", index, generation, entry.name);
                println!(
                    "  Fitness: {}",
                    entry.fitness.as_deref().unwrap_or("not scored")
                );
                if let Some(test_fitness) = evaluated.get(index).and_then(|e| e.test_fitness.as_deref()) {
                    println!("  Test fitness: {}", test_fitness);
                }
            }

            println!();
            let describe = |c: Option<&Candidate>, acc: fn(&Candidate) -> Option<f64>| match c {
                Some(c) => format!("{} ({:.1}%)", c.name, acc(c).unwrap_or_default() * 100.0),
                None => "none".to_string(),
            };
            println!("Best initial: {}", describe(best_seed, |c| c.accuracy));
            println!("Best evolved: {}", describe(best_evolved, |c| c.accuracy));
            if !evaluated.is_empty() {
                println!("Best initial (test): {}", describe(best_seed_test, |c| c.test_accuracy));
                println!("Best evolved (test): {}", describe(best_evolved_test, |c| c.test_accuracy));
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "experiment": experiment,
                "archive": search_store.path(),
                "entries": archive,
                "evaluated": evaluated,
                "best_initial": best_seed.map(|c| &c.name),
                "best_evolved": best_evolved.map(|c| &c.name),
                "best_initial_test": best_seed_test.map(|c| &c.name),
                "best_evolved_test": best_evolved_test.map(|c| &c.name),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(name: &str, generation: Generation, accuracy: f64) -> Candidate {
        let mut c = Candidate::new(name, "t", "[x]\nsteps = []");
        c.generation = Some(generation);
        c.accuracy = Some(accuracy);
        c
    }

    #[test]
    fn test_best_by_splits_seeds_and_generations() {
        let archive = vec![
            scored("cot", Generation::Initial, 0.6),
            scored("debate", Generation::Initial, 0.7),
            scored("gen1", Generation::Number(1), 0.65),
            scored("gen2", Generation::Number(2), 0.72),
            Candidate::new("unscored", "t", "[x]"),
        ];

        let (seed, evolved) = best_by(&archive, |c| c.accuracy);
        assert_eq!(seed.unwrap().name, "debate");
        assert_eq!(evolved.unwrap().name, "gen2");
    }

    #[test]
    fn test_best_by_empty() {
        let (seed, evolved) = best_by(&[], |c| c.test_accuracy);
        assert!(seed.is_none() && evolved.is_none());
    }
}
