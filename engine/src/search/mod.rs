//! Search Loop
//!
//! Drives the two phases of an experiment:
//!
//! 1. **Search** on the validation split. Unscored seeds are scored first,
//!    then each generation proposes, evaluates, repairs and commits one
//!    candidate (see [`GenerationState`]). The archive is saved after every
//!    scored seed and every committed generation.
//! 2. **Evaluation** on the test split. Every search entry is re-scored
//!    without the accuracy floor and written, with `test_fitness` and
//!    `test_accuracy`, to the separate evaluation archive. The search archive
//!    is only read.
//!
//! Both phases resume from what is already on disk.

pub mod state;

pub use state::GenerationState;

use sdk::errors::EngineError;
use sdk::types::{Candidate, Generation, QuestionItem};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::agent::{AgentSettings, EvalMode};
use crate::archive::{last_generated, next_generation, ArchiveKind, ArchiveStore};
use crate::config::{Config, SearchConfig};
use crate::dataset::{QuestionSource, Split};
use crate::harness::{EvaluationReport, Harness, HarnessConfig};
use crate::llm::Oracle;
use crate::meta_agent::{initial_archive, MetaAgent};
use crate::runtime::CandidateLoader;
use crate::scorer::{bootstrap_confidence_interval, BootstrapConfig, FitnessSummary};
use crate::secrets::scrub_secrets;

/// Proposal keys dropped before a candidate enters the archive
const TRANSIENT_KEYS: &[&str] = &["debug_thought", "reflection"];

/// Counts from one search phase
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchReport {
    pub seeds_scored: usize,
    pub committed: usize,
    pub abandoned: usize,
    pub archive_len: usize,
}

/// Counts from one evaluation phase
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationPassReport {
    pub evaluated: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Scored evaluation: bootstrap summary plus raw mean
struct Scored {
    fitness: FitnessSummary,
    accuracy: f64,
}

/// Outcome of one search-split evaluation attempt
enum Attempt {
    Passed(Scored),
    /// Mean accuracy under the floor; carries the observation for repair
    BelowFloor(String),
}

/// Runs search and evaluation for one experiment
pub struct Searcher {
    meta: MetaAgent,
    harness: Harness,
    source: Arc<dyn QuestionSource>,
    bootstrap: BootstrapConfig,
    search: SearchConfig,
    archive: ArchiveStore,
    evaluation_archive: ArchiveStore,
}

impl Searcher {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        source: Arc<dyn QuestionSource>,
        config: &Config,
        experiment: &str,
    ) -> Self {
        let harness = Harness::new(
            Arc::clone(&oracle),
            CandidateLoader::new(config.sandbox.clone()),
            AgentSettings::from_config(config),
            HarnessConfig::from_config(&config.evaluation),
        );
        let save_dir = &config.core.save_dir;

        Self {
            meta: MetaAgent::new(oracle, config),
            harness,
            source,
            bootstrap: BootstrapConfig::from_config(&config.scorer),
            search: config.search.clone(),
            archive: ArchiveStore::for_experiment(save_dir, experiment, ArchiveKind::Search),
            evaluation_archive: ArchiveStore::for_experiment(
                save_dir,
                experiment,
                ArchiveKind::Evaluation,
            ),
        }
    }

    pub fn archive_store(&self) -> &ArchiveStore {
        &self.archive
    }

    pub fn evaluation_store(&self) -> &ArchiveStore {
        &self.evaluation_archive
    }

    /// Run the search phase until `n_generation` generations are committed
    pub async fn search(&self) -> Result<SearchReport, EngineError> {
        let questions = load_questions(self.source.as_ref(), Split::Validation).await?;
        let mut archive = self.archive.load_or_seed(initial_archive())?;
        info!(
            path = %self.archive.path().display(),
            entries = archive.len(),
            "Search archive ready"
        );

        let mut report = SearchReport {
            seeds_scored: self.score_seeds(&mut archive, &questions).await?,
            ..Default::default()
        };

        let mut consecutive_abandons = 0;
        loop {
            let generation = next_generation(&archive);
            if generation > self.search.n_generation {
                break;
            }

            info!(generation, "Generation {} started", generation);
            match self.run_generation(&archive, generation, &questions).await? {
                GenerationState::Committed(candidate) => {
                    info!(
                        generation,
                        name = %candidate.name,
                        fitness = candidate.fitness.as_deref().unwrap_or_default(),
                        "Generation committed"
                    );
                    archive.push(candidate);
                    self.archive.save(&archive)?;
                    report.committed += 1;
                    consecutive_abandons = 0;
                }
                GenerationState::Abandoned { reason } => {
                    report.abandoned += 1;
                    consecutive_abandons += 1;
                    warn!(generation, consecutive_abandons, "Generation abandoned: {}", reason);
                    if consecutive_abandons >= self.search.max_consecutive_abandons {
                        return Err(EngineError::SearchStalled {
                            generation,
                            abandons: consecutive_abandons,
                        });
                    }
                }
                other => {
                    return Err(EngineError::Archive(format!(
                        "generation {} stopped in non-terminal state {}",
                        generation, other
                    )))
                }
            }
        }

        report.archive_len = archive.len();
        Ok(report)
    }

    /// Score every seed that has no fitness yet, saving after each
    async fn score_seeds(
        &self,
        archive: &mut [Candidate],
        questions: &[QuestionItem],
    ) -> Result<usize, EngineError> {
        let mut scored = 0;
        for index in 0..archive.len() {
            if archive[index].is_scored() {
                continue;
            }

            let seed = &mut archive[index];
            seed.generation = Some(Generation::Initial);
            info!(name = %seed.name, "Scoring initial archive entry");

            let result = match self
                .harness
                .evaluate_source(&seed.code, questions, EvalMode::Search)
                .await
            {
                Ok(report) => self.score(&report).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(scored_run) => {
                    seed.fitness = Some(scored_run.fitness.to_string());
                    seed.accuracy = Some(scored_run.accuracy);
                    self.archive.save(archive)?;
                    scored += 1;
                }
                Err(e) => {
                    error!(name = %archive[index].name, "Initial archive entry failed: {}", e);
                }
            }
        }
        Ok(scored)
    }

    /// Drive one generation to `Committed` or `Abandoned`
    pub async fn run_generation(
        &self,
        archive: &[Candidate],
        generation: u32,
        questions: &[QuestionItem],
    ) -> Result<GenerationState, EngineError> {
        let mut state = GenerationState::Proposing;

        while !state.is_terminal() {
            debug!(generation, state = %state, "Generation step");
            state = match state {
                GenerationState::Proposing => {
                    match self.meta.propose(archive, last_generated(archive)).await {
                        Ok((proposal, conversation)) => GenerationState::Evaluating {
                            attempt: 1,
                            proposal,
                            conversation,
                        },
                        Err(e) => GenerationState::Abandoned {
                            reason: format!("proposal failed: {}", scrub_secrets(&e.to_string())),
                        },
                    }
                }

                GenerationState::Evaluating {
                    attempt,
                    proposal,
                    conversation,
                } => match self.evaluate_attempt(&proposal, questions).await {
                    Ok(Attempt::Passed(scored)) => {
                        GenerationState::Committed(self.commit(proposal, generation, scored))
                    }
                    Ok(Attempt::BelowFloor(observation)) => {
                        warn!(generation, attempt, "{}", observation);
                        GenerationState::after_failure(
                            attempt,
                            self.search.debug_max,
                            proposal,
                            conversation,
                            scrub_secrets(&observation),
                        )
                    }
                    Err(EngineError::CandidateShape(msg)) => GenerationState::Abandoned {
                        reason: format!("candidate rejected: {}", msg),
                    },
                    Err(e) if is_candidate_fault(&e) => {
                        warn!(generation, attempt, "Evaluation failed: {}", e);
                        GenerationState::after_failure(
                            attempt,
                            self.search.debug_max,
                            proposal,
                            conversation,
                            scrub_secrets(&e.to_string()),
                        )
                    }
                    Err(e) => return Err(e),
                },

                GenerationState::DebugRepair {
                    attempt,
                    proposal,
                    mut conversation,
                    observation,
                } => match self
                    .meta
                    .repair(&mut conversation, &proposal, &observation)
                    .await
                {
                    Ok(repaired) => GenerationState::Evaluating {
                        attempt: attempt + 1,
                        proposal: repaired,
                        conversation,
                    },
                    Err(e) => GenerationState::Abandoned {
                        reason: format!("repair failed: {}", scrub_secrets(&e.to_string())),
                    },
                },

                terminal => terminal,
            };
        }

        Ok(state)
    }

    /// Evaluate a proposal on the search split and apply the accuracy floor
    async fn evaluate_attempt(
        &self,
        proposal: &Candidate,
        questions: &[QuestionItem],
    ) -> Result<Attempt, EngineError> {
        let report = self
            .harness
            .evaluate_source(&proposal.code, questions, EvalMode::Search)
            .await?;

        let mean = report.mean();
        let floor = self.search.accuracy_floor;
        if floor > 0.0 && mean < floor {
            let mut observation = EngineError::AccuracyBelowFloor { mean, floor }.to_string();
            if let Some(failure) = report.first_failure() {
                observation.push_str(&format!(
                    "\nFirst failure (question {}): {}",
                    failure.index, failure.error
                ));
            }
            return Ok(Attempt::BelowFloor(observation));
        }

        Ok(Attempt::Passed(self.score(&report).await?))
    }

    async fn score(&self, report: &EvaluationReport) -> Result<Scored, EngineError> {
        let accuracies = report.accuracies.clone();
        let config = self.bootstrap.clone();
        let fitness = tokio::task::spawn_blocking(move || {
            bootstrap_confidence_interval(&accuracies, &config)
        })
        .await
        .map_err(|e| EngineError::Scoring(format!("bootstrap task failed: {}", e)))??;

        Ok(Scored {
            fitness,
            accuracy: report.mean(),
        })
    }

    fn commit(&self, mut candidate: Candidate, generation: u32, scored: Scored) -> Candidate {
        for key in TRANSIENT_KEYS {
            candidate.extra.remove(*key);
        }
        candidate.author = Some(self.meta.model().to_string());
        candidate.generation = Some(Generation::Number(generation));
        candidate.fitness = Some(scored.fitness.to_string());
        candidate.accuracy = Some(scored.accuracy);
        candidate
    }

    /// Re-score every search entry on the test split
    ///
    /// Entry `i` of the evaluation archive belongs to entry `i` of the search
    /// archive. Entries that already carry `test_fitness` are skipped, so an
    /// interrupted pass picks up where it stopped. An entry whose evaluation
    /// fails is still written, without test fields, and retried next time.
    pub async fn evaluate(&self) -> Result<EvaluationPassReport, EngineError> {
        let archive = self.archive.load()?.ok_or_else(|| {
            EngineError::Archive(format!(
                "No search archive at {}; run the search phase first",
                self.archive.path().display()
            ))
        })?;
        let questions = load_questions(self.source.as_ref(), Split::Test).await?;
        let mut evaluated_archive = self.evaluation_archive.load()?.unwrap_or_default();

        let mut report = EvaluationPassReport::default();
        for (index, entry) in archive.iter().enumerate() {
            if evaluated_archive
                .get(index)
                .is_some_and(|done| done.test_fitness.is_some())
            {
                report.skipped += 1;
                continue;
            }

            info!(
                index,
                generation = %entry.generation.map(|g| g.to_string()).unwrap_or_default(),
                name = %entry.name,
                "Evaluating archive entry"
            );

            let mut evaluated = entry.clone();
            let result = match self
                .harness
                .evaluate_source(&entry.code, &questions, EvalMode::Evaluation)
                .await
            {
                Ok(run) => self.score(&run).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(scored) => {
                    evaluated.test_fitness = Some(scored.fitness.to_string());
                    evaluated.test_accuracy = Some(scored.accuracy);
                    report.evaluated += 1;
                }
                Err(e) => {
                    error!(index, name = %entry.name, "Evaluation failed: {}", e);
                    report.failed += 1;
                }
            }

            match evaluated_archive.get_mut(index) {
                Some(slot) => *slot = evaluated,
                None => evaluated_archive.push(evaluated),
            }
            self.evaluation_archive.save(&evaluated_archive)?;
        }

        Ok(report)
    }
}

async fn load_questions(
    source: &dyn QuestionSource,
    split: Split,
) -> Result<Vec<QuestionItem>, EngineError> {
    let questions = source.load(split).await?;
    if questions.is_empty() {
        return Err(EngineError::Dataset(format!("{:?} split is empty", split)));
    }
    Ok(questions)
}

/// Failures the meta-agent can be asked to fix
fn is_candidate_fault(error: &EngineError) -> bool {
    matches!(
        error,
        EngineError::CandidateCompile(_)
            | EngineError::ContextTooLong
            | EngineError::ProgramExecution(_)
            | EngineError::SandboxLimit(_)
            | EngineError::Oracle(_)
            | EngineError::OracleRateLimited
    )
}
