//! Evaluation Harness
//!
//! Runs a bound candidate over a question set on a bounded pool of tokio
//! tasks and turns each answer into a 0/1 accuracy.
//!
//! # Ordering
//!
//! Workers finish in any order. Every result is slotted back by question
//! index, so `accuracies[i]` always belongs to `questions[i]` no matter how
//! many workers ran or how they were scheduled.
//!
//! # Failure policy
//!
//! - A question whose program errors or panics scores 0 and is recorded as a
//!   [`QuestionFailure`]; the batch continues.
//! - An answer that cannot be extracted scores 0 and is logged.
//! - [`EngineError::ContextTooLong`] during a search evaluation aborts the
//!   whole batch, because the candidate design itself is at fault.

use futures::FutureExt;
use sdk::errors::EngineError;
use sdk::types::{AgentOutput, Message, QuestionItem};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::agent::{AgentRuntime, AgentSettings, EvalMode};
use crate::config::EvaluationConfig;
use crate::llm::Oracle;
use crate::runtime::{BoundCandidate, CandidateLoader};

/// Worker pool settings
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub max_workers: usize,
    pub parallel: bool,
}

impl HarnessConfig {
    pub fn from_config(config: &EvaluationConfig) -> Self {
        Self {
            max_workers: config.max_workers,
            parallel: config.parallel,
        }
    }

    /// `min(question count, max_workers)`, or 1 when parallelism is off
    pub fn worker_count(&self, questions: usize) -> usize {
        if !self.parallel {
            return 1;
        }
        questions.min(self.max_workers).max(1)
    }
}

/// One question that failed to produce an answer
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionFailure {
    pub index: usize,
    pub error: String,
}

/// Per-question accuracies plus what went wrong along the way
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationReport {
    /// 1.0 for a correct answer, 0.0 otherwise, in question order
    pub accuracies: Vec<f64>,
    pub failures: Vec<QuestionFailure>,
    /// Questions whose output held no recognisable answer
    pub unmatched: usize,
}

impl EvaluationReport {
    pub fn mean(&self) -> f64 {
        if self.accuracies.is_empty() {
            return 0.0;
        }
        self.accuracies.iter().sum::<f64>() / self.accuracies.len() as f64
    }

    pub fn first_failure(&self) -> Option<&QuestionFailure> {
        self.failures.first()
    }
}

/// Whether `s` is a single uppercase letter A-Z
fn is_choice_letter(s: &str) -> bool {
    let mut chars = s.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if c.is_ascii_uppercase())
}

/// Pull the predicted answer out of an entry point's return value
///
/// - `Text` must be a single letter
/// - `Messages` yields the content of the second element (the answer field of
///   a `[thinking, answer]` agent output)
/// - `Message` must carry a single letter
pub fn extract_answer(output: &AgentOutput) -> Option<String> {
    match output {
        AgentOutput::Text(text) if is_choice_letter(text.trim()) => Some(text.trim().to_string()),
        AgentOutput::Messages(messages) => messages.get(1).map(|m| m.content.trim().to_string()),
        AgentOutput::Message(message) if is_choice_letter(message.content.trim()) => {
            Some(message.content.trim().to_string())
        }
        _ => None,
    }
}

/// Evaluate a bound candidate over `questions`
pub async fn evaluate(
    candidate: &BoundCandidate,
    questions: &[QuestionItem],
    config: &HarnessConfig,
) -> Result<EvaluationReport, EngineError> {
    if questions.is_empty() {
        return Err(EngineError::Dataset("No questions to evaluate".to_string()));
    }

    let workers = config.worker_count(questions.len());
    let started = Instant::now();
    info!(
        entry_point = candidate.entry_point(),
        mode = %candidate.mode(),
        questions = questions.len(),
        workers,
        "Evaluating candidate"
    );

    let semaphore = Arc::new(Semaphore::new(workers));
    let mut set = JoinSet::new();

    for (index, item) in questions.iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let candidate = candidate.clone();
        let task = Message::task(item.prompt_text.clone());

        set.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    return (
                        index,
                        Err(EngineError::ProgramExecution(format!("worker pool closed: {}", e))),
                    )
                }
            };

            let outcome = match AssertUnwindSafe(candidate.forward(task)).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(EngineError::ProgramExecution(format!(
                    "candidate panicked: {}",
                    panic_message(panic.as_ref())
                ))),
            };
            (index, outcome)
        });
    }

    let mut outputs: Vec<Option<Result<AgentOutput, EngineError>>> =
        (0..questions.len()).map(|_| None).collect();

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, Err(EngineError::ContextTooLong))) if candidate.mode() == EvalMode::Search => {
                warn!(question = index, "Context overflow, aborting evaluation");
                set.abort_all();
                return Err(EngineError::ContextTooLong);
            }
            Ok((index, outcome)) => {
                if let Some(slot) = outputs.get_mut(index) {
                    *slot = Some(outcome);
                }
            }
            Err(e) => warn!("Evaluation worker did not complete: {}", e),
        }
    }

    let mut report = EvaluationReport::default();
    for (index, (item, output)) in questions.iter().zip(outputs).enumerate() {
        let score = match output {
            Some(Ok(output)) => match extract_answer(&output) {
                Some(answer) => {
                    if answer == item.correct_letter {
                        1.0
                    } else {
                        0.0
                    }
                }
                None => {
                    warn!(question = index, "Error in question {}, no matching answer", index);
                    report.unmatched += 1;
                    0.0
                }
            },
            Some(Err(e)) => {
                warn!(question = index, "Error in question {}: {}", index, e);
                report.failures.push(QuestionFailure {
                    index,
                    error: e.to_string(),
                });
                0.0
            }
            None => {
                report.failures.push(QuestionFailure {
                    index,
                    error: "worker did not report a result".to_string(),
                });
                0.0
            }
        };
        report.accuracies.push(score);
    }

    debug!(
        mean = report.mean(),
        failures = report.failures.len(),
        unmatched = report.unmatched,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Evaluation finished"
    );

    Ok(report)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Compiles archive source and evaluates it on a fresh runtime
pub struct Harness {
    oracle: Arc<dyn Oracle>,
    loader: CandidateLoader,
    agent_settings: AgentSettings,
    config: HarnessConfig,
}

impl Harness {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        loader: CandidateLoader,
        agent_settings: AgentSettings,
        config: HarnessConfig,
    ) -> Self {
        Self {
            oracle,
            loader,
            agent_settings,
            config,
        }
    }

    /// Compile `source`, bind it to a runtime for `mode`, and evaluate it
    pub async fn evaluate_source(
        &self,
        source: &str,
        questions: &[QuestionItem],
        mode: EvalMode,
    ) -> Result<EvaluationReport, EngineError> {
        let program = self.loader.compile(source)?;
        let runtime = AgentRuntime::new(Arc::clone(&self.oracle), self.agent_settings.clone(), mode);
        let bound = BoundCandidate::new(Arc::new(program), runtime);
        evaluate(&bound, questions, &self.config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::types::{Author, NO_ITERATION};

    #[test]
    fn test_worker_count() {
        let config = HarnessConfig {
            max_workers: 48,
            parallel: true,
        };
        assert_eq!(config.worker_count(10), 10);
        assert_eq!(config.worker_count(100), 48);
        assert_eq!(config.worker_count(0), 1);

        let serial = HarnessConfig {
            max_workers: 48,
            parallel: false,
        };
        assert_eq!(serial.worker_count(100), 1);
    }

    #[test]
    fn test_extract_answer_shapes() {
        let msg = |field: &str, content: &str| {
            Message::new(field, Author::agent("A", "abcd"), content, NO_ITERATION)
        };

        assert_eq!(extract_answer(&AgentOutput::Text("B".into())), Some("B".into()));
        assert_eq!(extract_answer(&AgentOutput::Text("Bee".into())), None);
        assert_eq!(
            extract_answer(&AgentOutput::Messages(vec![msg("thinking", "..."), msg("answer", "C")])),
            Some("C".into())
        );
        assert_eq!(
            extract_answer(&AgentOutput::Messages(vec![msg("answer", "C")])),
            None
        );
        assert_eq!(
            extract_answer(&AgentOutput::Message(msg("answer", "D"))),
            Some("D".into())
        );
        assert_eq!(
            extract_answer(&AgentOutput::Message(msg("answer", "the answer is D"))),
            None
        );
    }

    #[test]
    fn test_report_mean() {
        let report = EvaluationReport {
            accuracies: vec![1.0, 0.0, 0.0, 0.0],
            ..Default::default()
        };
        assert!((report.mean() - 0.25).abs() < 1e-12);
        assert_eq!(EvaluationReport::default().mean(), 0.0);
    }
}
