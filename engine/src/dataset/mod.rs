//! Question sources
//!
//! The engine only consumes rendered prompts and correct letters
//! ([`QuestionItem`]). Where they come from is behind [`QuestionSource`].
//!
//! [`JsonlQuestionSource`] reads `<data_dir>/<dataset>/<split>.jsonl`, one
//! record per line:
//!
//! ```json
//! {"question": "...", "options": {"A": "...", "B": "..."}, "answer": "...", "answer_idx": "B"}
//! ```

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use sdk::errors::EngineError;
use sdk::types::QuestionItem;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::DatasetConfig;

/// Which question set a phase runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    /// Held-out set used to score candidates during search
    Validation,
    /// Final evaluation set
    Test,
}

/// Provider of question sets
#[async_trait]
pub trait QuestionSource: Send + Sync {
    async fn load(&self, split: Split) -> Result<Vec<QuestionItem>, EngineError>;
}

/// Fixed question sets, mainly for tests and embedding
#[derive(Debug, Clone, Default)]
pub struct InMemoryQuestionSource {
    validation: Vec<QuestionItem>,
    test: Vec<QuestionItem>,
}

impl InMemoryQuestionSource {
    pub fn new(validation: Vec<QuestionItem>, test: Vec<QuestionItem>) -> Self {
        Self { validation, test }
    }
}

#[async_trait]
impl QuestionSource for InMemoryQuestionSource {
    async fn load(&self, split: Split) -> Result<Vec<QuestionItem>, EngineError> {
        Ok(match split {
            Split::Validation => self.validation.clone(),
            Split::Test => self.test.clone(),
        })
    }
}

/// One multiple-choice record as stored on disk
#[derive(Debug, Clone, Deserialize)]
pub struct QuestionRecord {
    pub question: String,
    pub options: BTreeMap<String, String>,
    /// Text of the correct option
    pub answer: String,
    /// Letter of the correct option
    pub answer_idx: String,
}

impl QuestionRecord {
    /// Check the answer text against the option it points at
    pub fn validate(&self) -> Result<(), EngineError> {
        match self.options.get(&self.answer_idx) {
            Some(option) if *option == self.answer => Ok(()),
            Some(option) => Err(EngineError::Dataset(format!(
                "Answer {}: {} does not match the option {}.",
                self.answer_idx, self.answer, option
            ))),
            None => Err(EngineError::Dataset(format!(
                "Answer {} is not among the options",
                self.answer_idx
            ))),
        }
    }

    /// Multiple-choice prompt shown to the candidate
    pub fn render(&self) -> String {
        let options = self
            .options
            .iter()
            .map(|(letter, text)| format!("({}) {}", letter, text))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "Answer the following multiple choice question.\n\n{}\n\n{}",
            self.question, options
        )
    }

    pub fn into_item(self) -> Result<QuestionItem, EngineError> {
        self.validate()?;
        Ok(QuestionItem::new(self.render(), self.answer_idx))
    }
}

/// JSONL files under `<data_dir>/<dataset>/`
#[derive(Debug, Clone)]
pub struct JsonlQuestionSource {
    config: DatasetConfig,
}

impl JsonlQuestionSource {
    pub fn new(config: DatasetConfig) -> Self {
        Self { config }
    }

    fn split_path(&self, split: Split) -> PathBuf {
        let name = match split {
            Split::Validation => &self.config.search_split,
            Split::Test => &self.config.evaluation_split,
        };
        self.config
            .data_dir
            .join(&self.config.name)
            .join(format!("{}.jsonl", name))
    }

    fn sample_size(&self, split: Split) -> usize {
        match split {
            Split::Validation => self.config.valid_size,
            Split::Test => self.config.test_size,
        }
    }
}

#[async_trait]
impl QuestionSource for JsonlQuestionSource {
    async fn load(&self, split: Split) -> Result<Vec<QuestionItem>, EngineError> {
        let path = self.split_path(split);
        let contents = tokio::fs::read_to_string(&path).await.map_err(|e| {
            EngineError::Dataset(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let mut records = contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(number, line)| {
                serde_json::from_str::<QuestionRecord>(line).map_err(|e| {
                    EngineError::Dataset(format!(
                        "{}:{}: invalid record: {}",
                        path.display(),
                        number + 1,
                        e
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let available = records.len();

        let mut rng = StdRng::seed_from_u64(self.config.shuffle_seed);
        records.shuffle(&mut rng);

        let wanted = self.sample_size(split);
        if wanted > available {
            warn!(
                split = ?split,
                wanted,
                available,
                "Split has fewer records than requested; using all of them"
            );
        }
        records.truncate(wanted);

        let selected = records
            .into_iter()
            .map(QuestionRecord::into_item)
            .collect::<Result<Vec<_>, _>>()?;

        let mut items = Vec::with_capacity(selected.len() * self.config.n_repeat);
        for _ in 0..self.config.n_repeat {
            items.extend(selected.iter().cloned());
        }

        info!(
            path = %path.display(),
            available,
            selected = selected.len(),
            repeat = self.config.n_repeat,
            total = items.len(),
            "Questions loaded"
        );
        Ok(items)
    }
}
