//! CLI interface for Darwin
//!
//! This module provides the command-line interface using clap's derive API.
//! Experiment flags override the matching values from the configuration file.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;

/// Darwin agent-search engine
///
/// Evolves multiple-choice answering agents: an oracle proposes programs,
/// every candidate is scored on held-out questions, and the scored archive
/// grows one generation at a time.
#[derive(Parser, Debug)]
#[command(name = "darwin")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evolve new agents on the validation split
    Search {
        #[command(flatten)]
        experiment: ExperimentArgs,
    },

    /// Score every archived agent on the test split
    Evaluate {
        #[command(flatten)]
        experiment: ExperimentArgs,
    },

    /// Search, then evaluate
    Run {
        #[command(flatten)]
        experiment: ExperimentArgs,
    },

    /// Show the archive of an experiment
    Summary {
        #[command(flatten)]
        experiment: ExperimentArgs,
    },
}

impl Command {
    pub fn experiment(&self) -> &ExperimentArgs {
        match self {
            Command::Search { experiment }
            | Command::Evaluate { experiment }
            | Command::Run { experiment }
            | Command::Summary { experiment } => experiment,
        }
    }
}

/// Per-experiment overrides
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct ExperimentArgs {
    /// Dataset name (subdirectory of the data directory)
    #[arg(long, value_name = "NAME")]
    pub dataset: Option<String>,

    /// Directory holding dataset folders
    #[arg(long, value_name = "PATH")]
    pub data_dir: Option<PathBuf>,

    /// Questions sampled for search
    #[arg(long)]
    pub valid_size: Option<usize>,

    /// Questions sampled for the final evaluation
    #[arg(long)]
    pub test_size: Option<usize>,

    #[arg(long)]
    pub shuffle_seed: Option<u64>,

    /// Times each sampled question is repeated
    #[arg(long)]
    pub n_repeat: Option<usize>,

    /// Concurrent evaluation workers
    #[arg(long)]
    pub max_workers: Option<usize>,

    /// Evaluate questions one at a time
    #[arg(long)]
    pub no_parallel: bool,

    /// Directory for archive files
    #[arg(long, value_name = "PATH")]
    pub save_dir: Option<PathBuf>,

    /// Experiment name (default: <dataset>_<agent model>_results)
    #[arg(long, value_name = "NAME")]
    pub expr_name: Option<String>,

    /// Generations to commit
    #[arg(long)]
    pub n_generation: Option<u32>,

    /// Evaluation attempts per generation
    #[arg(long)]
    pub debug_max: Option<u32>,

    /// Meta-agent model
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Model used by agents inside candidates
    #[arg(long, value_name = "MODEL")]
    pub agent_model: Option<String>,
}

impl ExperimentArgs {
    /// Write every given flag into `config`
    pub fn apply(&self, config: &mut Config) {
        if let Some(dataset) = &self.dataset {
            config.dataset.name = dataset.clone();
        }
        if let Some(dir) = &self.data_dir {
            config.dataset.data_dir = dir.clone();
        }
        if let Some(size) = self.valid_size {
            config.dataset.valid_size = size;
        }
        if let Some(size) = self.test_size {
            config.dataset.test_size = size;
        }
        if let Some(seed) = self.shuffle_seed {
            config.dataset.shuffle_seed = seed;
        }
        if let Some(n) = self.n_repeat {
            config.dataset.n_repeat = n;
        }
        if let Some(workers) = self.max_workers {
            config.evaluation.max_workers = workers;
        }
        if self.no_parallel {
            config.evaluation.parallel = false;
        }
        if let Some(dir) = &self.save_dir {
            config.core.save_dir = dir.clone();
        }
        if let Some(n) = self.n_generation {
            config.search.n_generation = n;
        }
        if let Some(n) = self.debug_max {
            config.search.debug_max = n;
        }
        if let Some(model) = &self.model {
            config.models.meta_agent = model.clone();
        }
        if let Some(model) = &self.agent_model {
            config.models.agent = model.clone();
        }
    }

    /// Explicit name, or `<dataset>_<agent model>_results`
    pub fn experiment_name(&self, config: &Config) -> String {
        self.expr_name.clone().unwrap_or_else(|| {
            format!("{}_{}_results", config.dataset.name, config.models.agent)
        })
    }
}
