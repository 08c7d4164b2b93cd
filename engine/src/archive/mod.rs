//! Archive Store
//!
//! Durable, append-only storage of scored candidates for one experiment.
//!
//! # Files
//!
//! - `<save_dir>/<experiment>_run_archive.json`: the search archive
//! - `<save_dir>/<experiment>_run_archive_evaluate.json`: the final
//!   evaluation pass, one entry per search entry that was evaluated
//!
//! Both are pretty-printed JSON arrays of candidate objects.
//!
//! # Crash consistency
//!
//! Every save serializes the whole archive to `<file>.tmp` and renames it over
//! the target, so a crash leaves either the previous or the new archive on
//! disk. A save that would leave fewer entries than the file already holds is
//! refused with [`EngineError::ArchiveShrink`].
//!
//! Only one writer per experiment is supported.

use sdk::errors::EngineError;
use sdk::types::{Candidate, Generation};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Which of the two experiment files to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Search,
    Evaluation,
}

/// JSON file holding an ordered candidate list
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    path: PathBuf,
}

impl ArchiveStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store for an experiment's search or evaluation archive
    pub fn for_experiment(save_dir: &Path, experiment: &str, kind: ArchiveKind) -> Self {
        let file_name = match kind {
            ArchiveKind::Search => format!("{}_run_archive.json", experiment),
            ArchiveKind::Evaluation => format!("{}_run_archive_evaluate.json", experiment),
        };
        Self::new(save_dir.join(file_name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the archive; `None` when the file does not exist yet
    pub fn load(&self) -> Result<Option<Vec<Candidate>>, EngineError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path).map_err(|e| {
            EngineError::Archive(format!("Failed to read {}: {}", self.path.display(), e))
        })?;
        let archive: Vec<Candidate> = serde_json::from_str(&contents).map_err(|e| {
            EngineError::Archive(format!("Failed to parse {}: {}", self.path.display(), e))
        })?;

        debug!(path = %self.path.display(), entries = archive.len(), "Archive loaded");
        Ok(Some(archive))
    }

    /// Read the archive, or start from `seeds` when there is none
    pub fn load_or_seed(&self, seeds: Vec<Candidate>) -> Result<Vec<Candidate>, EngineError> {
        Ok(self.load()?.unwrap_or(seeds))
    }

    /// Atomically replace the archive on disk
    pub fn save(&self, archive: &[Candidate]) -> Result<(), EngineError> {
        if let Some(persisted) = self.load()? {
            if archive.len() < persisted.len() {
                return Err(EngineError::ArchiveShrink {
                    persisted: persisted.len(),
                    attempted: archive.len(),
                });
            }
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(archive)
            .map_err(|e| EngineError::Archive(format!("Failed to serialize archive: {}", e)))?;

        let tmp = self.tmp_path();
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;

        debug!(path = %self.path.display(), entries = archive.len(), "Archive saved");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Next generation number to commit, from the last archive entry
///
/// `g + 1` when the last entry has integer generation `g`, otherwise 1.
pub fn next_generation(archive: &[Candidate]) -> u32 {
    match archive.last().and_then(|c| c.generation) {
        Some(Generation::Number(g)) => g.saturating_add(1),
        _ => 1,
    }
}

/// Most recent generated (non-seed) entry
pub fn last_generated(archive: &[Candidate]) -> Option<&Candidate> {
    archive
        .iter()
        .rev()
        .find(|c| matches!(c.generation, Some(Generation::Number(_))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(name: &str, generation: Option<Generation>) -> Candidate {
        let mut c = Candidate::new(name, "t", "[x]\nsteps = []");
        c.generation = generation;
        c
    }

    #[test]
    fn test_file_names() {
        let dir = Path::new("outputs");
        assert_eq!(
            ArchiveStore::for_experiment(dir, "MedQA_gpt_results", ArchiveKind::Search).path(),
            Path::new("outputs/MedQA_gpt_results_run_archive.json")
        );
        assert_eq!(
            ArchiveStore::for_experiment(dir, "MedQA_gpt_results", ArchiveKind::Evaluation).path(),
            Path::new("outputs/MedQA_gpt_results_run_archive_evaluate.json")
        );
    }

    #[test]
    fn test_missing_file_loads_none() {
        let dir = TempDir::new().unwrap();
        let store = ArchiveStore::new(dir.path().join("a.json"));
        assert!(store.load().unwrap().is_none());
        assert_eq!(
            store.load_or_seed(vec![entry("seed", None)]).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = ArchiveStore::new(dir.path().join("nested").join("a.json"));
        let archive = vec![entry("a", Some(Generation::Initial)), entry("b", Some(Generation::Number(1)))];

        store.save(&archive).unwrap();
        assert_eq!(store.load().unwrap().unwrap(), archive);
        assert!(!store.tmp_path().exists());
    }

    #[test]
    fn test_next_generation() {
        assert_eq!(next_generation(&[]), 1);
        assert_eq!(next_generation(&[entry("a", Some(Generation::Initial))]), 1);
        assert_eq!(
            next_generation(&[
                entry("a", Some(Generation::Initial)),
                entry("b", Some(Generation::Number(4)))
            ]),
            5
        );
    }

    #[test]
    fn test_next_generation_saturates() {
        let archive = [entry("edited", Some(Generation::Number(u32::MAX)))];
        assert_eq!(next_generation(&archive), u32::MAX);
    }

    #[test]
    fn test_last_generated_skips_seeds() {
        let archive = vec![
            entry("a", Some(Generation::Initial)),
            entry("b", Some(Generation::Number(1))),
            entry("c", Some(Generation::Initial)),
        ];
        assert_eq!(last_generated(&archive).unwrap().name, "b");
        assert!(last_generated(&archive[..1]).is_none());
    }
}
