//! Run checkpoints. A checkpoint is everything needed to continue a run after
//! an abort or a restart: the document, each section's ledger and state
//! machine position, and the run inputs.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::errors::RefineError;
use crate::models::job::JobRequirement;
use crate::models::profile::UserProfile;
use crate::models::resume::{ResumeDocument, Section, SectionKind};
use crate::models::template::Template;
use crate::refinement::ledger::ProblemLedger;
use crate::refinement::workflow::{DiscoverySeed, SectionOutcome, WorkflowState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionCheckpoint {
    pub section: Section,
    pub ledger: ProblemLedger,
    pub state: WorkflowState,
    pub iterations: u32,
    pub overlay_reopened: bool,
    /// Set once the workflow stopped, cleanly or not.
    pub outcome: Option<SectionOutcome>,
    /// Draft material not yet discovered (aborted before Discovering ran).
    #[serde(default)]
    pub seed: Option<DiscoverySeed>,
}

impl SectionCheckpoint {
    pub fn kind(&self) -> &SectionKind {
        &self.section.kind
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunCheckpoint {
    pub run_id: Uuid,
    pub template: Template,
    pub job_requirements: Vec<JobRequirement>,
    pub profile: Option<UserProfile>,
    pub document: ResumeDocument,
    /// Latest checkpoint of every section, in template order.
    pub sections: Vec<SectionCheckpoint>,
}

impl RunCheckpoint {
    pub fn section(&self, kind: &SectionKind) -> Option<&SectionCheckpoint> {
        self.sections.iter().find(|s| s.kind() == kind)
    }

    /// Replaces the stored checkpoint for that section (or adds it).
    pub fn upsert(&mut self, checkpoint: SectionCheckpoint) {
        match self.sections.iter_mut().find(|s| s.kind() == checkpoint.kind()) {
            Some(slot) => *slot = checkpoint,
            None => self.sections.push(checkpoint),
        }
    }
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, checkpoint: &RunCheckpoint) -> Result<(), RefineError>;
    async fn load(&self, run_id: Uuid) -> Result<Option<RunCheckpoint>, RefineError>;
}

/// One JSON file per run under `dir`, replaced atomically on every save.
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, run_id: Uuid) -> PathBuf {
        self.dir.join(format!("{run_id}.json"))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, checkpoint: &RunCheckpoint) -> Result<(), RefineError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error("create checkpoint dir", &self.dir, e))?;

        let json = serde_json::to_vec_pretty(checkpoint)
            .map_err(|e| RefineError::Checkpoint(format!("serialize: {e}")))?;

        let path = self.path_for(checkpoint.run_id);
        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, json)
            .await
            .map_err(|e| io_error("write", &temp_path, e))?;
        tokio::fs::rename(&temp_path, &path)
            .await
            .map_err(|e| io_error("rename", &path, e))?;

        debug!(run_id = %checkpoint.run_id, version = checkpoint.document.version, "checkpoint saved");
        Ok(())
    }

    async fn load(&self, run_id: Uuid) -> Result<Option<RunCheckpoint>, RefineError> {
        let path = self.path_for(run_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error("read", &path, e)),
        };
        let checkpoint = serde_json::from_slice(&bytes)
            .map_err(|e| RefineError::Checkpoint(format!("corrupt checkpoint {}: {e}", path.display())))?;
        Ok(Some(checkpoint))
    }
}

fn io_error(action: &str, path: &Path, e: std::io::Error) -> RefineError {
    RefineError::Checkpoint(format!("{action} {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::problem::{Problem, ProblemCategory, Severity};

    fn checkpoint() -> RunCheckpoint {
        let section = Section::new(SectionKind::Experience, "- Led the team");
        let mut ledger = ProblemLedger::new(SectionKind::Experience);
        ledger.record(Problem::new(
            SectionKind::Experience,
            "No quantifiable metric",
            Severity::High,
            ProblemCategory::Missing,
        ));
        RunCheckpoint {
            run_id: Uuid::new_v4(),
            template: Template::default(),
            job_requirements: vec![JobRequirement::required("Rust", 1.0)],
            profile: None,
            document: ResumeDocument::new("default", vec![section.clone()]),
            sections: vec![SectionCheckpoint {
                section,
                ledger,
                state: WorkflowState::Resolving,
                iterations: 3,
                overlay_reopened: false,
                outcome: None,
                seed: None,
            }],
        }
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("runs"));
        let saved = checkpoint();

        store.save(&saved).await.unwrap();
        let loaded = store.load(saved.run_id).await.unwrap();

        assert_eq!(loaded, Some(saved));
    }

    #[tokio::test]
    async fn test_save_overwrites_previous() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        let mut saved = checkpoint();
        store.save(&saved).await.unwrap();

        saved.document = saved.document.with_section(Section::new(SectionKind::Skills, "Rust"));
        store.save(&saved).await.unwrap();

        let loaded = store.load(saved.run_id).await.unwrap().unwrap();
        assert_eq!(loaded.document.version, 1);
        assert!(!dir.path().join(format!("{}.json.tmp", saved.run_id)).exists());
    }

    #[tokio::test]
    async fn test_missing_checkpoint_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        assert!(store.load(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_checkpoint_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        let run_id = Uuid::new_v4();
        std::fs::write(dir.path().join(format!("{run_id}.json")), b"{not json").unwrap();

        let err = store.load(run_id).await.unwrap_err();
        assert!(matches!(err, RefineError::Checkpoint(_)));
    }

    #[test]
    fn test_upsert_replaces_by_section() {
        let mut run = checkpoint();
        let mut next = run.sections[0].clone();
        next.iterations = 7;
        run.upsert(next);
        assert_eq!(run.sections.len(), 1);
        assert_eq!(run.section(&SectionKind::Experience).unwrap().iterations, 7);
    }
}
