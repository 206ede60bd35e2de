//! Collaborator interfaces the session engine talks to.
//!
//! The engine only needs `ResultStore::has_taken` and `ResultStore::save`;
//! the other operations exist for the CLI. `Database` implements all three.

use anyhow::Result;
use async_trait::async_trait;

use crate::db::models::{Exam, ExamDraft, ExamResult, Identity, ResultDraft, Role};

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_credentials(&self, username: &str, password: &str)
        -> Result<Option<Identity>>;

    async fn create(&self, username: &str, password: &str, role: Role) -> Result<Identity>;
}

#[async_trait]
pub trait ExamCatalog: Send + Sync {
    async fn get_by_id(&self, exam_id: &str) -> Result<Option<Exam>>;

    async fn list_all(&self) -> Result<Vec<Exam>>;

    async fn list_by_owner(&self, teacher_id: &str) -> Result<Vec<Exam>>;

    /// Stores the draft as-is; callers run `ExamDraft::validate` first.
    async fn create(&self, draft: ExamDraft) -> Result<Exam>;
}

#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn has_taken(&self, student_id: &str, exam_id: &str) -> Result<bool>;

    async fn save(&self, draft: ResultDraft) -> Result<ExamResult>;

    async fn list_by_student(&self, student_id: &str) -> Result<Vec<ExamResult>>;

    async fn list_by_exam(&self, exam_id: &str) -> Result<Vec<ExamResult>>;

    async fn list_all(&self) -> Result<Vec<ExamResult>>;
}
