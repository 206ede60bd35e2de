//! Persisted exam outcomes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::{SessionStatus, TerminationReason};
use crate::violations::ViolationEvent;

/// A terminal session as handed to the result store, before an id is assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultDraft {
    pub student_id: String,
    pub exam_id: String,
    pub status: SessionStatus,
    pub reason: TerminationReason,
    pub score: u32,
    pub total_questions: u32,
    pub answers: BTreeMap<String, String>,
    pub violations: Vec<ViolationEvent>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamResult {
    pub id: String,
    pub student_id: String,
    pub exam_id: String,
    pub status: SessionStatus,
    pub reason: TerminationReason,
    pub score: u32,
    pub total_questions: u32,
    pub answers: BTreeMap<String, String>,
    pub violations: Vec<ViolationEvent>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ExamResult {
    pub fn from_draft(id: String, draft: ResultDraft, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            student_id: draft.student_id,
            exam_id: draft.exam_id,
            status: draft.status,
            reason: draft.reason,
            score: draft.score,
            total_questions: draft.total_questions,
            answers: draft.answers,
            violations: draft.violations,
            started_at: draft.started_at,
            ended_at: draft.ended_at,
            created_at,
        }
    }
}
