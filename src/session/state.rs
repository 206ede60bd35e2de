use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::models::{Exam, Question, ResultDraft};
use crate::error::{SessionError, StartError};
use crate::violations::{ViolationEvent, ViolationKind};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::NotStarted => "NotStarted",
            SessionStatus::InProgress => "InProgress",
            SessionStatus::Completed => "Completed",
            SessionStatus::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            SessionStatus::NotStarted => 0,
            SessionStatus::InProgress => 1,
            SessionStatus::Completed | SessionStatus::Failed => 2,
        }
    }

    /// Whether `next` is reachable from `self` without going backwards.
    pub fn can_become(&self, next: SessionStatus) -> bool {
        *self == next || (!self.is_terminal() && next.rank() > self.rank())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum TerminationReason {
    Submitted,
    TimeExpired,
    Violation { kind: ViolationKind },
    Stopped,
}

impl TerminationReason {
    pub fn terminal_status(&self) -> SessionStatus {
        match self {
            TerminationReason::Violation { .. } => SessionStatus::Failed,
            _ => SessionStatus::Completed,
        }
    }
}

/// Runtime state of one exam attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamSession {
    pub exam: Exam,
    pub answers: BTreeMap<String, String>,
    pub remaining_seconds: u64,
    pub status: SessionStatus,
    pub current_index: usize,
    pub violation_log: Vec<ViolationEvent>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub reason: Option<TerminationReason>,
    /// Set once terminal.
    pub score: Option<u32>,
}

impl ExamSession {
    pub fn new(exam: Exam) -> Self {
        Self {
            remaining_seconds: exam.time_limit_secs(),
            exam,
            answers: BTreeMap::new(),
            status: SessionStatus::NotStarted,
            current_index: 0,
            violation_log: Vec::new(),
            started_at: None,
            ended_at: None,
            reason: None,
            score: None,
        }
    }

    pub fn begin(&mut self, now: DateTime<Utc>) -> Result<(), StartError> {
        if self.status != SessionStatus::NotStarted {
            return Err(StartError::AlreadyStarted);
        }
        self.status = SessionStatus::InProgress;
        self.remaining_seconds = self.exam.time_limit_secs();
        self.started_at = Some(now);
        Ok(())
    }

    /// One second of countdown. Returns the seconds left, or `None` when not running.
    pub fn tick(&mut self) -> Option<u64> {
        if self.status != SessionStatus::InProgress {
            return None;
        }
        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        Some(self.remaining_seconds)
    }

    /// Records an answer, last write wins. `Ok(false)` when the session is
    /// not running; unknown ids are rejected either way.
    pub fn set_answer(&mut self, question_id: &str, option_id: &str) -> Result<bool, SessionError> {
        let question = self
            .exam
            .question(question_id)
            .ok_or_else(|| SessionError::UnknownQuestion(question_id.to_string()))?;
        if !question.has_option(option_id) {
            return Err(SessionError::UnknownOption {
                question_id: question_id.to_string(),
                option_id: option_id.to_string(),
            });
        }
        if self.status != SessionStatus::InProgress {
            return Ok(false);
        }
        self.answers
            .insert(question_id.to_string(), option_id.to_string());
        Ok(true)
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.exam.questions.get(self.current_index)
    }

    pub fn next(&mut self) -> usize {
        let last = self.exam.questions.len().saturating_sub(1);
        self.current_index = (self.current_index + 1).min(last);
        self.current_index
    }

    pub fn previous(&mut self) -> usize {
        self.current_index = self.current_index.saturating_sub(1);
        self.current_index
    }

    pub fn is_on_final_question(&self) -> bool {
        self.current_index + 1 >= self.exam.questions.len()
    }

    pub fn ensure_can_submit(&self) -> Result<(), SessionError> {
        if self.status != SessionStatus::InProgress {
            return Err(SessionError::NotInProgress);
        }
        if !self.is_on_final_question() {
            return Err(SessionError::NotOnFinalQuestion);
        }
        Ok(())
    }

    pub fn correct_answers(&self) -> u32 {
        self.exam
            .questions
            .iter()
            .filter(|question| self.answers.get(&question.id) == Some(&question.correct_option_id))
            .count() as u32
    }

    pub fn total_questions(&self) -> u32 {
        self.exam.questions.len() as u32
    }

    /// The single terminal transition. Returns false if the session was not
    /// running, in which case nothing changes.
    pub fn terminate(
        &mut self,
        reason: TerminationReason,
        now: DateTime<Utc>,
        violation_log: Vec<ViolationEvent>,
    ) -> bool {
        if self.status != SessionStatus::InProgress {
            return false;
        }
        let status = reason.terminal_status();
        self.score = Some(match status {
            SessionStatus::Failed => 0,
            _ => self.correct_answers(),
        });
        self.status = status;
        self.reason = Some(reason);
        self.ended_at = Some(now);
        self.violation_log = violation_log;
        true
    }

    pub fn result_draft(&self, student_id: &str) -> Option<ResultDraft> {
        if !self.status.is_terminal() {
            return None;
        }
        Some(ResultDraft {
            student_id: student_id.to_string(),
            exam_id: self.exam.id.clone(),
            status: self.status,
            reason: self.reason?,
            score: self.score.unwrap_or(0),
            total_questions: self.total_questions(),
            answers: self.answers.clone(),
            violations: self.violation_log.clone(),
            started_at: self.started_at?,
            ended_at: self.ended_at?,
        })
    }
}
