//! Exam catalog data models.
//!
//! `Exam` is what the session engine runs; `ExamDraft` is what an author
//! submits to the catalog before ids are assigned.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOption {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub prompt: String,
    pub options: Vec<AnswerOption>,
    pub correct_option_id: String,
}

impl Question {
    pub fn has_option(&self, option_id: &str) -> bool {
        self.options.iter().any(|option| option.id == option_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Exam {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: String,
    pub time_limit_minutes: u32,
    pub questions: Vec<Question>,
    pub created_at: DateTime<Utc>,
}

impl Exam {
    pub fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }

    pub fn time_limit_secs(&self) -> u64 {
        u64::from(self.time_limit_minutes) * 60
    }

    /// Checks the invariants the session engine relies on.
    pub fn ensure_runnable(&self) -> Result<()> {
        if self.time_limit_minutes == 0 {
            bail!("time limit must be greater than zero");
        }
        if self.questions.is_empty() {
            bail!("exam has no questions");
        }
        for question in &self.questions {
            if !question.has_option(&question.correct_option_id) {
                bail!(
                    "question {} marks {} as correct but has no such option",
                    question.id,
                    question.correct_option_id
                );
            }
        }
        Ok(())
    }
}

/// One option as authored; `correct` flags the single right answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionDraft {
    pub text: String,
    #[serde(default)]
    pub correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDraft {
    pub prompt: String,
    pub options: Vec<OptionDraft>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamDraft {
    /// Filled in from the authenticated author when omitted.
    #[serde(default)]
    pub owner_id: String,
    pub title: String,
    pub description: String,
    pub time_limit_minutes: u32,
    pub questions: Vec<QuestionDraft>,
}

impl ExamDraft {
    /// Author-side validation. The catalog itself stores whatever it is given.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            bail!("title must not be empty");
        }
        if self.description.trim().is_empty() {
            bail!("description must not be empty");
        }
        if self.time_limit_minutes == 0 {
            bail!("time limit must be at least one minute");
        }
        if self.questions.is_empty() {
            bail!("an exam needs at least one question");
        }
        for (index, question) in self.questions.iter().enumerate() {
            let number = index + 1;
            if question.prompt.trim().is_empty() {
                bail!("question {number} has an empty prompt");
            }
            if question.options.len() < 2 {
                bail!("question {number} needs at least two options");
            }
            if question.options.iter().any(|o| o.text.trim().is_empty()) {
                bail!("question {number} has an empty option");
            }
            let correct = question.options.iter().filter(|o| o.correct).count();
            if correct != 1 {
                bail!("question {number} must have exactly one correct option, found {correct}");
            }
        }
        Ok(())
    }
}
