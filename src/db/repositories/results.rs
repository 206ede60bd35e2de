use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_status, to_u32},
    models::{ExamResult, ResultDraft},
};
use crate::stores::ResultStore;

const RESULT_COLUMNS: &str = "id, student_id, exam_id, status, reason, score, total_questions, \
     answers_json, violations_json, started_at, ended_at, created_at";

fn row_to_result(row: &Row) -> Result<ExamResult> {
    let status: String = row.get("status")?;
    let reason: String = row.get("reason")?;
    let score: i64 = row.get("score")?;
    let total: i64 = row.get("total_questions")?;
    let answers: String = row.get("answers_json")?;
    let violations: String = row.get("violations_json")?;
    let started_at: String = row.get("started_at")?;
    let ended_at: String = row.get("ended_at")?;
    let created_at: String = row.get("created_at")?;

    Ok(ExamResult {
        id: row.get("id")?,
        student_id: row.get("student_id")?,
        exam_id: row.get("exam_id")?,
        status: parse_status(&status)?,
        reason: serde_json::from_str(&reason).context("failed to parse reason")?,
        score: to_u32(score, "score")?,
        total_questions: to_u32(total, "total_questions")?,
        answers: serde_json::from_str(&answers).context("failed to parse answers")?,
        violations: serde_json::from_str(&violations).context("failed to parse violations")?,
        started_at: parse_datetime(&started_at, "started_at")?,
        ended_at: parse_datetime(&ended_at, "ended_at")?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

fn query_results(
    conn: &Connection,
    filter: &str,
    args: &[&dyn rusqlite::ToSql],
) -> Result<Vec<ExamResult>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RESULT_COLUMNS} FROM results {filter} ORDER BY ended_at DESC"
    ))?;
    let mut rows = stmt.query(args)?;
    let mut results = Vec::new();
    while let Some(row) = rows.next()? {
        results.push(row_to_result(row)?);
    }
    Ok(results)
}

impl Database {
    pub async fn insert_result(&self, draft: ResultDraft) -> Result<ExamResult> {
        let result = ExamResult::from_draft(Uuid::new_v4().to_string(), draft, Utc::now());
        let record = result.clone();

        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO results (id, student_id, exam_id, status, reason, score, total_questions,
                                      answers_json, violations_json, started_at, ended_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    record.id,
                    record.student_id,
                    record.exam_id,
                    record.status.as_str(),
                    serde_json::to_string(&record.reason)?,
                    record.score,
                    record.total_questions,
                    serde_json::to_string(&record.answers)?,
                    serde_json::to_string(&record.violations)?,
                    record.started_at.to_rfc3339(),
                    record.ended_at.to_rfc3339(),
                    record.created_at.to_rfc3339(),
                ],
            )
            .with_context(|| {
                format!(
                    "failed to save result for student {} exam {}",
                    record.student_id, record.exam_id
                )
            })?;
            Ok(())
        })
        .await?;

        Ok(result)
    }

    pub async fn result_exists(&self, student_id: &str, exam_id: &str) -> Result<bool> {
        let student_id = student_id.to_string();
        let exam_id = exam_id.to_string();
        self.execute(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM results WHERE student_id = ?1 AND exam_id = ?2",
                params![student_id, exam_id],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await
    }
}

#[async_trait]
impl ResultStore for Database {
    async fn has_taken(&self, student_id: &str, exam_id: &str) -> Result<bool> {
        self.result_exists(student_id, exam_id).await
    }

    async fn save(&self, draft: ResultDraft) -> Result<ExamResult> {
        self.insert_result(draft).await
    }

    async fn list_by_student(&self, student_id: &str) -> Result<Vec<ExamResult>> {
        let student_id = student_id.to_string();
        self.execute(move |conn| query_results(conn, "WHERE student_id = ?1", &[&student_id]))
            .await
    }

    async fn list_by_exam(&self, exam_id: &str) -> Result<Vec<ExamResult>> {
        let exam_id = exam_id.to_string();
        self.execute(move |conn| query_results(conn, "WHERE exam_id = ?1", &[&exam_id]))
            .await
    }

    async fn list_all(&self) -> Result<Vec<ExamResult>> {
        self.execute(|conn| query_results(conn, "", &[])).await
    }
}
