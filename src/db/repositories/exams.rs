use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, to_u32},
    models::{AnswerOption, Exam, ExamDraft, Question},
};
use crate::stores::ExamCatalog;

const EXAM_COLUMNS: &str = "id, owner_id, title, description, time_limit_minutes, created_at";

fn row_to_exam_header(row: &Row) -> Result<Exam> {
    let created_at: String = row.get("created_at")?;
    let time_limit: i64 = row.get("time_limit_minutes")?;

    Ok(Exam {
        id: row.get("id")?,
        owner_id: row.get("owner_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        time_limit_minutes: to_u32(time_limit, "time_limit_minutes")?,
        questions: Vec::new(),
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

fn load_questions(conn: &Connection, exam_id: &str) -> Result<Vec<Question>> {
    let mut question_stmt = conn.prepare(
        "SELECT id, prompt, correct_option_id FROM questions
         WHERE exam_id = ?1
         ORDER BY position ASC",
    )?;
    let mut option_stmt = conn.prepare(
        "SELECT id, text FROM options
         WHERE question_id = ?1
         ORDER BY position ASC",
    )?;

    let headers = question_stmt
        .query_map(params![exam_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut questions = Vec::with_capacity(headers.len());
    for (id, prompt, correct_option_id) in headers {
        let options = option_stmt
            .query_map(params![id], |row| {
                Ok(AnswerOption {
                    id: row.get(0)?,
                    text: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        questions.push(Question {
            id,
            prompt,
            options,
            correct_option_id,
        });
    }
    Ok(questions)
}

fn query_exams(conn: &Connection, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<Exam>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(args)?;
    let mut exams = Vec::new();
    while let Some(row) = rows.next()? {
        exams.push(row_to_exam_header(row)?);
    }
    for exam in &mut exams {
        exam.questions = load_questions(conn, &exam.id)?;
    }
    Ok(exams)
}

impl Database {
    pub async fn insert_exam(&self, draft: ExamDraft) -> Result<Exam> {
        let exam_id = Uuid::new_v4().to_string();
        let created_at = Utc::now();

        let mut questions = Vec::with_capacity(draft.questions.len());
        for (index, question) in draft.questions.iter().enumerate() {
            let options: Vec<AnswerOption> = question
                .options
                .iter()
                .map(|option| AnswerOption {
                    id: Uuid::new_v4().to_string(),
                    text: option.text.clone(),
                })
                .collect();
            let correct_index = question
                .options
                .iter()
                .position(|option| option.correct)
                .ok_or_else(|| anyhow!("question {} has no correct option", index + 1))?;
            questions.push(Question {
                id: Uuid::new_v4().to_string(),
                prompt: question.prompt.clone(),
                correct_option_id: options[correct_index].id.clone(),
                options,
            });
        }

        let exam = Exam {
            id: exam_id,
            owner_id: draft.owner_id,
            title: draft.title,
            description: draft.description,
            time_limit_minutes: draft.time_limit_minutes,
            questions,
            created_at,
        };
        let record = exam.clone();

        self.execute(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO exams (id, owner_id, title, description, time_limit_minutes, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.id,
                    record.owner_id,
                    record.title,
                    record.description,
                    record.time_limit_minutes,
                    record.created_at.to_rfc3339(),
                ],
            )
            .context("failed to insert exam")?;

            for (q_pos, question) in record.questions.iter().enumerate() {
                tx.execute(
                    "INSERT INTO questions (id, exam_id, position, prompt, correct_option_id)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        question.id,
                        record.id,
                        q_pos as i64,
                        question.prompt,
                        question.correct_option_id,
                    ],
                )
                .context("failed to insert question")?;
                for (o_pos, option) in question.options.iter().enumerate() {
                    tx.execute(
                        "INSERT INTO options (id, question_id, position, text)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![option.id, question.id, o_pos as i64, option.text],
                    )
                    .context("failed to insert option")?;
                }
            }

            tx.commit().context("failed to commit exam")?;
            Ok(())
        })
        .await?;

        Ok(exam)
    }

    pub async fn get_exam(&self, exam_id: &str) -> Result<Option<Exam>> {
        let exam_id = exam_id.to_string();
        self.execute(move |conn| {
            let header = conn
                .query_row(
                    &format!("SELECT {EXAM_COLUMNS} FROM exams WHERE id = ?1"),
                    params![exam_id],
                    |row| Ok(row_to_exam_header(row)),
                )
                .optional()?;

            match header {
                Some(exam) => {
                    let mut exam = exam?;
                    exam.questions = load_questions(conn, &exam.id)?;
                    Ok(Some(exam))
                }
                None => Ok(None),
            }
        })
        .await
    }

    pub async fn list_exams(&self, owner_id: Option<String>) -> Result<Vec<Exam>> {
        self.execute(move |conn| match owner_id {
            Some(owner) => query_exams(
                conn,
                &format!(
                    "SELECT {EXAM_COLUMNS} FROM exams WHERE owner_id = ?1 ORDER BY created_at DESC"
                ),
                &[&owner],
            ),
            None => query_exams(
                conn,
                &format!("SELECT {EXAM_COLUMNS} FROM exams ORDER BY created_at DESC"),
                &[],
            ),
        })
        .await
    }
}

#[async_trait]
impl ExamCatalog for Database {
    async fn get_by_id(&self, exam_id: &str) -> Result<Option<Exam>> {
        self.get_exam(exam_id).await
    }

    async fn list_all(&self) -> Result<Vec<Exam>> {
        self.list_exams(None).await
    }

    async fn list_by_owner(&self, teacher_id: &str) -> Result<Vec<Exam>> {
        self.list_exams(Some(teacher_id.to_string())).await
    }

    async fn create(&self, draft: ExamDraft) -> Result<Exam> {
        self.insert_exam(draft).await
    }
}
