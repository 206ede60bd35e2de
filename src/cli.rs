//! `examguard` command line.

use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use serde::Serialize;
use tokio::time::{sleep, Duration};

use crate::capture::SyntheticCamera;
use crate::db::models::{ExamDraft, Identity, Role};
use crate::db::Database;
use crate::proctor::Proctor;
use crate::sensing::EnvironmentEvent;
use crate::session::SessionOutcome;
use crate::settings::SettingsStore;

#[derive(Parser)]
#[command(name = "examguard")]
#[command(about = "Proctoring engine for timed remote exams", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding the database and settings.json
    #[arg(long, global = true, env = "EXAMGUARD_DATA_DIR", default_value = ".examguard")]
    pub data_dir: PathBuf,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum RoleArg {
    Teacher,
    Student,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Teacher => Role::Teacher,
            RoleArg::Student => Role::Student,
        }
    }
}

#[derive(clap::Args)]
pub struct Credentials {
    #[arg(short, long)]
    pub username: String,

    #[arg(short, long, env = "EXAMGUARD_PASSWORD", hide_env_values = true)]
    pub password: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a teacher or student account
    Register {
        #[command(flatten)]
        credentials: Credentials,

        #[arg(short, long, value_enum, default_value = "student")]
        role: RoleArg,
    },

    /// Author an exam from a JSON draft (teachers only)
    CreateExam {
        /// Path to the draft JSON
        file: PathBuf,

        #[command(flatten)]
        credentials: Credentials,
    },

    /// List exams, optionally only those owned by one teacher
    ListExams {
        #[arg(long)]
        owner: Option<String>,
    },

    /// Take an exam against the synthetic camera (students only)
    Take {
        exam_id: String,

        #[command(flatten)]
        credentials: Credentials,

        /// Answer as QUESTION_ID=OPTION_ID; repeatable
        #[arg(short, long = "answer", value_parser = parse_answer)]
        answers: Vec<(String, String)>,

        /// Simulate the exam window losing focus after this many seconds
        #[arg(long)]
        blur_after: Option<u64>,
    },

    /// Show stored results
    Results {
        #[arg(long)]
        student: Option<String>,

        #[arg(long)]
        exam: Option<String>,
    },
}

fn parse_answer(raw: &str) -> Result<(String, String), String> {
    let (question, option) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected QUESTION_ID=OPTION_ID, got '{raw}'"))?;
    if question.is_empty() || option.is_empty() {
        return Err(format!("expected QUESTION_ID=OPTION_ID, got '{raw}'"));
    }
    Ok((question.to_string(), option.to_string()))
}

pub async fn execute(cli: Cli) -> Result<()> {
    fs::create_dir_all(&cli.data_dir)
        .with_context(|| format!("failed to create {}", cli.data_dir.display()))?;
    let db = Database::new(cli.data_dir.join("examguard.sqlite3"))?;
    let settings = SettingsStore::new(cli.data_dir.join("settings.json"))?;
    let proctor = Proctor::with_database(db, settings.get());
    let json = cli.json;

    match cli.command {
        Commands::Register { credentials, role } => {
            let identity = proctor
                .identities()
                .create(&credentials.username, &credentials.password, role.into())
                .await?;
            print(json, &identity, |id| {
                format!("registered {} ({}) as {}", id.username, id.role.as_str(), id.id)
            })
        }
        Commands::CreateExam { file, credentials } => {
            let author = authenticate(&proctor, &credentials, Role::Teacher).await?;
            let contents = fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let mut draft: ExamDraft = serde_json::from_str(&contents)
                .with_context(|| format!("{} is not a valid exam draft", file.display()))?;
            draft.owner_id = author.id;
            draft.validate()?;
            let exam = proctor.catalog().create(draft).await?;
            print(json, &exam, |exam| {
                format!(
                    "created exam {} \"{}\" ({} questions, {} min)",
                    exam.id,
                    exam.title,
                    exam.questions.len(),
                    exam.time_limit_minutes
                )
            })
        }
        Commands::ListExams { owner } => {
            let exams = match owner {
                Some(owner) => proctor.catalog().list_by_owner(&owner).await?,
                None => proctor.catalog().list_all().await?,
            };
            print(json, &exams, |exams| {
                exams
                    .iter()
                    .map(|exam| {
                        format!(
                            "{}  {}  {} questions  {} min",
                            exam.id,
                            exam.title,
                            exam.questions.len(),
                            exam.time_limit_minutes
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        Commands::Take {
            exam_id,
            credentials,
            answers,
            blur_after,
        } => {
            let student = authenticate(&proctor, &credentials, Role::Student).await?;
            let outcome = take_exam(&proctor, &student, &exam_id, answers, blur_after).await?;
            print(json, &outcome, |outcome| {
                format!(
                    "{} ({:?}): {}/{} correct, {} violation(s){}",
                    outcome.status.as_str(),
                    outcome.reason,
                    outcome.score,
                    outcome.total_questions,
                    outcome.violations.len(),
                    if outcome.record.is_some() { "" } else { " [not saved]" }
                )
            })
        }
        Commands::Results { student, exam } => {
            let results = match (student, exam) {
                (Some(student), _) => proctor.results().list_by_student(&student).await?,
                (None, Some(exam)) => proctor.results().list_by_exam(&exam).await?,
                (None, None) => proctor.results().list_all().await?,
            };
            print(json, &results, |results| {
                results
                    .iter()
                    .map(|r| {
                        format!(
                            "{}  student {}  exam {}  {}  {}/{}  {} violation(s)",
                            r.ended_at.format("%Y-%m-%d %H:%M"),
                            r.student_id,
                            r.exam_id,
                            r.status.as_str(),
                            r.score,
                            r.total_questions,
                            r.violations.len()
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
    }
}

async fn authenticate(proctor: &Proctor, credentials: &Credentials, role: Role) -> Result<Identity> {
    let identity = proctor
        .identities()
        .find_by_credentials(&credentials.username, &credentials.password)
        .await?
        .ok_or_else(|| anyhow!("invalid username or password"))?;
    if identity.role != role {
        bail!("{} is not a {}", identity.username, role.as_str());
    }
    Ok(identity)
}

async fn take_exam(
    proctor: &Proctor,
    student: &Identity,
    exam_id: &str,
    answers: Vec<(String, String)>,
    blur_after: Option<u64>,
) -> Result<SessionOutcome> {
    let session = proctor
        .prepare_session(&student.id, exam_id, Arc::new(SyntheticCamera::default()), None)
        .await?;
    session.start().await?;

    // Once started, every exit goes through `stop` so the attempt is recorded.
    for (question, option) in &answers {
        if let Err(err) = session.set_answer(question, option).await {
            session.stop().await;
            return Err(err).with_context(|| format!("rejected answer {question}={option}"));
        }
    }

    let run = async {
        if let Some(secs) = blur_after {
            sleep(Duration::from_secs(secs)).await;
            proctor
                .bus()
                .publish(EnvironmentEvent::FocusChanged { focused: false });
            return session.wait_for_outcome().await;
        }

        let mut index = 0;
        loop {
            let next = session.next().await;
            if next == index {
                break;
            }
            index = next;
        }
        match session.submit().await {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                // Lost a race with the countdown or a violation.
                warn!("submit rejected: {err}");
                session.wait_for_outcome().await
            }
        }
    };

    let outcome = tokio::select! {
        outcome = run => outcome,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted; stopping session");
            session.stop().await
        }
    };
    // Joins every session task before returning.
    let stopped = session.stop().await;

    outcome
        .or(stopped)
        .ok_or_else(|| anyhow!("session ended without an outcome"))
}

fn print<T: Serialize>(json: bool, value: &T, human: impl FnOnce(&T) -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", human(value));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_take_with_answers() {
        let cli = Cli::try_parse_from([
            "examguard",
            "take",
            "exam-1",
            "--username",
            "sam",
            "--password",
            "pw",
            "--answer",
            "q1=a",
            "-a",
            "q2=b",
            "--blur-after",
            "5",
        ])
        .unwrap();

        match cli.command {
            Commands::Take {
                exam_id,
                answers,
                blur_after,
                ..
            } => {
                assert_eq!(exam_id, "exam-1");
                assert_eq!(answers, vec![("q1".into(), "a".into()), ("q2".into(), "b".into())]);
                assert_eq!(blur_after, Some(5));
            }
            _ => panic!("expected take"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_answer_still_records_the_attempt() {
        use crate::db::models::{OptionDraft, QuestionDraft};
        use crate::session::SessionStatus;
        use crate::settings::ProctorSettings;

        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("examguard.sqlite3")).unwrap();
        let mut settings = ProctorSettings::default();
        settings.detection.stub_probability = 0.0;
        let proctor = Proctor::with_database(db, settings);

        let teacher = proctor
            .identities()
            .create("ada", "secret", Role::Teacher)
            .await
            .unwrap();
        let student = proctor
            .identities()
            .create("sam", "hunter2", Role::Student)
            .await
            .unwrap();
        let exam = proctor
            .catalog()
            .create(ExamDraft {
                owner_id: teacher.id,
                title: "Optics".into(),
                description: "Refraction".into(),
                time_limit_minutes: 1,
                questions: vec![QuestionDraft {
                    prompt: "n of water".into(),
                    options: vec![
                        OptionDraft { text: "1.33".into(), correct: true },
                        OptionDraft { text: "2.42".into(), correct: false },
                    ],
                }],
            })
            .await
            .unwrap();

        let answers = vec![("no-such-question".to_string(), "x".to_string())];
        let err = take_exam(&proctor, &student, &exam.id, answers, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no-such-question"));

        let results = proctor.results().list_by_student(&student.id).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, SessionStatus::Completed);
        assert!(proctor.results().has_taken(&student.id, &exam.id).await.unwrap());
    }

    #[test]
    fn rejects_malformed_answer() {
        assert!(parse_answer("q1").is_err());
        assert!(parse_answer("=a").is_err());
        assert_eq!(parse_answer("q1=a").unwrap(), ("q1".into(), "a".into()));
    }
}
