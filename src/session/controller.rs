use std::sync::{Arc, Mutex as StdMutex};

use chrono::Utc;
use serde::Serialize;
use tokio::{
    sync::{broadcast, mpsc, watch, Mutex},
    task::JoinHandle,
    time::{self, Duration, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::capture::{CaptureManager, FrameSink};
use crate::db::models::{Exam, ExamResult, Question};
use crate::detect::SignalDetector;
use crate::error::{SessionError, StartError};
use crate::sensing::{
    EnvironmentBus, SensingContext, SensingController, SensingNotice, SensingTiming,
};
use crate::stores::ResultStore;
use crate::violations::{Signal, SignalSource, ViolationAggregator, ViolationEvent, ViolationKind};

use super::{ExamSession, SessionStatus, TerminationReason};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

const EVENT_CAPACITY: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    /// Violations needed to fail the session; 1 is zero tolerance.
    pub violation_threshold: u32,
    pub tick_interval: Duration,
    /// Countdown ticks between heartbeat log lines.
    pub heartbeat_every_ticks: u32,
    pub sensing: SensingTiming,
    /// Whether losing the camera mid-exam counts as a violation.
    pub fail_on_capture_loss: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            violation_threshold: 1,
            tick_interval: Duration::from_secs(1),
            heartbeat_every_ticks: 10,
            sensing: SensingTiming::default(),
            fail_on_capture_loss: true,
        }
    }
}

/// Collaborators one session runs against. Constructed by the host.
pub struct SessionDeps {
    pub results: Arc<dyn ResultStore>,
    pub capture: Arc<Mutex<CaptureManager>>,
    pub sink: Arc<dyn FrameSink>,
    pub detector: Arc<StdMutex<SignalDetector>>,
    pub bus: EnvironmentBus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum SessionEvent {
    Started { remaining_seconds: u64 },
    Tick { remaining_seconds: u64 },
    Violation { event: ViolationEvent, count: u32 },
    CaptureDegraded { reason: String },
    Terminated { outcome: SessionOutcome },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOutcome {
    pub status: SessionStatus,
    pub reason: TerminationReason,
    pub score: u32,
    pub total_questions: u32,
    pub violations: Vec<ViolationEvent>,
    /// `None` when the result could not be persisted.
    pub record: Option<ExamResult>,
}

/// Drives one exam attempt from start to its single terminal transition.
///
/// Cloning is cheap; every clone controls the same session.
#[derive(Clone)]
pub struct ExamSessionController {
    student_id: Arc<str>,
    state: Arc<Mutex<ExamSession>>,
    config: SessionConfig,
    results: Arc<dyn ResultStore>,
    capture: Arc<Mutex<CaptureManager>>,
    sink: Arc<dyn FrameSink>,
    detector: Arc<StdMutex<SignalDetector>>,
    bus: EnvironmentBus,
    aggregator: Arc<ViolationAggregator>,
    sensing: Arc<Mutex<SensingController>>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    cancel_token: CancellationToken,
    events: broadcast::Sender<SessionEvent>,
    outcome: Arc<watch::Sender<Option<SessionOutcome>>>,
}

impl ExamSessionController {
    pub fn new(student_id: impl Into<String>, exam: Exam, deps: SessionDeps, config: SessionConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (outcome, _) = watch::channel(None);
        let student_id: String = student_id.into();

        Self {
            student_id: Arc::from(student_id),
            state: Arc::new(Mutex::new(ExamSession::new(exam))),
            config,
            results: deps.results,
            capture: deps.capture,
            sink: deps.sink,
            detector: deps.detector,
            bus: deps.bus,
            aggregator: Arc::new(ViolationAggregator::new()),
            sensing: Arc::new(Mutex::new(SensingController::new())),
            tasks: Arc::new(Mutex::new(Vec::new())),
            cancel_token: CancellationToken::new(),
            events,
            outcome: Arc::new(outcome),
        }
    }

    pub fn student_id(&self) -> &str {
        &self.student_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> ExamSession {
        let mut snapshot = self.state.lock().await.clone();
        if snapshot.status == SessionStatus::InProgress {
            snapshot.violation_log = self.aggregator.snapshot();
        }
        snapshot
    }

    pub async fn status(&self) -> SessionStatus {
        self.state.lock().await.status
    }

    pub async fn remaining_seconds(&self) -> u64 {
        self.state.lock().await.remaining_seconds
    }

    pub fn violations(&self) -> Vec<ViolationEvent> {
        self.aggregator.snapshot()
    }

    pub fn outcome(&self) -> Option<SessionOutcome> {
        self.outcome.borrow().clone()
    }

    /// Resolves once the session is terminal.
    pub async fn wait_for_outcome(&self) -> Option<SessionOutcome> {
        let mut rx = self.outcome.subscribe();
        let outcome = rx.wait_for(Option::is_some).await.ok()?;
        outcome.clone()
    }

    /// `NotStarted -> InProgress`.
    ///
    /// Checks eligibility, the exam, the detector and capture, in that order.
    /// Any failure leaves the session `NotStarted` with nothing allocated.
    pub async fn start(&self) -> Result<(), StartError> {
        let mut state = self.state.lock().await;
        if state.status != SessionStatus::NotStarted {
            return Err(StartError::AlreadyStarted);
        }
        if self.cancel_token.is_cancelled() {
            return Err(StartError::Stopped);
        }

        let exam_id = state.exam.id.clone();
        if self.results.has_taken(&self.student_id, &exam_id).await? {
            log_warn!("student {} already took exam {exam_id}", self.student_id);
            return Err(StartError::AlreadyTaken {
                student_id: self.student_id.to_string(),
                exam_id,
            });
        }

        state
            .exam
            .ensure_runnable()
            .map_err(|err| StartError::InvalidExam(err.to_string()))?;

        match self.detector.lock() {
            Ok(detector) if detector.is_configured() => {}
            Ok(_) => {
                return Err(StartError::DetectorUnavailable(
                    "no detection strategy configured".into(),
                ))
            }
            Err(_) => return Err(StartError::DetectorUnavailable("detector lock poisoned".into())),
        }

        {
            let mut capture = self.capture.lock().await;
            capture.acquire().await?;
            if let Err(err) = capture.bind_sink(self.sink.clone()).await {
                capture.release();
                return Err(err.into());
            }
        }

        state.begin(Utc::now())?;
        let remaining_seconds = state.remaining_seconds;

        let (violation_tx, violation_rx) = mpsc::unbounded_channel();
        self.aggregator.set_callback(Box::new(move |event: &ViolationEvent| {
            let _ = violation_tx.send(event.clone());
        }));

        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let sensing_started = self.sensing.lock().await.start_sensing(
            SensingContext {
                capture: self.capture.clone(),
                detector: self.detector.clone(),
                aggregator: self.aggregator.clone(),
                bus: self.bus.clone(),
                notices: notice_tx,
                timing: self.config.sensing,
            },
            self.cancel_token.child_token(),
        );
        if let Err(err) = sensing_started {
            // Only reachable if a previous start leaked sensing; treat as a bug.
            log_error!("failed to start sensing: {err:#}");
        }

        {
            let mut tasks = self.tasks.lock().await;
            tasks.push(self.spawn_countdown());
            tasks.push(self.spawn_policy(violation_rx, notice_rx));
        }

        log_info!(
            "session started for student {} on exam {exam_id} ({remaining_seconds}s)",
            self.student_id
        );
        self.emit(SessionEvent::Started { remaining_seconds });
        Ok(())
    }

    /// Last write wins. `Ok(false)` when the session is not running.
    pub async fn set_answer(&self, question_id: &str, option_id: &str) -> Result<bool, SessionError> {
        self.state.lock().await.set_answer(question_id, option_id)
    }

    pub async fn next(&self) -> usize {
        self.state.lock().await.next()
    }

    pub async fn previous(&self) -> usize {
        self.state.lock().await.previous()
    }

    pub async fn current_question(&self) -> Option<Question> {
        self.state.lock().await.current_question().cloned()
    }

    /// Manual submission; only from the final question.
    pub async fn submit(&self) -> Result<SessionOutcome, SessionError> {
        self.state.lock().await.ensure_can_submit()?;
        self.finish(TerminationReason::Submitted)
            .await
            .ok_or(SessionError::NotInProgress)
    }

    /// Ends a running session as `Completed`/`Stopped`, then tears down every
    /// schedule and the capture handle regardless of state. Safe to repeat.
    pub async fn stop(&self) -> Option<SessionOutcome> {
        self.finish(TerminationReason::Stopped).await;

        self.cancel_token.cancel();
        if let Err(err) = self.sensing.lock().await.stop_sensing().await {
            log_error!("failed to stop sensing: {err:#}");
        }
        self.capture.lock().await.release();

        let handles: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(err) = handle.await {
                log_error!("session task failed to join: {err}");
            }
        }

        self.outcome()
    }

    /// The termination guard: only the first caller while `InProgress` gets
    /// through. Never awaits the countdown or policy tasks, since either may be
    /// the caller.
    async fn finish(&self, reason: TerminationReason) -> Option<SessionOutcome> {
        let draft = {
            let mut state = self.state.lock().await;
            if state.status != SessionStatus::InProgress {
                return None;
            }
            let log = self.aggregator.seal();
            let reason = self.reason_with_log(reason, &log);
            state.terminate(reason, Utc::now(), log);
            state.result_draft(&self.student_id)?
        };
        log_info!(
            "session for student {} on exam {} ended: {:?} ({:?}), score {}/{}",
            self.student_id,
            draft.exam_id,
            draft.status,
            draft.reason,
            draft.score,
            draft.total_questions
        );

        self.cancel_token.cancel();
        if let Err(err) = self.sensing.lock().await.stop_sensing().await {
            log_error!("failed to stop sensing: {err:#}");
        }
        self.capture.lock().await.release();

        let mut outcome = SessionOutcome {
            status: draft.status,
            reason: draft.reason,
            score: draft.score,
            total_questions: draft.total_questions,
            violations: draft.violations.clone(),
            record: None,
        };
        match self.results.save(draft).await {
            Ok(record) => outcome.record = Some(record),
            Err(err) => log_error!("failed to persist result: {err:#}"),
        }

        self.outcome.send_replace(Some(outcome.clone()));
        self.emit(SessionEvent::Terminated {
            outcome: outcome.clone(),
        });
        Some(outcome)
    }

    /// A log already at the threshold decides the outcome, even if the
    /// policy task has not consumed those events yet.
    fn reason_with_log(&self, reason: TerminationReason, log: &[ViolationEvent]) -> TerminationReason {
        if matches!(reason, TerminationReason::Violation { .. }) {
            return reason;
        }
        let threshold = self.config.violation_threshold.max(1) as usize;
        match log.get(threshold - 1) {
            Some(event) => {
                log_warn!("{:?} overridden by an unprocessed {} violation", reason, event.kind);
                TerminationReason::Violation { kind: event.kind }
            }
            None => reason,
        }
    }

    fn spawn_countdown(&self) -> JoinHandle<()> {
        let controller = self.clone();
        let cancel_token = self.cancel_token.clone();
        let tick_interval = self.config.tick_interval;
        let heartbeat_every = self.config.heartbeat_every_ticks.max(1);

        tokio::spawn(async move {
            let mut interval = time::interval(tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
            interval.tick().await;
            let mut ticks: u32 = 0;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let Some(remaining_seconds) = controller.state.lock().await.tick() else {
                            break;
                        };
                        controller.emit(SessionEvent::Tick { remaining_seconds });

                        ticks = ticks.wrapping_add(1);
                        if ticks % heartbeat_every == 0 {
                            log_info!("heartbeat: {remaining_seconds}s remaining");
                        }

                        if remaining_seconds == 0 {
                            controller.finish(TerminationReason::TimeExpired).await;
                            break;
                        }
                    }
                    _ = cancel_token.cancelled() => break,
                }
            }
            log_debug!("countdown stopped");
        })
    }

    /// Applies the violation threshold and reacts to capture notices.
    fn spawn_policy(
        &self,
        mut violations: mpsc::UnboundedReceiver<ViolationEvent>,
        mut notices: mpsc::UnboundedReceiver<SensingNotice>,
    ) -> JoinHandle<()> {
        let controller = self.clone();
        let cancel_token = self.cancel_token.clone();
        let threshold = self.config.violation_threshold.max(1);
        let fail_on_loss = self.config.fail_on_capture_loss;

        tokio::spawn(async move {
            let mut count: u32 = 0;

            loop {
                tokio::select! {
                    Some(event) = violations.recv() => {
                        count += 1;
                        log_warn!("violation {count}/{threshold}: {}", event.kind);
                        let kind = event.kind;
                        controller.emit(SessionEvent::Violation { event, count });
                        if count >= threshold {
                            controller.finish(TerminationReason::Violation { kind }).await;
                            break;
                        }
                    }
                    Some(notice) = notices.recv() => {
                        controller.on_sensing_notice(notice, fail_on_loss);
                    }
                    _ = cancel_token.cancelled() => break,
                    else => break,
                }
            }
            log_debug!("violation policy stopped after {count} violation(s)");
        })
    }

    fn on_sensing_notice(&self, notice: SensingNotice, fail_on_loss: bool) {
        match notice {
            SensingNotice::Degraded(reason) => self.emit(SessionEvent::CaptureDegraded {
                reason: reason.to_string(),
            }),
            SensingNotice::CaptureLost(err) if fail_on_loss => {
                self.aggregator.record(
                    Signal::new(ViolationKind::Other, SignalSource::Capture)
                        .with_detail(format!("capture lost: {err}")),
                );
            }
            SensingNotice::CaptureLost(err) => {
                log_warn!("capture lost ({err}); continuing on focus monitoring only");
                self.emit(SessionEvent::CaptureDegraded {
                    reason: format!("capture lost: {err}"),
                });
            }
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::Result;
    use async_trait::async_trait;

    use super::*;
    use crate::capture::{CaptureSettings, PreviewSink, SyntheticCamera, SyntheticControl};
    use crate::db::models::{AnswerOption, ResultDraft};
    use crate::detect::StubStrategy;
    use crate::sensing::EnvironmentEvent;

    #[derive(Default)]
    struct MemoryResults {
        taken: bool,
        fail_save: bool,
        saves: AtomicUsize,
        saved: std::sync::Mutex<Vec<ExamResult>>,
    }

    #[async_trait]
    impl ResultStore for MemoryResults {
        async fn has_taken(&self, _student_id: &str, _exam_id: &str) -> Result<bool> {
            Ok(self.taken)
        }

        async fn save(&self, draft: ResultDraft) -> Result<ExamResult> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            if self.fail_save {
                anyhow::bail!("disk full");
            }
            let result = ExamResult::from_draft("r1".into(), draft, Utc::now());
            self.saved.lock().unwrap().push(result.clone());
            Ok(result)
        }

        async fn list_by_student(&self, _student_id: &str) -> Result<Vec<ExamResult>> {
            Ok(self.saved.lock().unwrap().clone())
        }

        async fn list_by_exam(&self, _exam_id: &str) -> Result<Vec<ExamResult>> {
            Ok(self.saved.lock().unwrap().clone())
        }

        async fn list_all(&self) -> Result<Vec<ExamResult>> {
            Ok(self.saved.lock().unwrap().clone())
        }
    }

    fn exam(questions: usize) -> Exam {
        Exam {
            id: "exam-1".into(),
            owner_id: "teacher-1".into(),
            title: "Chemistry".into(),
            description: "Stoichiometry".into(),
            time_limit_minutes: 1,
            questions: (0..questions)
                .map(|i| Question {
                    id: format!("q{i}"),
                    prompt: format!("question {i}"),
                    options: vec![
                        AnswerOption { id: "a".into(), text: "a".into() },
                        AnswerOption { id: "b".into(), text: "b".into() },
                    ],
                    correct_option_id: "a".into(),
                })
                .collect(),
            created_at: Utc::now(),
        }
    }

    struct Harness {
        controller: ExamSessionController,
        results: Arc<MemoryResults>,
        camera: SyntheticControl,
        bus: EnvironmentBus,
    }

    fn harness(results: MemoryResults, detector: SignalDetector, config: SessionConfig) -> Harness {
        let camera = SyntheticCamera::default();
        let control = camera.control();
        let results = Arc::new(results);
        let bus = EnvironmentBus::new();
        let deps = SessionDeps {
            results: results.clone(),
            capture: Arc::new(Mutex::new(CaptureManager::new(
                Arc::new(camera),
                CaptureSettings::default(),
            ))),
            sink: Arc::new(PreviewSink::new()),
            detector: Arc::new(StdMutex::new(detector)),
            bus: bus.clone(),
        };
        Harness {
            controller: ExamSessionController::new("student-1", exam(2), deps, config),
            results,
            camera: control,
            bus,
        }
    }

    fn quiet_detector() -> SignalDetector {
        SignalDetector::with_strategy(Box::new(StubStrategy::seeded(0.0, 1)))
    }

    #[tokio::test(start_paused = true)]
    async fn submit_scores_answers_and_releases_capture() {
        let h = harness(MemoryResults::default(), quiet_detector(), SessionConfig::default());
        h.controller.start().await.unwrap();
        assert_eq!(h.camera.live_streams(), 1);

        h.controller.set_answer("q0", "a").await.unwrap();
        h.controller.set_answer("q1", "b").await.unwrap();
        assert_eq!(h.controller.submit().await.unwrap_err(), SessionError::NotOnFinalQuestion);
        h.controller.next().await;

        let outcome = h.controller.submit().await.unwrap();
        assert_eq!(outcome.status, SessionStatus::Completed);
        assert_eq!(outcome.reason, TerminationReason::Submitted);
        assert_eq!(outcome.score, 1);
        assert!(outcome.record.is_some());
        assert_eq!(h.camera.live_streams(), 0);
        assert_eq!(h.bus.subscriber_count(), 0);

        assert_eq!(h.controller.set_answer("q0", "b").await, Ok(false));
        assert_eq!(h.controller.stop().await.map(|o| o.score), Some(1));
        assert_eq!(h.results.saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn first_violation_fails_session_with_zero_score() {
        let h = harness(MemoryResults::default(), quiet_detector(), SessionConfig::default());
        let mut events = h.controller.subscribe();
        h.controller.start().await.unwrap();
        h.controller.set_answer("q0", "a").await.unwrap();

        h.bus.publish(EnvironmentEvent::VisibilityChanged { visible: false });
        let outcome = h.controller.wait_for_outcome().await.unwrap();

        assert_eq!(outcome.status, SessionStatus::Failed);
        assert_eq!(outcome.score, 0);
        assert_eq!(outcome.violations.len(), 1);
        assert_eq!(outcome.violations[0].kind, ViolationKind::TabSwitch);
        assert_eq!(h.camera.live_streams(), 0);

        // later signals never reach the frozen log
        h.bus.publish(EnvironmentEvent::FocusChanged { focused: false });
        assert_eq!(h.controller.violations().len(), 1);

        h.controller.stop().await;
        assert_eq!(h.results.saves.load(Ordering::SeqCst), 1);

        let mut saw_terminated = false;
        while let Ok(event) = events.try_recv() {
            saw_terminated |= matches!(event, SessionEvent::Terminated { .. });
        }
        assert!(saw_terminated);
    }

    #[tokio::test(start_paused = true)]
    async fn logged_violation_wins_over_submit_that_beats_the_policy_task() {
        let h = harness(MemoryResults::default(), quiet_detector(), SessionConfig::default());
        h.controller.start().await.unwrap();
        h.controller.set_answer("q0", "a").await.unwrap();

        // No await between the record and finish, so the policy task has not run.
        h.controller
            .aggregator
            .record(Signal::new(ViolationKind::MultiplePeople, SignalSource::Detector));
        let outcome = h.controller.finish(TerminationReason::Submitted).await.unwrap();

        assert_eq!(outcome.status, SessionStatus::Failed);
        assert_eq!(
            outcome.reason,
            TerminationReason::Violation {
                kind: ViolationKind::MultiplePeople
            }
        );
        assert_eq!(outcome.score, 0);
        assert_eq!(outcome.violations.len(), 1);

        h.controller.stop().await;
        assert_eq!(h.results.saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn logged_violations_below_threshold_do_not_change_the_reason() {
        let config = SessionConfig {
            violation_threshold: 2,
            ..SessionConfig::default()
        };
        let h = harness(MemoryResults::default(), quiet_detector(), config);
        h.controller.start().await.unwrap();
        h.controller.set_answer("q0", "a").await.unwrap();

        h.controller
            .aggregator
            .record(Signal::new(ViolationKind::AppBlur, SignalSource::Environment));
        let outcome = h.controller.finish(TerminationReason::TimeExpired).await.unwrap();

        assert_eq!(outcome.status, SessionStatus::Completed);
        assert_eq!(outcome.reason, TerminationReason::TimeExpired);
        assert_eq!(outcome.score, 1);
        assert_eq!(outcome.violations.len(), 1);
        h.controller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn threshold_allows_violations_below_it() {
        let config = SessionConfig {
            violation_threshold: 2,
            ..SessionConfig::default()
        };
        let h = harness(MemoryResults::default(), quiet_detector(), config);
        h.controller.start().await.unwrap();

        h.bus.publish(EnvironmentEvent::FocusChanged { focused: false });
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.controller.status().await, SessionStatus::InProgress);

        h.bus.publish(EnvironmentEvent::FocusChanged { focused: true });
        h.bus.publish(EnvironmentEvent::FocusChanged { focused: false });
        let outcome = h.controller.wait_for_outcome().await.unwrap();
        assert_eq!(outcome.status, SessionStatus::Failed);
        assert_eq!(outcome.violations.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_expiry_completes_session() {
        let h = harness(MemoryResults::default(), quiet_detector(), SessionConfig::default());
        h.controller.start().await.unwrap();
        h.controller.set_answer("q1", "a").await.unwrap();

        let outcome = h.controller.wait_for_outcome().await.unwrap();
        assert_eq!(outcome.status, SessionStatus::Completed);
        assert_eq!(outcome.reason, TerminationReason::TimeExpired);
        assert_eq!(outcome.score, 1);
        assert_eq!(h.controller.remaining_seconds().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn already_taken_is_rejected_before_capture() {
        let results = MemoryResults {
            taken: true,
            ..MemoryResults::default()
        };
        let h = harness(results, quiet_detector(), SessionConfig::default());
        let err = h.controller.start().await.unwrap_err();
        assert!(matches!(err, StartError::AlreadyTaken { .. }));
        assert_eq!(h.camera.open_attempts(), 0);
        assert_eq!(h.controller.status().await, SessionStatus::NotStarted);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_detector_and_denied_camera_leave_session_unstarted() {
        let h = harness(MemoryResults::default(), SignalDetector::new(), SessionConfig::default());
        assert!(matches!(
            h.controller.start().await,
            Err(StartError::DetectorUnavailable(_))
        ));
        assert_eq!(h.camera.open_attempts(), 0);

        let h = harness(MemoryResults::default(), quiet_detector(), SessionConfig::default());
        h.camera.deny_permission(true);
        match h.controller.start().await {
            Err(StartError::Capture(err)) => assert!(err.is_permission()),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(h.controller.status().await, SessionStatus::NotStarted);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_persists_once() {
        let h = harness(MemoryResults::default(), quiet_detector(), SessionConfig::default());
        h.controller.start().await.unwrap();

        let first = h.controller.stop().await.unwrap();
        assert_eq!(first.status, SessionStatus::Completed);
        assert_eq!(first.reason, TerminationReason::Stopped);
        let second = h.controller.stop().await.unwrap();
        assert_eq!(second.reason, TerminationReason::Stopped);

        assert_eq!(h.results.saves.load(Ordering::SeqCst), 1);
        assert_eq!(h.camera.live_streams(), 0);
        assert!(matches!(h.controller.start().await, Err(StartError::AlreadyStarted)));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_before_start_prevents_start() {
        let h = harness(MemoryResults::default(), quiet_detector(), SessionConfig::default());
        assert!(h.controller.stop().await.is_none());
        assert!(matches!(h.controller.start().await, Err(StartError::Stopped)));
        assert_eq!(h.camera.open_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn persistence_failure_keeps_terminal_state() {
        let results = MemoryResults {
            fail_save: true,
            ..MemoryResults::default()
        };
        let h = harness(results, quiet_detector(), SessionConfig::default());
        h.controller.start().await.unwrap();
        let outcome = h.controller.stop().await.unwrap();
        assert!(outcome.record.is_none());
        assert_eq!(h.controller.status().await, SessionStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn capture_loss_counts_as_violation() {
        let h = harness(MemoryResults::default(), quiet_detector(), SessionConfig::default());
        h.controller.start().await.unwrap();
        h.camera.set_stalled(true);
        h.camera.set_unavailable(true);

        let outcome = h.controller.wait_for_outcome().await.unwrap();
        assert_eq!(outcome.status, SessionStatus::Failed);
        assert_eq!(outcome.violations[0].kind, ViolationKind::Other);
        assert!(outcome.violations[0]
            .detail
            .as_deref()
            .unwrap_or_default()
            .starts_with("capture lost"));
    }
}
