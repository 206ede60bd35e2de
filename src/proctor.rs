//! Host-side wiring: stores, settings and the environment bus, plus the
//! factory that assembles one `ExamSessionController` per attempt.

use std::sync::{Arc, Mutex as StdMutex};

use log::{info, warn};
use tokio::sync::Mutex;

use crate::capture::{CaptureDevice, CaptureManager, PreviewSink};
use crate::db::Database;
use crate::detect::{strategy_for_mode, FaceModel, SignalDetector};
use crate::error::StartError;
use crate::sensing::EnvironmentBus;
use crate::session::{ExamSessionController, SessionDeps};
use crate::settings::ProctorSettings;
use crate::stores::{ExamCatalog, IdentityStore, ResultStore};

pub struct Proctor {
    identities: Arc<dyn IdentityStore>,
    catalog: Arc<dyn ExamCatalog>,
    results: Arc<dyn ResultStore>,
    settings: ProctorSettings,
    bus: EnvironmentBus,
}

impl Proctor {
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        catalog: Arc<dyn ExamCatalog>,
        results: Arc<dyn ResultStore>,
        settings: ProctorSettings,
    ) -> Self {
        Self {
            identities,
            catalog,
            results,
            settings,
            bus: EnvironmentBus::new(),
        }
    }

    /// All three stores backed by one SQLite database.
    pub fn with_database(db: Database, settings: ProctorSettings) -> Self {
        let db = Arc::new(db);
        Self::new(db.clone(), db.clone(), db, settings)
    }

    pub fn identities(&self) -> &Arc<dyn IdentityStore> {
        &self.identities
    }

    pub fn catalog(&self) -> &Arc<dyn ExamCatalog> {
        &self.catalog
    }

    pub fn results(&self) -> &Arc<dyn ResultStore> {
        &self.results
    }

    pub fn settings(&self) -> &ProctorSettings {
        &self.settings
    }

    /// Where the host publishes focus and visibility changes.
    pub fn bus(&self) -> &EnvironmentBus {
        &self.bus
    }

    /// Looks the exam up and assembles a controller for it. Nothing is
    /// acquired until `start`, which also runs the eligibility check.
    ///
    /// `model` is only used when the configured strategy is `model`.
    pub async fn prepare_session(
        &self,
        student_id: &str,
        exam_id: &str,
        device: Arc<dyn CaptureDevice>,
        model: Option<Box<dyn FaceModel>>,
    ) -> Result<ExamSessionController, StartError> {
        let exam = self
            .catalog
            .get_by_id(exam_id)
            .await?
            .ok_or_else(|| StartError::ExamNotFound(exam_id.to_string()))?;

        let detection = &self.settings.detection;
        let mut detector = SignalDetector::new();
        match strategy_for_mode(
            detection.strategy,
            detection.stub_probability,
            detection.rotation_threshold_deg,
            model,
        ) {
            Ok(strategy) => detector.configure(strategy),
            Err(err) => warn!("detector left unconfigured: {err}"),
        }

        info!(
            "preparing session for student {student_id} on exam {exam_id} with {} camera",
            device.name()
        );

        let deps = SessionDeps {
            results: self.results.clone(),
            capture: Arc::new(Mutex::new(CaptureManager::new(
                device,
                self.settings.capture_manager_settings(),
            ))),
            sink: Arc::new(PreviewSink::new()),
            detector: Arc::new(StdMutex::new(detector)),
            bus: self.bus.clone(),
        };

        Ok(ExamSessionController::new(
            student_id,
            exam,
            deps,
            self.settings.session_config(),
        ))
    }
}
