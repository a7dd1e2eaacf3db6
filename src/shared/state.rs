//! Shared application state between the controller and classifier callbacks

use crate::config::AppConfig;
use crate::vision::Classification;

/// Central state owned by the application controller
#[derive(Debug, Clone, Default)]
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Runtime state (not persisted)
    pub runtime: RuntimeState,
}

impl AppState {
    /// Create a new state with the given configuration
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            runtime: RuntimeState::default(),
        }
    }
}

/// Whether the classifier can take requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClassifierStatus {
    /// Classifier bytes are being fetched or loaded
    #[default]
    Loading,
    /// The worker accepted the classifier
    Ready,
    /// Fetch or load failed; classification is unavailable
    Failed,
}

/// Runtime state that is not persisted
#[derive(Debug, Clone, Default)]
pub struct RuntimeState {
    /// Classifier readiness
    pub classifier_status: ClassifierStatus,
    /// Most recent delivered label
    pub last_classification: Option<Classification>,
    /// Number of labels delivered to the caller
    pub delivered: u64,
    /// Last error message (if any)
    pub last_error: Option<String>,
}

impl RuntimeState {
    /// Clear any error state
    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Set an error message
    pub fn set_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }

    /// Record a delivered label
    pub fn record_classification(&mut self, label: Classification) {
        self.last_classification = Some(label);
        self.delivered += 1;
    }
}
