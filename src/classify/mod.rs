//! Classification Layer
//!
//! `Classifier` drives the coordinator state machine against a background
//! worker thread and reports outcomes through caller callbacks. Callbacks run
//! on the caller's thread, inside `pump` or `wait`.

pub mod coordinator;
pub mod fetch;
pub mod worker;

use thiserror::Error;
use tracing::{debug, error, info, warn};

pub use coordinator::{CoordinatorError, Readiness};
pub use fetch::{ClassifierSource, ClassifierStore, FetchError};

use coordinator::{Action, CoordinatorState, Event};
use worker::Worker;

use crate::shared::CoordinatorToWorker;
use crate::vision::{Classification, IntensityVector, ModelLoader};

/// Why the classifier became unusable
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClassifierError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("classifier failed to load: {0}")]
    Init(String),
}

type LoadCallback = Box<dyn FnMut() + Send>;
type ErrorCallback = Box<dyn FnMut(&ClassifierError) + Send>;
type ClassifyCallback = Box<dyn FnMut(Classification) + Send>;

#[derive(Default)]
struct Callbacks {
    on_load: Option<LoadCallback>,
    on_error: Option<ErrorCallback>,
    on_classify: Option<ClassifyCallback>,
}

/// Handle to a classifier running on its own worker thread
pub struct Classifier {
    state: CoordinatorState,
    worker: Worker,
    callbacks: Callbacks,
    init_sent: bool,
}

impl Classifier {
    /// Start the worker; the classifier stays `Loading` until `init`
    pub fn spawn<L>(loader: L) -> std::io::Result<Self>
    where
        L: ModelLoader + 'static,
    {
        Ok(Self {
            state: CoordinatorState::new(),
            worker: Worker::spawn(loader)?,
            callbacks: Callbacks::default(),
            init_sent: false,
        })
    }

    /// Called once when the classifier is ready
    pub fn on_load(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.callbacks.on_load = Some(Box::new(f));
        self
    }

    /// Called once when fetching or loading fails
    pub fn on_error(mut self, f: impl FnMut(&ClassifierError) + Send + 'static) -> Self {
        self.callbacks.on_error = Some(Box::new(f));
        self
    }

    /// Called for every delivered label
    pub fn on_classify(mut self, f: impl FnMut(Classification) + Send + 'static) -> Self {
        self.callbacks.on_classify = Some(Box::new(f));
        self
    }

    /// Hand the classifier bytes to the worker
    pub fn init(&mut self, bytes: Vec<u8>) -> Result<(), CoordinatorError> {
        if self.init_sent || self.state.readiness() != Readiness::Loading {
            warn!("Classifier already initialized, ignoring init");
            return Ok(());
        }
        debug!("Sending {} classifier bytes to the worker", bytes.len());
        self.worker.send(CoordinatorToWorker::Init(bytes))?;
        self.init_sent = true;
        Ok(())
    }

    /// Initialize from the outcome of a fetch
    pub fn init_from(&mut self, fetched: Result<Vec<u8>, FetchError>) -> Result<(), CoordinatorError> {
        match fetched {
            Ok(bytes) => self.init(bytes),
            Err(e) => self.apply(Event::FetchFailed(e)),
        }
    }

    /// Request a classification; never blocks
    pub fn classify(&mut self, sample: IntensityVector) -> Result<(), CoordinatorError> {
        self.apply(Event::Classify(sample))
    }

    /// Drop the queued request and suppress the in-flight result
    pub fn cancel(&mut self) {
        if let Err(e) = self.apply(Event::Cancel) {
            warn!("Cancel failed: {}", e);
        }
    }

    /// Process every reply already received; returns how many were handled
    pub fn pump(&mut self) -> Result<usize, CoordinatorError> {
        let mut handled = 0;
        while let Some(reply) = self.worker.try_recv()? {
            self.apply(Event::Reply(reply))?;
            handled += 1;
        }
        Ok(handled)
    }

    /// Block until nothing is in flight and any pending init has resolved
    pub fn wait(&mut self) -> Result<(), CoordinatorError> {
        while self.is_pending() {
            let reply = self.worker.recv()?;
            self.apply(Event::Reply(reply))?;
        }
        Ok(())
    }

    pub fn readiness(&self) -> Readiness {
        self.state.readiness()
    }

    fn is_pending(&self) -> bool {
        (self.init_sent && self.readiness() == Readiness::Loading) || self.state.is_busy()
    }

    fn apply(&mut self, event: Event) -> Result<(), CoordinatorError> {
        let (next, actions) = self.state.step(event)?;
        self.state = next;

        for action in actions {
            match action {
                Action::Dispatch(sample) => {
                    self.worker.send(CoordinatorToWorker::Classify(sample))?;
                }
                Action::Deliver(label) => {
                    debug!("Delivering classification {}", label);
                    if let Some(f) = self.callbacks.on_classify.as_mut() {
                        f(label);
                    }
                }
                Action::Discard(label) => {
                    debug!("Discarding classification {}", label);
                }
                Action::ReportLoaded => {
                    info!("Classifier ready");
                    if let Some(f) = self.callbacks.on_load.as_mut() {
                        f();
                    }
                }
                Action::ReportError(e) => {
                    error!("Classifier unavailable: {}", e);
                    if let Some(f) = self.callbacks.on_error.as_mut() {
                        f(&e);
                    }
                }
            }
        }
        Ok(())
    }
}
