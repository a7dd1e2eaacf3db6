//! Classification coordination
//!
//! At most one classify request is in flight at a time. Requests arriving
//! while the worker is busy are coalesced into a single queued sample where
//! the newest one wins; the reply that was in flight when a newer sample got
//! queued is stale and is discarded. `cancel` drops the queued sample and
//! suppresses delivery of the in-flight reply without interrupting the worker.
//!
//! The state machine is a pure function so it can be driven from tests
//! without any thread or channel.

use thiserror::Error;
use tracing::debug;

use super::ClassifierError;
use super::fetch::FetchError;
use crate::shared::WorkerToCoordinator;
use crate::vision::{Classification, IntensityVector};

/// Misuse of the coordinator or protocol violations by the worker
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("classifier is still loading")]
    NotReady,
    #[error("classifier failed to load")]
    Unavailable,
    #[error("unexpected worker reply: {0}")]
    UnexpectedReply(String),
    #[error("classification worker is gone")]
    WorkerGone,
}

/// Classifier load progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Readiness {
    #[default]
    Loading,
    Ready,
    Failed,
}

/// Request pipeline phase
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Phase {
    /// Nothing in flight
    #[default]
    Idle,
    /// One request in flight, plus at most one queued sample
    Busy { queued: Option<IntensityVector> },
}

/// Inputs to the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Caller asked for a classification
    Classify(IntensityVector),
    /// Caller no longer wants pending results
    Cancel,
    /// A reply arrived from the worker
    Reply(WorkerToCoordinator),
    /// Classifier bytes could not be obtained
    FetchFailed(FetchError),
}

/// Effects the owner of the state must carry out, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Send this sample to the worker
    Dispatch(IntensityVector),
    /// Hand this label to the caller
    Deliver(Classification),
    /// Drop a stale or canceled label
    Discard(Classification),
    /// Notify the caller that the classifier is loaded
    ReportLoaded,
    /// Notify the caller that the classifier is unusable
    ReportError(ClassifierError),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CoordinatorState {
    phase: Phase,
    canceled: bool,
    readiness: Readiness,
}

impl CoordinatorState {
    /// Idle and waiting for the classifier to load
    pub fn new() -> Self {
        Self::default()
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness
    }

    /// A request is in flight
    pub fn is_busy(&self) -> bool {
        matches!(self.phase, Phase::Busy { .. })
    }

    /// Compute the next state and the actions to perform.
    ///
    /// On error the current state remains valid and unchanged.
    pub fn step(&self, event: Event) -> Result<(CoordinatorState, Vec<Action>), CoordinatorError> {
        let mut next = self.clone();
        let mut actions = Vec::new();

        match event {
            Event::Classify(sample) => {
                match self.readiness {
                    Readiness::Loading => return Err(CoordinatorError::NotReady),
                    Readiness::Failed => return Err(CoordinatorError::Unavailable),
                    Readiness::Ready => {}
                }
                next.canceled = false;
                match &mut next.phase {
                    Phase::Idle => {
                        next.phase = Phase::Busy { queued: None };
                        actions.push(Action::Dispatch(sample));
                    }
                    Phase::Busy { queued } => {
                        if queued.is_some() {
                            debug!("Replacing queued sample with a newer one");
                        }
                        *queued = Some(sample);
                    }
                }
            }
            Event::Cancel => {
                next.canceled = true;
                if let Phase::Busy { queued } = &mut next.phase {
                    *queued = None;
                }
            }
            Event::Reply(WorkerToCoordinator::InitOk) => {
                next.begin_ready(&mut actions, None)?;
            }
            Event::Reply(WorkerToCoordinator::InitError(message)) => {
                next.begin_ready(&mut actions, Some(ClassifierError::Init(message)))?;
            }
            Event::FetchFailed(error) => {
                next.begin_ready(&mut actions, Some(ClassifierError::Fetch(error)))?;
            }
            Event::Reply(WorkerToCoordinator::Classification(label)) => match &mut next.phase {
                Phase::Idle => {
                    return Err(CoordinatorError::UnexpectedReply(format!(
                        "classification {} with nothing in flight",
                        label
                    )));
                }
                Phase::Busy { queued } => match queued.take() {
                    Some(sample) => {
                        debug!("Classification {} superseded by a newer request", label);
                        actions.push(Action::Discard(label));
                        actions.push(Action::Dispatch(sample));
                    }
                    None => {
                        next.phase = Phase::Idle;
                        if self.canceled {
                            debug!("Classification {} arrived after cancel", label);
                            actions.push(Action::Discard(label));
                        } else {
                            actions.push(Action::Deliver(label));
                        }
                    }
                },
            },
        }

        Ok((next, actions))
    }

    /// Leave `Loading` exactly once, successfully or with `failure`
    fn begin_ready(
        &mut self,
        actions: &mut Vec<Action>,
        failure: Option<ClassifierError>,
    ) -> Result<(), CoordinatorError> {
        if self.readiness != Readiness::Loading {
            return Err(CoordinatorError::UnexpectedReply(format!(
                "init outcome while {:?}",
                self.readiness
            )));
        }
        match failure {
            None => {
                self.readiness = Readiness::Ready;
                actions.push(Action::ReportLoaded);
            }
            Some(error) => {
                self.readiness = Readiness::Failed;
                actions.push(Action::ReportError(error));
            }
        }
        Ok(())
    }
}
