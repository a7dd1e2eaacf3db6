//! Shared state and messaging between the coordinator and the worker
//!
//! This module provides the worker message protocol and the application
//! state shared with classifier callbacks.

pub mod messages;
pub mod state;

pub use messages::{CoordinatorToWorker, WorkerToCoordinator};
pub use state::{AppState, ClassifierStatus};
