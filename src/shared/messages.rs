//! Message types for communication between the coordinator and the worker

use serde::{Deserialize, Serialize};

use crate::vision::{Classification, IntensityVector};

/// Messages sent from the coordinator to the worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum CoordinatorToWorker {
    /// Load a classifier from its serialized bytes. Always the first message.
    Init(Vec<u8>),
    /// Classify one 784-value sample
    Classify(IntensityVector),
    /// Stop the worker loop
    Shutdown,
}

/// Messages sent from the worker to the coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum WorkerToCoordinator {
    /// The classifier is loaded
    InitOk,
    /// The classifier bytes were rejected
    InitError(String),
    /// Result of one classify request
    Classification(Classification),
}
