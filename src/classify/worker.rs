//! Background classification worker
//!
//! A single thread owns the model and answers requests strictly in arrival
//! order, one reply per request.

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

use super::coordinator::CoordinatorError;
use crate::shared::{CoordinatorToWorker, WorkerToCoordinator};
use crate::vision::{Model, ModelLoader};

/// Owner side of the worker thread
pub struct Worker {
    requests: Sender<CoordinatorToWorker>,
    replies: Receiver<WorkerToCoordinator>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Start the worker thread; it idles until it receives `Init`
    pub fn spawn<L>(loader: L) -> std::io::Result<Self>
    where
        L: ModelLoader + 'static,
    {
        let (requests, request_rx) = unbounded();
        let (reply_tx, replies) = unbounded();

        let handle = std::thread::Builder::new()
            .name("classifier-worker".to_string())
            .spawn(move || {
                info!("Classifier worker starting...");
                run(&loader, request_rx, reply_tx);
                info!("Classifier worker exiting...");
            })?;

        Ok(Self {
            requests,
            replies,
            handle: Some(handle),
        })
    }

    /// Queue a request for the worker. Every `Init` and `Classify` gets
    /// exactly one reply. `Classify` is only valid after `InitOk`; the
    /// coordinator never dispatches earlier.
    pub fn send(&self, message: CoordinatorToWorker) -> Result<(), CoordinatorError> {
        self.requests
            .send(message)
            .map_err(|_| CoordinatorError::WorkerGone)
    }

    /// Next reply if one is waiting
    pub fn try_recv(&self) -> Result<Option<WorkerToCoordinator>, CoordinatorError> {
        match self.replies.try_recv() {
            Ok(reply) => Ok(Some(reply)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(CoordinatorError::WorkerGone),
        }
    }

    /// Block until the next reply
    pub fn recv(&self) -> Result<WorkerToCoordinator, CoordinatorError> {
        self.replies.recv().map_err(|_| CoordinatorError::WorkerGone)
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Signal the worker to stop
        let _ = self.requests.send(CoordinatorToWorker::Shutdown);

        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run(
    loader: &dyn ModelLoader,
    requests: Receiver<CoordinatorToWorker>,
    replies: Sender<WorkerToCoordinator>,
) {
    let mut model: Option<Box<dyn Model>> = None;

    for message in requests.iter() {
        let reply = match message {
            CoordinatorToWorker::Init(bytes) => {
                if model.is_some() {
                    warn!("Rejecting repeated classifier init");
                    WorkerToCoordinator::InitError("already initialized".to_string())
                } else {
                    match loader.load(&bytes) {
                        Ok(loaded) => {
                            model = Some(loaded);
                            WorkerToCoordinator::InitOk
                        }
                        Err(e) => {
                            error!("Failed to load classifier: {}", e);
                            WorkerToCoordinator::InitError(e.to_string())
                        }
                    }
                }
            }
            CoordinatorToWorker::Classify(sample) => match &model {
                Some(model) => {
                    let label = model.classify(&sample);
                    debug!("Classified sample as {}", label);
                    WorkerToCoordinator::Classification(label)
                }
                // Protocol violation: there is no reply for a sample that
                // arrived before the model
                None => {
                    error!("Classify request before the classifier was loaded");
                    continue;
                }
            },
            CoordinatorToWorker::Shutdown => break,
        };

        if replies.send(reply).is_err() {
            debug!("Reply channel closed");
            break;
        }
    }
}
