//! Background generation worker.
//!
//! Long generation work is queued and processed by one task per worker.
//! Shutdown is observed between tasks and between molecules, never in the
//! middle of a molecule build.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::generator::CapsuleGenerator;
use crate::types::Id;
use crate::{EngineError, Result};

/// Queue capacity used by [`GenerationQueue::default_channel`].
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Work accepted by the generation worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum GenerationTask {
    /// Plan a pending capsule and build its first molecule
    GenerateCapsule { capsule_id: Id },
    /// Build one plan position
    MaterializeMolecule {
        capsule_id: Id,
        granule_order: u32,
        molecule_order: u32,
    },
    /// Build every plan position in order
    MaterializeCapsule { capsule_id: Id },
}

impl GenerationTask {
    pub fn capsule_id(&self) -> Id {
        match self {
            GenerationTask::GenerateCapsule { capsule_id }
            | GenerationTask::MaterializeMolecule { capsule_id, .. }
            | GenerationTask::MaterializeCapsule { capsule_id } => *capsule_id,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            GenerationTask::GenerateCapsule { .. } => "generate_capsule",
            GenerationTask::MaterializeMolecule { .. } => "materialize_molecule",
            GenerationTask::MaterializeCapsule { .. } => "materialize_capsule",
        }
    }
}

/// Sending half of the generation queue.
#[derive(Debug, Clone)]
pub struct GenerationQueue {
    tx: mpsc::Sender<GenerationTask>,
}

impl GenerationQueue {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<GenerationTask>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub fn default_channel() -> (Self, mpsc::Receiver<GenerationTask>) {
        Self::channel(DEFAULT_QUEUE_CAPACITY)
    }

    pub async fn submit(&self, task: GenerationTask) -> Result<()> {
        debug!(task = task.kind(), capsule_id = task.capsule_id(), "Task queued");
        self.tx.send(task).await.map_err(|_| EngineError::QueueClosed)
    }
}

/// Why the worker loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerResult {
    /// Shutdown token was cancelled
    Shutdown,
    /// Every sender was dropped and the queue drained
    QueueClosed,
}

/// Outcome of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Molecules built or already up to date
    Done { molecules: usize },
    /// Stopped between molecules by shutdown
    Interrupted { molecules: usize },
}

/// Process queued tasks until shutdown or until the queue closes.
pub async fn generation_worker_loop(
    mut rx: mpsc::Receiver<GenerationTask>,
    generator: Arc<CapsuleGenerator>,
    shutdown: CancellationToken,
) -> WorkerResult {
    info!("Generation worker starting");
    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                info!("Generation worker received shutdown signal");
                return WorkerResult::Shutdown;
            }

            task = rx.recv() => {
                let Some(task) = task else {
                    info!("Generation queue closed, worker stopping");
                    return WorkerResult::QueueClosed;
                };
                let kind = task.kind();
                let capsule_id = task.capsule_id();
                info!(task = kind, capsule_id, "Generation task started");
                match run_task(&generator, &task, &shutdown).await {
                    Ok(TaskOutcome::Done { molecules }) => {
                        info!(task = kind, capsule_id, molecules, "Generation task finished");
                    }
                    Ok(TaskOutcome::Interrupted { molecules }) => {
                        warn!(task = kind, capsule_id, molecules, "Generation task interrupted by shutdown");
                    }
                    Err(e) => {
                        error!(task = kind, capsule_id, error = %e, "Generation task failed");
                    }
                }
            }
        }
    }
}

/// Run one task to completion, checking `shutdown` between molecules.
pub async fn run_task(
    generator: &CapsuleGenerator,
    task: &GenerationTask,
    shutdown: &CancellationToken,
) -> Result<TaskOutcome> {
    match *task {
        GenerationTask::GenerateCapsule { capsule_id } => {
            generator.run_generation(capsule_id).await?;
            Ok(TaskOutcome::Done { molecules: 1 })
        }
        GenerationTask::MaterializeMolecule {
            capsule_id,
            granule_order,
            molecule_order,
        } => {
            generator
                .materialize_molecule(capsule_id, granule_order, molecule_order)
                .await?;
            Ok(TaskOutcome::Done { molecules: 1 })
        }
        GenerationTask::MaterializeCapsule { capsule_id } => {
            let mut molecules = 0;
            for (granule_order, molecule_order) in generator.plan_positions(capsule_id).await? {
                if shutdown.is_cancelled() {
                    return Ok(TaskOutcome::Interrupted { molecules });
                }
                generator
                    .materialize_molecule(capsule_id, granule_order, molecule_order)
                    .await?;
                molecules += 1;
            }
            Ok(TaskOutcome::Done { molecules })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_serializes_with_tag() {
        let task = GenerationTask::MaterializeMolecule {
            capsule_id: 4,
            granule_order: 1,
            molecule_order: 2,
        };
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["task"], "materialize_molecule");
        assert_eq!(task.capsule_id(), 4);
    }

    #[tokio::test]
    async fn test_submit_fails_once_receiver_is_dropped() {
        let (queue, rx) = GenerationQueue::channel(1);
        drop(rx);
        let err = queue
            .submit(GenerationTask::GenerateCapsule { capsule_id: 1 })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::QueueClosed));
    }
}
