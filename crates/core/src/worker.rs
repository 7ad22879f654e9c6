//! Bounded pool of ingestion workers.
//!
//! Jobs go through a bounded queue consumed by a fixed number of tasks, so the
//! load placed on the embedding service and the store is capped no matter
//! how many uploads arrive at once. The pool owns its own shutdown scope:
//! callers either drain the queue or cancel in-flight work.

use crate::config::WorkerOptions;
use crate::embeddings::Embedder;
use crate::error::IngestError;
use crate::ingest::{IngestJob, IngestionPipeline};
use crate::traits::{ChunkStore, DocumentStore};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum PoolState {
    Running,
    Draining,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Stop accepting jobs, finish everything already queued.
    Drain,
    /// Stop accepting jobs and abandon in-flight work at the next chunk boundary.
    Cancel,
}

/// Read side of the pool's cancellation scope, handed to every pipeline run.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    state: watch::Receiver<PoolState>,
}

impl ShutdownSignal {
    /// A signal that never fires, for running a pipeline outside a pool.
    pub fn never() -> Self {
        let (_, state) = watch::channel(PoolState::Running);
        Self { state }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state.borrow() == PoolState::Cancelled
    }

    pub async fn cancelled(&self) {
        let mut state = self.state.clone();
        let fired = state
            .wait_for(|current| *current == PoolState::Cancelled)
            .await
            .map(|_| ());
        if fired.is_err() {
            // The pool is gone without ever cancelling.
            std::future::pending::<()>().await;
        }
    }
}

/// Stops a running pool from outside, e.g. on an interrupt while the pool is
/// draining. A pool only ever moves towards cancellation: a later `Drain`
/// never revives a cancelled pool.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    state: Arc<watch::Sender<PoolState>>,
}

impl ShutdownHandle {
    pub fn trigger(&self, mode: ShutdownMode) {
        let next = match mode {
            ShutdownMode::Drain => PoolState::Draining,
            ShutdownMode::Cancel => PoolState::Cancelled,
        };
        let changed = self.state.send_if_modified(|current| {
            if next > *current {
                *current = next;
                true
            } else {
                false
            }
        });
        if changed {
            info!(?mode, "ingestion pool shutting down");
        }
    }
}

/// Cloneable submission handle.
#[derive(Debug, Clone)]
pub struct IngestQueue {
    sender: mpsc::Sender<IngestJob>,
    state: watch::Receiver<PoolState>,
}

impl IngestQueue {
    /// Enqueues a job, waiting for queue capacity when the pool is saturated.
    pub async fn submit(&self, job: IngestJob) -> Result<(), IngestError> {
        if *self.state.borrow() != PoolState::Running {
            return Err(IngestError::QueueClosed);
        }
        let document_id = job.document_id;
        self.sender
            .send(job)
            .await
            .map_err(|_| IngestError::QueueClosed)?;
        debug!(document_id, "ingestion job queued");
        Ok(())
    }
}

pub struct IngestionPool {
    queue: IngestQueue,
    state: Arc<watch::Sender<PoolState>>,
    workers: Vec<JoinHandle<()>>,
}

impl IngestionPool {
    pub fn start<S, E>(pipeline: Arc<IngestionPipeline<S, E>>, options: WorkerOptions) -> Self
    where
        S: DocumentStore + ChunkStore + 'static,
        E: Embedder + 'static,
    {
        let (sender, receiver) = mpsc::channel(options.queue_capacity.max(1));
        let (state, state_receiver) = watch::channel(PoolState::Running);
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..options.workers.max(1))
            .map(|worker| {
                let pipeline = Arc::clone(&pipeline);
                let receiver = Arc::clone(&receiver);
                let control = state_receiver.clone();
                tokio::spawn(run_worker(worker, pipeline, receiver, control))
            })
            .collect::<Vec<_>>();

        info!(
            workers = workers.len(),
            queue_capacity = options.queue_capacity,
            "ingestion pool started"
        );

        Self {
            queue: IngestQueue {
                sender,
                state: state_receiver,
            },
            state: Arc::new(state),
            workers,
        }
    }

    pub fn queue(&self) -> IngestQueue {
        self.queue.clone()
    }

    pub async fn submit(&self, job: IngestJob) -> Result<(), IngestError> {
        self.queue.submit(job).await
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Stops the pool and waits for every worker to exit.
    pub async fn shutdown(self, mode: ShutdownMode) {
        self.shutdown_handle().trigger(mode);

        for worker in self.workers {
            if let Err(error) = worker.await {
                warn!(%error, "ingestion worker terminated abnormally");
            }
        }
        info!("ingestion pool stopped");
    }
}

async fn run_worker<S, E>(
    worker: usize,
    pipeline: Arc<IngestionPipeline<S, E>>,
    receiver: Arc<Mutex<mpsc::Receiver<IngestJob>>>,
    mut control: watch::Receiver<PoolState>,
) where
    S: DocumentStore + ChunkStore + 'static,
    E: Embedder + 'static,
{
    let signal = ShutdownSignal {
        state: control.clone(),
    };

    loop {
        let next = {
            let mut queue = receiver.lock().await;
            next_job(&mut queue, &mut control).await
        };
        let Some(job) = next else {
            break;
        };

        debug!(worker, document_id = job.document_id, "worker picked up job");
        // Outcome is already logged and recorded as the document status.
        let _ = pipeline.process(&job, &signal).await;
    }

    debug!(worker, "ingestion worker exiting");
}

async fn next_job(
    queue: &mut mpsc::Receiver<IngestJob>,
    control: &mut watch::Receiver<PoolState>,
) -> Option<IngestJob> {
    loop {
        let state = *control.borrow_and_update();
        match state {
            PoolState::Cancelled => return None,
            PoolState::Draining => return queue.try_recv().ok(),
            PoolState::Running => {}
        }

        tokio::select! {
            job = queue.recv() => return job,
            changed = control.changed() => {
                if changed.is_err() {
                    return queue.recv().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestionOptions;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::error::EmbedError;
    use crate::models::IngestionStatus;
    use crate::stores::MemoryStore;
    use crate::test_support::{alice_document, FixedTextExtractor};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn ingestion_options() -> IngestionOptions {
        IngestionOptions {
            chunk_size: 16,
            chunk_overlap: 4,
            max_embedding_chars: 64,
        }
    }

    async fn enqueue_documents(
        store: &MemoryStore,
        pool: &IngestionPool,
        count: usize,
    ) -> Vec<u64> {
        let mut ids = Vec::new();
        for index in 0..count {
            let path = format!("/tmp/doc-{index}.pdf");
            let id = store
                .create_document(alice_document(&path))
                .await
                .expect("document should be created");
            pool.submit(IngestJob {
                document_id: id,
                owner_id: "alice".to_string(),
                file_path: path.into(),
            })
            .await
            .expect("job should be queued");
            ids.push(id);
        }
        ids
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn drain_finishes_every_queued_document() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = IngestionPipeline::new(
            Arc::clone(&store),
            Arc::new(CharacterNgramEmbedder::default()),
            Arc::new(FixedTextExtractor::text(
                "Maintenance intervals for the hydraulic pump and its filters.",
            )),
            &ingestion_options(),
        )
        .expect("valid options");
        let pool = IngestionPool::start(
            Arc::new(pipeline),
            WorkerOptions {
                workers: 2,
                queue_capacity: 2,
            },
        );

        let ids = enqueue_documents(&store, &pool, 6).await;
        let queue = pool.queue();
        pool.shutdown(ShutdownMode::Drain).await;

        for id in ids {
            let document = store.get_document(id, "alice").await.expect("document");
            assert_eq!(document.status, IngestionStatus::Ready);
            assert!(!store.list_chunks(id).await.expect("chunks").is_empty());
        }

        let late = queue
            .submit(IngestJob {
                document_id: 999,
                owner_id: "alice".to_string(),
                file_path: "/tmp/late.pdf".into(),
            })
            .await;
        assert!(matches!(late, Err(IngestError::QueueClosed)));
    }

    /// Blocks every call until released, so a job can be caught mid-flight.
    struct GatedEmbedder {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl Embedder for GatedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(vec![1.0, 0.0])
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancel_stops_in_flight_ingestion() {
        let store = Arc::new(MemoryStore::new());
        let embedder = Arc::new(GatedEmbedder {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let pipeline = IngestionPipeline::new(
            Arc::clone(&store),
            Arc::clone(&embedder),
            Arc::new(FixedTextExtractor::text(
                "A long enough text to be split into several chunks for the test.",
            )),
            &ingestion_options(),
        )
        .expect("valid options");
        let pool = IngestionPool::start(
            Arc::new(pipeline),
            WorkerOptions {
                workers: 1,
                queue_capacity: 4,
            },
        );

        let ids = enqueue_documents(&store, &pool, 1).await;
        tokio::time::timeout(Duration::from_secs(5), embedder.entered.notified())
            .await
            .expect("worker should reach the embedding step");

        tokio::time::timeout(Duration::from_secs(5), pool.shutdown(ShutdownMode::Cancel))
            .await
            .expect("cancel should not hang");

        let document = store.get_document(ids[0], "alice").await.expect("document");
        assert!(matches!(document.status, IngestionStatus::Failed { .. }));
        assert!(store.list_chunks(ids[0]).await.expect("chunks").is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancel_escalates_a_running_drain() {
        let store = Arc::new(MemoryStore::new());
        let embedder = Arc::new(GatedEmbedder {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let pipeline = IngestionPipeline::new(
            Arc::clone(&store),
            Arc::clone(&embedder),
            Arc::new(FixedTextExtractor::text("Enough text for a few chunks to embed.")),
            &ingestion_options(),
        )
        .expect("valid options");
        let pool = IngestionPool::start(
            Arc::new(pipeline),
            WorkerOptions {
                workers: 1,
                queue_capacity: 4,
            },
        );

        let ids = enqueue_documents(&store, &pool, 2).await;
        tokio::time::timeout(Duration::from_secs(5), embedder.entered.notified())
            .await
            .expect("worker should reach the embedding step");

        let handle = pool.shutdown_handle();
        let draining = tokio::spawn(pool.shutdown(ShutdownMode::Drain));
        handle.trigger(ShutdownMode::Cancel);
        handle.trigger(ShutdownMode::Drain);

        tokio::time::timeout(Duration::from_secs(5), draining)
            .await
            .expect("cancel should end the drain")
            .expect("shutdown task");

        let first = store.get_document(ids[0], "alice").await.expect("document");
        assert!(matches!(first.status, IngestionStatus::Failed { .. }));
        let second = store.get_document(ids[1], "alice").await.expect("document");
        assert_eq!(second.status, IngestionStatus::Uploaded);
    }

    #[tokio::test]
    async fn never_signal_is_not_cancelled() {
        let signal = ShutdownSignal::never();
        assert!(!signal.is_cancelled());
        let waited = tokio::time::timeout(Duration::from_millis(20), signal.cancelled()).await;
        assert!(waited.is_err());
    }
}
