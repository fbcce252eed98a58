//! Background judging queue.
//!
//! A bounded channel of evaluation ids drained by a fixed number of
//! concurrent workers. Delivery is at-least-once: a job whose cascade fails
//! with an infrastructure error is retried until `max_attempts`, which is
//! safe because judging and aggregation are idempotent.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::JudgingConfig;
use crate::services::aggregation_cascade::EvaluationDispatcher;

const RETRY_DELAY: Duration = Duration::from_millis(250);

/// Counters for jobs handled so far.
#[derive(Debug, Default)]
struct QueueCounters {
    completed: AtomicU64,
    retried: AtomicU64,
    dropped: AtomicU64,
}

/// Snapshot of the queue counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStats {
    /// Jobs whose cascade finished
    pub completed: u64,
    /// Attempts that failed and were retried
    pub retried: u64,
    /// Jobs abandoned after `max_attempts` failures
    pub dropped: u64,
}

/// Bounded background queue of evaluations awaiting judgment.
pub struct JudgeQueue {
    sender: RwLock<Option<mpsc::Sender<Uuid>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<QueueCounters>,
}

impl JudgeQueue {
    /// Spawn the queue. Each job is handed to `target`, normally the
    /// aggregation cascade.
    pub fn start(target: Arc<dyn EvaluationDispatcher>, config: &JudgingConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let counters = Arc::new(QueueCounters::default());

        let dispatcher = tokio::spawn(run_dispatcher(
            receiver,
            target,
            config.workers.max(1),
            config.max_attempts.max(1),
            Arc::clone(&counters),
        ));

        tracing::info!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            max_attempts = config.max_attempts,
            "Judge queue started"
        );

        Self {
            sender: RwLock::new(Some(sender)),
            dispatcher: Mutex::new(Some(dispatcher)),
            counters,
        }
    }

    /// Queue an evaluation for judging. Waits while the queue is full.
    pub async fn enqueue(&self, evaluation_id: Uuid) -> DomainResult<()> {
        let sender = self
            .sender
            .read()
            .await
            .clone()
            .ok_or_else(|| DomainError::ExecutionFailed("judge queue is shut down".to_string()))?;

        sender
            .send(evaluation_id)
            .await
            .map_err(|_| DomainError::ExecutionFailed("judge queue is shut down".to_string()))
    }

    /// Stop accepting jobs and wait for queued and in-flight jobs to finish.
    pub async fn shutdown(&self) {
        self.sender.write().await.take();

        let handle = self.dispatcher.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Judge queue dispatcher panicked");
            }
        }

        let stats = self.stats();
        tracing::info!(
            completed = stats.completed,
            retried = stats.retried,
            dropped = stats.dropped,
            "Judge queue shut down"
        );
    }

    /// Current counters.
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            completed: self.counters.completed.load(Ordering::Relaxed),
            retried: self.counters.retried.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl EvaluationDispatcher for JudgeQueue {
    async fn dispatch(&self, evaluation_id: Uuid) -> DomainResult<()> {
        self.enqueue(evaluation_id).await
    }
}

async fn run_dispatcher(
    mut receiver: mpsc::Receiver<Uuid>,
    target: Arc<dyn EvaluationDispatcher>,
    workers: usize,
    max_attempts: u32,
    counters: Arc<QueueCounters>,
) {
    let permits = Arc::new(Semaphore::new(workers));
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "Judge worker panicked");
                }
            }
            job = receiver.recv() => {
                let Some(evaluation_id) = job else { break };
                let Ok(permit) = Arc::clone(&permits).acquire_owned().await else { break };
                let target = Arc::clone(&target);
                let counters = Arc::clone(&counters);
                in_flight.spawn(async move {
                    let _permit = permit;
                    run_job(target.as_ref(), evaluation_id, max_attempts, &counters).await;
                });
            }
        }
    }

    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "Judge worker panicked");
        }
    }
}

async fn run_job(target: &dyn EvaluationDispatcher, evaluation_id: Uuid, max_attempts: u32, counters: &QueueCounters) {
    for attempt in 1..=max_attempts {
        match target.dispatch(evaluation_id).await {
            Ok(()) => {
                counters.completed.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Err(e) if attempt < max_attempts => {
                counters.retried.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(evaluation_id = %evaluation_id, attempt, error = %e, "Judging failed, redelivering");
                tokio::time::sleep(RETRY_DELAY * attempt).await;
            }
            Err(e) => {
                counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::error!(evaluation_id = %evaluation_id, attempt, error = %e, "Judging failed, giving up");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Fails the first `failures` deliveries of every id.
    struct FlakyTarget {
        failures: u32,
        seen: Mutex<HashMap<Uuid, u32>>,
    }

    impl FlakyTarget {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                seen: Mutex::new(HashMap::new()),
            }
        }

        async fn deliveries(&self, id: Uuid) -> u32 {
            self.seen.lock().await.get(&id).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl EvaluationDispatcher for FlakyTarget {
        async fn dispatch(&self, evaluation_id: Uuid) -> DomainResult<()> {
            let mut seen = self.seen.lock().await;
            let count = seen.entry(evaluation_id).or_insert(0);
            *count += 1;
            if *count <= self.failures {
                Err(DomainError::DatabaseError("database is locked".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn config(max_attempts: u32) -> JudgingConfig {
        JudgingConfig {
            workers: 2,
            queue_capacity: 4,
            max_attempts,
        }
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_jobs() {
        let target = Arc::new(FlakyTarget::new(0));
        let queue = JudgeQueue::start(Arc::clone(&target) as Arc<dyn EvaluationDispatcher>, &config(3));

        let ids: Vec<Uuid> = (0..10).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            queue.enqueue(*id).await.unwrap();
        }
        queue.shutdown().await;

        assert_eq!(queue.stats().completed, 10);
        for id in &ids {
            assert_eq!(target.deliveries(*id).await, 1);
        }
    }

    #[tokio::test]
    async fn test_failed_jobs_are_redelivered() {
        let target = Arc::new(FlakyTarget::new(1));
        let queue = JudgeQueue::start(Arc::clone(&target) as Arc<dyn EvaluationDispatcher>, &config(3));

        let id = Uuid::new_v4();
        queue.enqueue(id).await.unwrap();
        queue.shutdown().await;

        assert_eq!(target.deliveries(id).await, 2);
        assert_eq!(queue.stats(), QueueStats { completed: 1, retried: 1, dropped: 0 });
    }

    #[tokio::test]
    async fn test_jobs_dropped_after_max_attempts() {
        let target = Arc::new(FlakyTarget::new(u32::MAX));
        let queue = JudgeQueue::start(Arc::clone(&target) as Arc<dyn EvaluationDispatcher>, &config(2));

        let id = Uuid::new_v4();
        queue.enqueue(id).await.unwrap();
        queue.shutdown().await;

        assert_eq!(target.deliveries(id).await, 2);
        assert_eq!(queue.stats().dropped, 1);
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_fails() {
        let queue = JudgeQueue::start(Arc::new(FlakyTarget::new(0)), &config(1));
        queue.shutdown().await;
        assert!(queue.enqueue(Uuid::new_v4()).await.is_err());
    }
}
