//! Bounded pool of worker tasks that execute storage calls.
//!
//! Callers enqueue a job and await a oneshot reply. The whole round trip, queueing included,
//! is bounded by the pool timeout. A call that times out may still complete on the backend;
//! every store operation is atomic, so it is either fully applied or not at all.

use std::{
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};

use futures::{FutureExt, future::BoxFuture};
use tokio::{
    sync::{Mutex, mpsc, oneshot},
    task::JoinSet,
    time::timeout,
};
use tracing::{debug, info};

use crate::{
    dao::{quiz_store::QuizStore, storage::StorageResult},
    error::ServiceError,
    state::StoreSlot,
};

type Job = Box<dyn FnOnce(Option<Arc<dyn QuizStore>>) -> BoxFuture<'static, ()> + Send>;

/// Worker pool in front of the installed [`QuizStore`].
pub struct StoragePool {
    sender: StdMutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<JoinSet<()>>,
    timeout: Duration,
}

impl StoragePool {
    /// Spawn `workers` tasks serving a queue of `workers * 16` pending calls.
    pub fn new(slot: StoreSlot, workers: usize, call_timeout: Duration) -> Self {
        let workers = workers.max(1);
        let (sender, receiver) = mpsc::channel::<Job>(workers * 16);
        let receiver = Arc::new(Mutex::new(receiver));

        let mut set = JoinSet::new();
        for worker in 0..workers {
            let receiver = Arc::clone(&receiver);
            let slot = Arc::clone(&slot);
            set.spawn(async move {
                loop {
                    let job = {
                        let mut receiver = receiver.lock().await;
                        receiver.recv().await
                    };
                    let Some(job) = job else {
                        break;
                    };
                    let store = slot.read().await.clone();
                    job(store).await;
                }
                debug!(worker, "storage worker stopped");
            });
        }

        Self {
            sender: StdMutex::new(Some(sender)),
            workers: Mutex::new(set),
            timeout: call_timeout,
        }
    }

    /// Run `op` against the current store on a worker.
    ///
    /// Fails with [`ServiceError::Degraded`] when no store is installed and
    /// [`ServiceError::Timeout`] when the call does not finish in time.
    pub async fn run<T, F>(&self, op: F) -> Result<T, ServiceError>
    where
        T: Send + 'static,
        F: FnOnce(Arc<dyn QuizStore>) -> BoxFuture<'static, StorageResult<T>> + Send + 'static,
    {
        let sender = self
            .sender
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
            .ok_or(ServiceError::ShuttingDown)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |store: Option<Arc<dyn QuizStore>>| {
            async move {
                let result = match store {
                    Some(store) => op(store).await.map_err(ServiceError::from),
                    None => Err(ServiceError::Degraded),
                };
                let _ = reply_tx.send(result);
            }
            .boxed()
        });

        let round_trip = async move {
            sender
                .send(job)
                .await
                .map_err(|_| ServiceError::ShuttingDown)?;
            drop(sender);
            reply_rx.await.map_err(|_| ServiceError::ShuttingDown)?
        };

        timeout(self.timeout, round_trip)
            .await
            .map_err(|_| ServiceError::Timeout)?
    }

    /// Stop accepting work and wait for queued and in-flight calls to finish.
    pub async fn shutdown(&self) {
        if let Ok(mut guard) = self.sender.lock() {
            guard.take();
        }
        let mut workers = self.workers.lock().await;
        while workers.join_next().await.is_some() {}
        info!("storage pool drained");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::quiz_store::MemoryQuizStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::RwLock;

    fn slot_with_store() -> (StoreSlot, MemoryQuizStore) {
        let store = MemoryQuizStore::new();
        let slot: StoreSlot = Arc::new(RwLock::new(Some(Arc::new(store.clone()))));
        (slot, store)
    }

    #[tokio::test]
    async fn runs_calls_against_the_installed_store() {
        let (slot, _store) = slot_with_store();
        let pool = StoragePool::new(slot, 2, Duration::from_secs(1));

        let cursor = pool.run(|store| store.load_cursor()).await.unwrap();

        assert!(cursor.is_none());
    }

    #[tokio::test]
    async fn missing_store_is_degraded() {
        let pool = StoragePool::new(Arc::new(RwLock::new(None)), 1, Duration::from_secs(1));

        let err = pool.run(|store| store.health_check()).await.unwrap_err();

        assert!(matches!(err, ServiceError::Degraded));
    }

    #[tokio::test]
    async fn offline_store_surfaces_as_unavailable() {
        let (slot, store) = slot_with_store();
        store.set_offline(true).await;
        let pool = StoragePool::new(slot, 1, Duration::from_secs(1));

        let err = pool.run(|store| store.health_check()).await.unwrap_err();

        assert!(matches!(err, ServiceError::Unavailable(_)));
    }

    #[tokio::test]
    async fn slow_call_times_out() {
        let (slot, _store) = slot_with_store();
        let pool = StoragePool::new(slot, 1, Duration::from_millis(20));

        let err = pool
            .run(|_| {
                async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                }
                .boxed()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Timeout));
    }

    #[tokio::test]
    async fn shutdown_drains_in_flight_work() {
        let (slot, _store) = slot_with_store();
        let pool = Arc::new(StoragePool::new(slot, 2, Duration::from_secs(5)));
        let finished = Arc::new(AtomicUsize::new(0));

        let mut calls = JoinSet::new();
        for _ in 0..4 {
            let pool = Arc::clone(&pool);
            let finished = Arc::clone(&finished);
            calls.spawn(async move {
                pool.run(move |_| {
                    async move {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        finished.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                    .boxed()
                })
                .await
            });
        }
        tokio::time::sleep(Duration::from_millis(5)).await;

        pool.shutdown().await;

        assert_eq!(finished.load(Ordering::SeqCst), 4);
        assert!(matches!(
            pool.run(|store| store.health_check()).await,
            Err(ServiceError::ShuttingDown)
        ));
        while calls.join_next().await.is_some() {}
    }
}
