use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::{ScanCompletedData, ScanError};

pub(crate) type ScanReply = oneshot::Sender<Result<ScanCompletedData, ScanError>>;

pub(crate) struct ScanRequest {
    pub scanner_id: String,
    pub reply: Option<ScanReply>,
}

/// FIFO of scanner ids drained by a single worker.
///
/// Tracks how many runs of each scanner are queued but not yet started so
/// scheduled fires can be dropped when a run is already waiting.
pub struct ScanQueue {
    tx: mpsc::Sender<ScanRequest>,
    rx: Mutex<Option<mpsc::Receiver<ScanRequest>>>,
    queued: Mutex<HashMap<String, usize>>,
}

impl ScanQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            queued: Mutex::new(HashMap::new()),
        }
    }

    /// Hand the receiving end to the worker. Only the first call gets it.
    pub(crate) fn take_receiver(&self) -> Option<mpsc::Receiver<ScanRequest>> {
        self.rx.lock().unwrap().take()
    }

    /// Enqueue a run and wait for its terminal result.
    pub async fn request(&self, scanner_id: &str) -> Result<ScanCompletedData, ScanError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.mark_queued(scanner_id);
        self.push(scanner_id, Some(reply_tx)).await?;
        reply_rx.await.map_err(|_| ScanError::QueueClosed)?
    }

    /// Enqueue a scheduled run unless one is already waiting.
    ///
    /// Returns false when the fire was dropped.
    pub async fn request_scheduled(&self, scanner_id: &str) -> Result<bool, ScanError> {
        {
            let mut queued = self.queued.lock().unwrap();
            let count = queued.entry(scanner_id.to_string()).or_insert(0);
            if *count > 0 {
                debug!(scanner_id = %scanner_id, "Scheduled scan already queued");
                return Ok(false);
            }
            *count += 1;
        }
        self.push(scanner_id, None).await?;
        Ok(true)
    }

    pub fn is_queued(&self, scanner_id: &str) -> bool {
        self.queued
            .lock()
            .unwrap()
            .get(scanner_id)
            .is_some_and(|count| *count > 0)
    }

    /// Scanner ids waiting to run, without duplicates.
    pub fn queued_ids(&self) -> Vec<String> {
        let queued = self.queued.lock().unwrap();
        let mut ids: Vec<String> = queued
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Called by the worker when it picks a request up.
    pub(crate) fn mark_started(&self, scanner_id: &str) {
        let mut queued = self.queued.lock().unwrap();
        if let Some(count) = queued.get_mut(scanner_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                queued.remove(scanner_id);
            }
        }
    }

    fn mark_queued(&self, scanner_id: &str) {
        *self
            .queued
            .lock()
            .unwrap()
            .entry(scanner_id.to_string())
            .or_insert(0) += 1;
    }

    async fn push(&self, scanner_id: &str, reply: Option<ScanReply>) -> Result<(), ScanError> {
        let request = ScanRequest {
            scanner_id: scanner_id.to_string(),
            reply,
        };
        if self.tx.send(request).await.is_err() {
            self.mark_started(scanner_id);
            return Err(ScanError::QueueClosed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scheduled_fires_dedupe() {
        let queue = ScanQueue::new(8);
        let mut rx = queue.take_receiver().unwrap();

        assert!(queue.request_scheduled("s1").await.unwrap());
        assert!(!queue.request_scheduled("s1").await.unwrap());
        assert!(queue.request_scheduled("s2").await.unwrap());
        assert_eq!(queue.queued_ids(), vec!["s1".to_string(), "s2".to_string()]);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.scanner_id, "s1");
        queue.mark_started(&first.scanner_id);
        assert!(!queue.is_queued("s1"));

        // Once started, the next fire queues again.
        assert!(queue.request_scheduled("s1").await.unwrap());
    }

    #[tokio::test]
    async fn test_receiver_taken_once() {
        let queue = ScanQueue::new(1);
        assert!(queue.take_receiver().is_some());
        assert!(queue.take_receiver().is_none());
    }

    #[tokio::test]
    async fn test_request_fails_when_worker_gone() {
        let queue = ScanQueue::new(1);
        drop(queue.take_receiver());
        let result = queue.request("s1").await;
        assert!(matches!(result, Err(ScanError::QueueClosed)));
        assert!(!queue.is_queued("s1"));
    }
}
