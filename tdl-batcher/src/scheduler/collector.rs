//! Cuts batches out of the request queue.
//!
//! A batch is ready when it reaches `max_batch_size`, when the queue stays
//! empty for one idle wait, or when the window measured from the first
//! collected request runs out. The first request is always taken.

use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use super::{DownloadRequest, RequestQueue};
use crate::config::SchedulerConfig;

/// Size and time limits for one batch.
#[derive(Debug, Clone, Copy)]
pub struct BatchPolicy {
    pub max_batch_size: usize,
    pub window: Duration,
    pub idle_wait: Duration,
}

impl From<&SchedulerConfig> for BatchPolicy {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            max_batch_size: config.max_batch_size.max(1),
            window: config.batch_window(),
            idle_wait: config.idle_wait(),
        }
    }
}

/// Why collection of a batch stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutReason {
    Full,
    Idle,
    WindowElapsed,
}

/// Requests collected for one dispatch pass, in arrival order.
#[derive(Debug)]
pub struct Batch {
    pub requests: Vec<DownloadRequest>,
    pub started_at: Instant,
    pub ready_at: Instant,
    pub cut_reason: CutReason,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

/// Collect the next batch. `None` when the queue is empty at the start.
pub async fn collect_batch(queue: &RequestQueue, policy: &BatchPolicy) -> Option<Batch> {
    let first = queue.dequeue_front().ok()?;
    let started_at = Instant::now();
    let mut requests = Vec::with_capacity(policy.max_batch_size);
    requests.push(first);

    let cut_reason = loop {
        if requests.len() >= policy.max_batch_size {
            break CutReason::Full;
        }

        let elapsed = started_at.elapsed();
        if elapsed >= policy.window {
            break CutReason::WindowElapsed;
        }

        match queue.dequeue_front() {
            Ok(request) => requests.push(request),
            Err(_) => {
                let slice = policy.idle_wait.min(policy.window - elapsed);
                trace!(collected = requests.len(), ?slice, "queue empty, waiting for arrivals");
                if !queue.wait_for_arrival(slice).await {
                    break if started_at.elapsed() >= policy.window {
                        CutReason::WindowElapsed
                    } else {
                        CutReason::Idle
                    };
                }
            }
        }
    };

    Some(Batch {
        requests,
        started_at,
        ready_at: Instant::now(),
        cut_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn policy() -> BatchPolicy {
        BatchPolicy::from(&SchedulerConfig::default())
    }

    fn request(n: usize) -> DownloadRequest {
        DownloadRequest::new(format!("https://t.me/c/{n}"), "c", None)
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_queue_yields_nothing() {
        let queue = RequestQueue::new();
        assert!(collect_batch(&queue, &policy()).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cut_at_size_cap() {
        let queue = RequestQueue::new();
        for n in 0..25 {
            queue.enqueue(request(n));
        }

        let batch = collect_batch(&queue, &policy()).await.unwrap();
        assert_eq!(batch.len(), 20);
        assert_eq!(batch.cut_reason, CutReason::Full);
        assert_eq!(queue.len(), 5);
        assert_eq!(batch.requests[0].source(), "https://t.me/c/0");
        assert_eq!(batch.requests[19].source(), "https://t.me/c/19");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cut_after_idle_wait() {
        let queue = RequestQueue::new();
        queue.enqueue(request(0));
        queue.enqueue(request(1));

        let batch = collect_batch(&queue, &policy()).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.cut_reason, CutReason::Idle);
        let waited = batch.ready_at - batch.started_at;
        assert!(waited >= Duration::from_secs(1));
        assert!(waited < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_arrival_joins_batch() {
        let queue = Arc::new(RequestQueue::new());
        queue.enqueue(request(0));

        let producer = {
            let queue = queue.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(500)).await;
                queue.enqueue(request(1));
            })
        };

        let batch = collect_batch(&queue, &policy()).await.unwrap();
        producer.await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.requests[1].source(), "https://t.me/c/1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_bounds_a_steady_trickle() {
        let queue = Arc::new(RequestQueue::new());
        queue.enqueue(request(0));

        let producer = {
            let queue = queue.clone();
            tokio::spawn(async move {
                for n in 1..10 {
                    tokio::time::sleep(Duration::from_millis(700)).await;
                    queue.enqueue(request(n));
                }
            })
        };

        let batch = collect_batch(&queue, &policy()).await.unwrap();
        assert_eq!(batch.cut_reason, CutReason::WindowElapsed);
        assert!(batch.ready_at - batch.started_at <= Duration::from_secs(3));
        assert!(batch.len() < 10);
        producer.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_takes_first_request() {
        let queue = RequestQueue::new();
        queue.enqueue(request(0));
        let policy = BatchPolicy {
            max_batch_size: 1,
            window: Duration::from_millis(1),
            idle_wait: Duration::from_millis(1),
        };

        let batch = collect_batch(&queue, &policy).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.cut_reason, CutReason::Full);
    }
}
