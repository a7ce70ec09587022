//! Durable, at-least-once scheduled job queue.
//!
//! The escalation engine's per-level timeouts and the deduplicator's
//! retry backoff both reduce to the same primitive: "run this job no
//! earlier than time T, and if the worker that claims it dies, someone
//! else must pick it up." This is a durable queue backed by a Redis
//! sorted set, scored by due timestamp, with an in-memory equivalent for
//! tests.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

pub mod payloads;
pub mod topics;

pub use payloads::{EscalationTimeoutJob, NotificationDispatchJob, WorkflowExecutionJob};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job<T> {
    pub id: Uuid,
    pub queue: String,
    pub payload: T,
    pub due_at: DateTime<Utc>,
    pub attempt: u32,
    pub max_attempts: u32,
}

impl<T> Job<T> {
    pub fn new(queue: impl Into<String>, payload: T, due_at: DateTime<Utc>, max_attempts: u32) -> Self {
        Self { id: Uuid::new_v4(), queue: queue.into(), payload, due_at, attempt: 0, max_attempts }
    }

    pub fn exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// Exponential backoff with a fixed base, capped, used to reschedule a
/// job after a transient failure.
pub fn backoff_delay(attempt: u32, base: std::time::Duration, cap: std::time::Duration) -> std::time::Duration {
    let exp = base.saturating_mul(2u32.saturating_pow(attempt.min(16)));
    exp.min(cap)
}

#[async_trait]
pub trait JobQueue<T: Send + Sync + Serialize + DeserializeOwned + 'static>: Send + Sync {
    async fn enqueue(&self, job: Job<T>) -> Result<()>;
    /// Pops every job whose `due_at` has passed, removing it from the
    /// queue. Callers are responsible for re-enqueueing on failure.
    async fn pop_due(&self, queue: &str, now: DateTime<Utc>) -> Result<Vec<Job<T>>>;
    async fn len(&self, queue: &str) -> Result<usize>;
}

pub struct RedisJobQueue {
    client: redis::Client,
    prefix: String,
}

impl RedisJobQueue {
    pub fn new(redis_url: &str, prefix: impl Into<String>) -> Result<Self> {
        Ok(Self { client: redis::Client::open(redis_url)?, prefix: prefix.into() })
    }

    fn key(&self, queue: &str) -> String {
        format!("{}queue:{}", self.prefix, queue)
    }
}

#[async_trait]
impl<T: Send + Sync + Serialize + DeserializeOwned + 'static> JobQueue<T> for RedisJobQueue {
    async fn enqueue(&self, job: Job<T>) -> Result<()> {
        let mut conn = self.client.get_tokio_connection_manager().await?;
        let score = job.due_at.timestamp_millis();
        let member = serde_json::to_string(&job).context("serialize job")?;
        let _: () = conn.zadd(self.key(&job.queue), member, score).await?;
        Ok(())
    }

    async fn pop_due(&self, queue: &str, now: DateTime<Utc>) -> Result<Vec<Job<T>>> {
        let mut conn = self.client.get_tokio_connection_manager().await?;
        let key = self.key(queue);
        let due: Vec<String> = conn.zrangebyscore(&key, 0, now.timestamp_millis()).await?;
        if due.is_empty() {
            return Ok(Vec::new());
        }
        let _: () = conn.zrem(&key, &due).await?;
        due.into_iter()
            .map(|raw| serde_json::from_str(&raw).context("deserialize job"))
            .collect()
    }

    async fn len(&self, queue: &str) -> Result<usize> {
        let mut conn = self.client.get_tokio_connection_manager().await?;
        let count: usize = conn.zcard(self.key(queue)).await?;
        Ok(count)
    }
}

struct HeapEntry<T> {
    job: Job<T>,
}

impl<T> PartialEq for HeapEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.job.due_at == other.job.due_at
    }
}
impl<T> Eq for HeapEntry<T> {}
impl<T> PartialOrd for HeapEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl<T> Ord for HeapEntry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse so the min-heap pops the earliest due_at first.
        other.job.due_at.cmp(&self.job.due_at)
    }
}

/// In-memory job queue for tests: one min-heap per named queue.
pub struct InMemoryJobQueue<T> {
    queues: Mutex<std::collections::HashMap<String, BinaryHeap<HeapEntry<T>>>>,
}

impl<T> Default for InMemoryJobQueue<T> {
    fn default() -> Self {
        Self { queues: Mutex::new(std::collections::HashMap::new()) }
    }
}

impl<T: Send> InMemoryJobQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<T: Send + Sync + Serialize + DeserializeOwned + 'static> JobQueue<T> for InMemoryJobQueue<T> {
    async fn enqueue(&self, job: Job<T>) -> Result<()> {
        let mut queues = self.queues.lock().await;
        queues.entry(job.queue.clone()).or_default().push(HeapEntry { job });
        Ok(())
    }

    async fn pop_due(&self, queue: &str, now: DateTime<Utc>) -> Result<Vec<Job<T>>> {
        let mut queues = self.queues.lock().await;
        let Some(heap) = queues.get_mut(queue) else {
            return Ok(Vec::new());
        };
        let mut due = Vec::new();
        while let Some(entry) = heap.peek() {
            if entry.job.due_at > now {
                break;
            }
            due.push(heap.pop().unwrap().job);
        }
        Ok(due)
    }

    async fn len(&self, queue: &str) -> Result<usize> {
        let queues = self.queues.lock().await;
        Ok(queues.get(queue).map(|h| h.len()).unwrap_or(0))
    }
}

pub type SharedJobQueue<T> = Arc<dyn JobQueue<T>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct TestPayload {
        incident_id: Uuid,
    }

    #[tokio::test]
    async fn pop_due_only_returns_past_jobs_in_due_order() {
        let queue = InMemoryJobQueue::new();
        let now = Utc::now();
        let early = Job::new("timeout", TestPayload { incident_id: Uuid::new_v4() }, now - chrono::Duration::seconds(5), 3);
        let late = Job::new("timeout", TestPayload { incident_id: Uuid::new_v4() }, now + chrono::Duration::hours(1), 3);
        queue.enqueue(late.clone()).await.unwrap();
        queue.enqueue(early.clone()).await.unwrap();

        let due = queue.pop_due("timeout", now).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, early.id);
        assert_eq!(queue.len("timeout").await.unwrap(), 1);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let base = std::time::Duration::from_secs(1);
        let cap = std::time::Duration::from_secs(30);
        assert_eq!(backoff_delay(0, base, cap), std::time::Duration::from_secs(1));
        assert_eq!(backoff_delay(3, base, cap), std::time::Duration::from_secs(8));
        assert_eq!(backoff_delay(10, base, cap), cap);
    }
}
