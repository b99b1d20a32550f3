//! Registry of named queues.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use ractor::{Actor, ActorRef};
use throttle_core::ThrottleEvent;
use tokio::sync::{Mutex, broadcast};

use crate::error::{ThrottleError, ThrottleResult};
use crate::executor::Executor;
use crate::messages::QueueMessage;
use crate::queue_actor::{QueueActor, QueueActorState, QueueShared};

/// One registered queue: its actor plus state shared with it.
#[derive(Debug)]
pub struct QueueEntry {
    name: String,
    actor: ActorRef<QueueMessage>,
    shared: Arc<QueueShared>,
    /// Callers currently submitting to or draining this queue.
    leases: AtomicUsize,
    /// The subset of `leases` that are draining.
    drainers: AtomicUsize,
}

impl QueueEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn actor(&self) -> &ActorRef<QueueMessage> {
        &self.actor
    }

    pub fn shared(&self) -> &QueueShared {
        &self.shared
    }

    pub fn occupancy(&self) -> usize {
        self.shared.occupancy()
    }
}

/// A caller's claim on a registry entry.
///
/// Entries are only deleted while every lease holder is draining, so a
/// submitter never sees its queue vanish mid-admission.
#[derive(Debug)]
pub struct QueueLease {
    entry: Arc<QueueEntry>,
    draining: bool,
}

impl QueueLease {
    fn new(entry: Arc<QueueEntry>) -> Self {
        entry.leases.fetch_add(1, Ordering::SeqCst);
        Self {
            entry,
            draining: false,
        }
    }

    pub fn entry(&self) -> &QueueEntry {
        &self.entry
    }

    /// Mark this holder as a drainer; it will not admit any more work.
    pub fn start_draining(&mut self) {
        if !self.draining {
            self.draining = true;
            self.entry.drainers.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for QueueLease {
    fn drop(&mut self) {
        if self.draining {
            self.entry.drainers.fetch_sub(1, Ordering::SeqCst);
        }
        self.entry.leases.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Mapping from queue name to queue actor, owned by a `JobThrottle`.
pub struct QueueRegistry {
    queues: Mutex<HashMap<String, Arc<QueueEntry>>>,
    executor: Arc<dyn Executor>,
    event_tx: broadcast::Sender<ThrottleEvent>,
}

impl QueueRegistry {
    /// Create a new empty registry.
    pub fn new(executor: Arc<dyn Executor>, event_tx: broadcast::Sender<ThrottleEvent>) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            executor,
            event_tx,
        }
    }

    /// Lease a queue, creating its entry and actor on first use.
    pub async fn acquire(&self, name: &str) -> ThrottleResult<QueueLease> {
        let mut queues = self.queues.lock().await;
        if let Some(entry) = queues.get(name) {
            return Ok(QueueLease::new(entry.clone()));
        }

        let shared = Arc::new(QueueShared::default());
        let state = QueueActorState::new(
            name,
            shared.clone(),
            self.executor.clone(),
            self.event_tx.clone(),
        );
        let (actor, _handle) = Actor::spawn(None, QueueActor, state)
            .await
            .map_err(|e| ThrottleError::Actor(format!("Failed to spawn queue '{}': {}", name, e)))?;

        let entry = Arc::new(QueueEntry {
            name: name.to_string(),
            actor,
            shared,
            leases: AtomicUsize::new(0),
            drainers: AtomicUsize::new(0),
        });
        queues.insert(name.to_string(), entry.clone());
        let _ = self.event_tx.send(ThrottleEvent::QueueCreated {
            queue: name.to_string(),
            timestamp: Utc::now(),
        });

        Ok(QueueLease::new(entry))
    }

    /// Lease an existing queue without creating one.
    pub async fn attach(&self, name: &str) -> Option<QueueLease> {
        let queues = self.queues.lock().await;
        queues.get(name).cloned().map(QueueLease::new)
    }

    /// Get a queue entry by name.
    pub async fn get(&self, name: &str) -> Option<Arc<QueueEntry>> {
        self.queues.lock().await.get(name).cloned()
    }

    /// Delete the leased entry if it is empty and every holder is draining.
    ///
    /// Returns whether the entry was removed. A removed entry admits no more
    /// work, but its actor keeps running: the caller collects any outcomes a
    /// concurrent reap left behind, then stops it.
    pub async fn remove_if_drained(&self, lease: &QueueLease) -> bool {
        let mut queues = self.queues.lock().await;
        let entry = &lease.entry;

        let current = queues
            .get(&entry.name)
            .is_some_and(|registered| Arc::ptr_eq(registered, entry));
        // Leases are only taken under this lock, so no submitter can appear now.
        let only_drainers =
            entry.leases.load(Ordering::SeqCst) == entry.drainers.load(Ordering::SeqCst);
        if !current || !lease.draining || !only_drainers || entry.occupancy() != 0 {
            return false;
        }

        queues.remove(&entry.name);
        true
    }

    /// Check whether `entry` is still the registered entry for its name.
    pub async fn is_registered(&self, entry: &QueueEntry) -> bool {
        self.queues
            .lock()
            .await
            .get(&entry.name)
            .is_some_and(|registered| std::ptr::eq(Arc::as_ptr(registered), entry))
    }

    /// Check whether a queue is registered.
    pub async fn contains(&self, name: &str) -> bool {
        self.queues.lock().await.contains_key(name)
    }

    /// List all registered queue names.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Stop every queue actor and forget all entries.
    pub async fn clear(&self) -> usize {
        let mut queues = self.queues.lock().await;
        let count = queues.len();
        for (_, entry) in queues.drain() {
            entry.actor.stop(None);
        }
        count
    }
}

impl std::fmt::Debug for QueueRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueRegistry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use super::*;
    use crate::executor::TokioExecutor;
    use std::error::Error;

    fn registry() -> QueueRegistry {
        let (event_tx, _) = broadcast::channel(16);
        QueueRegistry::new(Arc::new(TokioExecutor::new()), event_tx)
    }

    #[tokio::test]
    async fn entry_survives_while_a_submitter_holds_it() -> Result<(), Box<dyn Error>> {
        let registry = registry();
        let submitter = registry.acquire("shared").await?;
        let mut drainer = registry.attach("shared").await.ok_or("queue missing")?;
        drainer.start_draining();

        assert!(!registry.remove_if_drained(&drainer).await);
        assert!(registry.contains("shared").await);

        drop(submitter);
        assert!(registry.remove_if_drained(&drainer).await);
        assert!(!registry.contains("shared").await);
        assert!(!registry.is_registered(drainer.entry()).await);
        drainer.entry().actor().stop(None);
        Ok(())
    }

    #[tokio::test]
    async fn only_draining_holders_remove() -> Result<(), Box<dyn Error>> {
        let registry = registry();
        let lease = registry.acquire("solo").await?;
        assert!(!registry.remove_if_drained(&lease).await);
        assert_eq!(registry.names().await, vec!["solo".to_string()]);
        assert_eq!(registry.clear().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn removed_name_gets_a_fresh_entry() -> Result<(), Box<dyn Error>> {
        let registry = registry();
        let mut first = registry.acquire("q").await?;
        let mut second = registry.acquire("q").await?;
        assert!(std::ptr::eq(first.entry(), second.entry()));

        first.start_draining();
        second.start_draining();
        assert!(registry.remove_if_drained(&first).await);
        assert!(!registry.remove_if_drained(&second).await);

        let fresh = registry.acquire("q").await?;
        assert!(!std::ptr::eq(first.entry(), fresh.entry()));
        assert!(registry.is_registered(fresh.entry()).await);
        assert!(!registry.is_registered(first.entry()).await);
        first.entry().actor().stop(None);
        registry.clear().await;
        Ok(())
    }
}
