//! Per-agent chain locks

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Map size above which idle entries are dropped on the next acquire
const PRUNE_AT: usize = 256;

/// One async mutex per agent, serializing reads and appends of that agent's
/// chain tail. Different agents never wait on each other.
///
/// An entry is idle when the map holds the only reference to it, meaning no
/// task owns or awaits the lock. Idle entries are pruned once the map grows
/// past `PRUNE_AT`.
#[derive(Default)]
pub struct AgentLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl AgentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and take the agent's lock; released when the guard drops
    pub async fn acquire(&self, agent_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            if locks.len() >= PRUNE_AT {
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks
                .entry(agent_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Number of agents currently tracked
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
