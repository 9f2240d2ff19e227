use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Serializes the decoding of one source path across concurrent imports, without serializing anything else.
/// Entries only hold weak references, so a path's lock is gone as soon as nobody decodes or waits for it anymore.
/// Expired entries are pruned whenever the map would have to grow.
pub(crate) struct DecodeGate {
    locks: DashMap<String, Weak<Mutex<()>>>,
}

impl DecodeGate {
    pub fn new() -> Self {
        Self {
            locks: DashMap::with_capacity(32),
        }
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        if let Some(weak) = self.locks.get(key)
            && let Some(arc) = weak.upgrade()
        {
            return arc;
        }

        // Would have to allocate after the next insert.
        if self.locks.capacity() == self.locks.len() {
            self.locks.retain(|_, weak| weak.strong_count() > 0);
        }

        let mut entry = self.locks.entry(key.to_string()).or_default();
        match entry.upgrade() {
            Some(arc) => arc, // maybe we have been raced
            None => {
                let arc = Arc::new(Mutex::new(()));
                *entry = Arc::downgrade(&arc);
                arc
            }
        }
    }

    /// Waits until no other import is decoding `key`. The returned guard keeps the gate closed.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        self.lock_for(key).lock_owned().await
    }

    pub fn tracked_keys(&self) -> usize {
        self.locks.iter().filter(|entry| entry.strong_count() > 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_waits_for_the_first() {
        let gate = Arc::new(DecodeGate::new());
        let guard = gate.acquire("a.png").await;
        assert_eq!(gate.tracked_keys(), 1);

        let other = gate.clone();
        let waiter = tokio::spawn(async move {
            let _guard = other.acquire("a.png").await;
        });
        // other keys are not affected
        drop(gate.acquire("b.png").await);

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.await.unwrap();
        assert_eq!(gate.tracked_keys(), 0);
    }
}
