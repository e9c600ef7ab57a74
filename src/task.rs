// Keyed fetch tracking for views that reload on parameter changes

use std::sync::Mutex;
use tokio::task::AbortHandle;

/// Identifies one started fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket<K> {
    generation: u64,
    key: K,
}

impl<K> Ticket<K> {
    pub fn key(&self) -> &K {
        &self.key
    }
}

struct Slot<K> {
    generation: u64,
    key: Option<K>,
    handle: Option<AbortHandle>,
}

impl<K: PartialEq> Slot<K> {
    fn holds(&self, ticket: &Ticket<K>) -> bool {
        self.generation == ticket.generation && self.key.as_ref() == Some(&ticket.key)
    }
}

/// Tracks the latest fetch for a view.
///
/// Starting a fetch supersedes the previous one: its task (if attached) is
/// aborted and its result no longer counts as current.
pub struct KeyedTask<K> {
    slot: Mutex<Slot<K>>,
}

impl<K: Clone + PartialEq> KeyedTask<K> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                generation: 0,
                key: None,
                handle: None,
            }),
        }
    }

    pub fn begin(&self, key: K) -> Ticket<K> {
        let mut slot = self.lock();
        if let Some(handle) = slot.handle.take() {
            handle.abort();
        }
        slot.generation += 1;
        slot.key = Some(key.clone());
        Ticket {
            generation: slot.generation,
            key,
        }
    }

    /// Register the task running `ticket` so a later `begin` can abort it
    pub fn attach(&self, ticket: &Ticket<K>, handle: AbortHandle) {
        let mut slot = self.lock();
        if slot.generation == ticket.generation {
            slot.handle = Some(handle);
        } else {
            handle.abort();
        }
    }

    /// Whether a result for `ticket` may still be applied
    pub fn is_current(&self, ticket: &Ticket<K>) -> bool {
        self.lock().holds(ticket)
    }

    /// Mark `ticket` finished; returns whether it was still current
    pub fn finish(&self, ticket: &Ticket<K>) -> bool {
        let mut slot = self.lock();
        let current = slot.holds(ticket);
        if current {
            slot.handle = None;
        }
        current
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slot<K>> {
        // Slot updates cannot panic midway, so a poisoned lock still holds consistent data
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<K: Clone + PartialEq> Default for KeyedTask<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_latest_ticket_is_current() {
        let tasks = KeyedTask::new();
        let first = tasks.begin((1u32, None::<i64>));
        assert!(tasks.is_current(&first));

        let second = tasks.begin((2u32, None));
        assert!(!tasks.is_current(&first));
        assert!(tasks.is_current(&second));
        assert_eq!(second.key(), &(2, None));
    }

    #[test]
    fn test_same_key_restarted_is_not_current() {
        let tasks = KeyedTask::new();
        let first = tasks.begin("page-1");
        let _ = tasks.begin("page-2");
        let third = tasks.begin("page-1");

        assert!(!tasks.is_current(&first));
        assert!(tasks.finish(&third));
    }

    #[tokio::test]
    async fn test_begin_aborts_superseded_task() {
        let tasks = KeyedTask::new();
        let ticket = tasks.begin(1);
        let slow = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        tasks.attach(&ticket, slow.abort_handle());

        let _ = tasks.begin(2);

        let err = slow.await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_attach_after_supersede_aborts_immediately() {
        let tasks = KeyedTask::new();
        let stale = tasks.begin(1);
        let _ = tasks.begin(2);

        let slow = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        tasks.attach(&stale, slow.abort_handle());

        assert!(slow.await.unwrap_err().is_cancelled());
    }
}
