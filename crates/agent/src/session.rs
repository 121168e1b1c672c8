//! Per-customer turn serialization. Turns from different customers run
//! concurrently; turns from the same customer run strictly in arrival order.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use casona_core::domain::customer::CustomerId;

#[derive(Default)]
pub struct TurnLocks {
    locks: Mutex<HashMap<CustomerId, Arc<Mutex<()>>>>,
}

impl TurnLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the customer's turn lock, creating it on first contact.
    /// The guard is held for the whole turn, so a second message from the
    /// same customer waits until the first one has been answered.
    pub async fn acquire(&self, customer_id: &CustomerId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Guards and waiters each hold an Arc clone; a count of one
            // means nobody is in a turn, so the entry can go.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(customer_id.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    async fn tracked_customers(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use casona_core::domain::customer::CustomerId;

    use super::TurnLocks;

    #[tokio::test]
    async fn same_customer_turns_are_serialized() {
        let locks = Arc::new(TurnLocks::new());
        let customer = CustomerId("1".to_string());

        let guard = locks.acquire(&customer).await;

        let contender = {
            let locks = locks.clone();
            let customer = customer.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&customer).await;
            })
        };

        tokio::task::yield_now().await;
        assert!(!contender.is_finished(), "second turn must wait for the first");

        drop(guard);
        contender.await.expect("contender completes once the lock frees");
    }

    #[tokio::test]
    async fn idle_entries_are_evicted_on_the_next_acquire() {
        let locks = TurnLocks::new();

        let guard = locks.acquire(&CustomerId("1".to_string())).await;
        drop(guard);

        let _held = locks.acquire(&CustomerId("2".to_string())).await;
        assert_eq!(locks.tracked_customers().await, 1, "only the held lock remains");
    }

    #[tokio::test]
    async fn different_customers_do_not_block_each_other() {
        let locks = TurnLocks::new();
        let _first = locks.acquire(&CustomerId("1".to_string())).await;
        // Completes immediately despite the held lock above.
        let _second = locks.acquire(&CustomerId("2".to_string())).await;
    }
}
