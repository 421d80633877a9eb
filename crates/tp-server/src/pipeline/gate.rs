//! Admission gate: caps how many extraction processes run at once.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::deadline::{CancelReason, Deadline};

/// Counting semaphore shared by every request. Waiters are served FIFO.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// One unit of gate capacity. Released when dropped.
#[derive(Debug)]
pub struct AdmissionSlot {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionGate {
    /// A gate admitting at most `capacity` (minimum one) concurrent slots.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> tp_core::Result<AdmissionSlot> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map(|permit| AdmissionSlot { _permit: permit })
            .map_err(|_| tp_core::Error::Internal("admission gate closed".into()))
    }

    /// Wait for a free slot, giving up when `deadline` fires.
    pub async fn acquire_until(&self, deadline: &Deadline) -> Result<AdmissionSlot, CancelReason> {
        tokio::select! {
            slot = self.acquire() => slot.map_err(|_| CancelReason::Shutdown),
            reason = deadline.expired() => Err(reason),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently held.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn caps_concurrency() {
        let gate = AdmissionGate::new(2);
        let a = gate.acquire().await.unwrap();
        let _b = gate.acquire().await.unwrap();
        assert_eq!(gate.in_flight(), 2);

        let third = tokio::time::timeout(Duration::from_millis(50), gate.acquire()).await;
        assert!(third.is_err(), "third acquire should block");

        drop(a);
        assert_eq!(gate.in_flight(), 1);
        let _c = tokio::time::timeout(Duration::from_millis(50), gate.acquire())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(gate.in_flight(), 2);
    }

    #[tokio::test]
    async fn zero_capacity_is_one() {
        let gate = AdmissionGate::new(0);
        assert_eq!(gate.capacity(), 1);
    }

    #[tokio::test]
    async fn acquire_until_times_out_without_leaking() {
        let gate = AdmissionGate::new(1);
        let held = gate.acquire().await.unwrap();

        let root = CancellationToken::new();
        let deadline = Deadline::new(Duration::from_millis(30), &root);
        let res = gate.acquire_until(&deadline).await;
        assert_eq!(res.unwrap_err(), CancelReason::Deadline);
        assert_eq!(gate.in_flight(), 1);

        drop(held);
        assert_eq!(gate.in_flight(), 0);
    }

    #[tokio::test]
    async fn slot_released_when_task_panics() {
        let gate = AdmissionGate::new(1);
        let slot = gate.acquire().await.unwrap();
        let res = tokio::spawn(async move {
            let _slot = slot;
            panic!("pipeline blew up");
        })
        .await;
        assert!(res.is_err());
        assert_eq!(gate.in_flight(), 0);
    }

    #[tokio::test]
    async fn waiters_served_in_order() {
        let gate = AdmissionGate::new(1);
        let held = gate.acquire().await.unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        for i in 0..3 {
            let gate = gate.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let _slot = gate.acquire().await.unwrap();
                tx.send(i).unwrap();
            });
            // Let each waiter enqueue before the next.
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        drop(held);

        let mut order = Vec::new();
        for _ in 0..3 {
            order.push(rx.recv().await.unwrap());
        }
        assert_eq!(order, vec![0, 1, 2]);
    }
}
