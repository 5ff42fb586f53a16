// src/guard/barrier.rs

//! Kill ⇄ memdump coordination.
//!
//! Every accepted memory dump request holds a [`DumpTicket`] for its GUID
//! until the dump finishes, whatever the outcome. A pending kill waits for
//! the GUID's outstanding ticket count to reach zero, bounded by a timeout.

use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::watch;

#[derive(Debug, Default)]
pub struct DumpBarrier {
    pending: Mutex<HashMap<String, watch::Sender<usize>>>,
}

/// One outstanding memory dump. Dropping it marks the dump settled.
#[derive(Debug)]
pub struct DumpTicket {
    barrier: Arc<DumpBarrier>,
    guid:    String,
}

impl DumpBarrier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn begin(self: &Arc<Self>, guid: &str) -> DumpTicket {
        self.pending
            .lock()
            .entry(guid.to_string())
            .or_insert_with(|| watch::channel(0).0)
            .send_modify(|n| *n += 1);
        DumpTicket { barrier: Arc::clone(self), guid: guid.to_string() }
    }

    pub fn outstanding(&self, guid: &str) -> usize {
        self.pending.lock().get(guid).map_or(0, |tx| *tx.borrow())
    }

    /// Wait until no dump is outstanding for `guid`.
    /// Returns `false` when `timeout` elapsed first.
    pub async fn settled(&self, guid: &str, timeout: Duration) -> bool {
        let mut rx = match self.pending.lock().get(guid) {
            Some(tx) => tx.subscribe(),
            None => return true,
        };
        match tokio::time::timeout(timeout, rx.wait_for(|n| *n == 0)).await {
            Ok(_) => true,
            Err(_) => false,
        }
    }

    /// Drop all state for a GUID; waiters are released.
    pub fn forget(&self, guid: &str) {
        self.pending.lock().remove(guid);
    }

    fn finish(&self, guid: &str) {
        let mut pending = self.pending.lock();
        if let Some(tx) = pending.get(guid) {
            tx.send_modify(|n| *n = n.saturating_sub(1));
            if *tx.borrow() == 0 && tx.receiver_count() == 0 {
                pending.remove(guid);
            }
        }
    }
}

impl Drop for DumpTicket {
    fn drop(&mut self) {
        self.barrier.finish(&self.guid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn nothing_pending_settles_immediately() {
        let b = DumpBarrier::new();
        assert!(b.settled("{G}", Duration::from_millis(1)).await);
    }

    #[tokio::test]
    async fn waits_for_last_ticket() {
        let b = DumpBarrier::new();
        let t1 = b.begin("{G}");
        let t2 = b.begin("{G}");
        assert_eq!(b.outstanding("{G}"), 2);

        let waiter = {
            let b = Arc::clone(&b);
            tokio::spawn(async move { b.settled("{G}", Duration::from_secs(5)).await })
        };
        drop(t1);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(t2);
        assert!(waiter.await.unwrap());
        assert_eq!(b.outstanding("{G}"), 0);
    }

    #[tokio::test]
    async fn times_out_when_dump_hangs() {
        let b = DumpBarrier::new();
        let _ticket = b.begin("{G}");
        let start = Instant::now();
        assert!(!b.settled("{G}", Duration::from_millis(50)).await);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn forget_releases_waiters() {
        let b = DumpBarrier::new();
        let _ticket = b.begin("{G}");
        let waiter = {
            let b = Arc::clone(&b);
            tokio::spawn(async move { b.settled("{G}", Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        b.forget("{G}");
        assert!(waiter.await.unwrap());
    }
}
