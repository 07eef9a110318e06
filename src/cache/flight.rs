//! Single-flight coalescing for cache fills.
//!
//! The first caller for a key becomes the leader and runs the fill; later
//! callers become waiters and receive the leader's outcome over one-shot
//! channels. The leader holds a guard so that even an abandoned fill (the
//! leader's request was cancelled mid-flight) releases the key and fails
//! the waiters instead of wedging them forever.

use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use tokio::sync::oneshot;

use super::CacheError;

type Outcome = Result<Bytes, CacheError>;
type Waiters = Vec<oneshot::Sender<Outcome>>;

pub(crate) struct FlightGroup {
    inflight: Arc<DashMap<String, Waiters>>,
}

pub(crate) enum Flight {
    Leader(LeaderGuard),
    Waiter(oneshot::Receiver<Outcome>),
}

impl FlightGroup {
    pub(crate) fn new() -> Self {
        Self {
            inflight: Arc::new(DashMap::new()),
        }
    }

    pub(crate) fn join(&self, key: &str) -> Flight {
        match self.inflight.entry(key.to_string()) {
            Entry::Vacant(vacant) => {
                vacant.insert(Vec::new());
                Flight::Leader(LeaderGuard {
                    inflight: Arc::clone(&self.inflight),
                    key: key.to_string(),
                    completed: false,
                })
            }
            Entry::Occupied(mut occupied) => {
                let (tx, rx) = oneshot::channel();
                occupied.get_mut().push(tx);
                Flight::Waiter(rx)
            }
        }
    }
}

pub(crate) struct LeaderGuard {
    inflight: Arc<DashMap<String, Waiters>>,
    key: String,
    completed: bool,
}

impl LeaderGuard {
    /// Publish the fill outcome to every waiter and release the key.
    pub(crate) fn complete(mut self, outcome: Outcome) {
        self.completed = true;
        notify(&self.inflight, &self.key, outcome);
    }
}

impl Drop for LeaderGuard {
    fn drop(&mut self) {
        if !self.completed {
            notify(&self.inflight, &self.key, Err(CacheError::Abandoned));
        }
    }
}

fn notify(inflight: &DashMap<String, Waiters>, key: &str, outcome: Outcome) {
    if let Some((_, waiters)) = inflight.remove(key) {
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn waiters_receive_the_leader_outcome() {
        let group = FlightGroup::new();
        let Flight::Leader(guard) = group.join("k") else {
            panic!("first caller must lead");
        };
        let Flight::Waiter(rx) = group.join("k") else {
            panic!("second caller must wait");
        };

        guard.complete(Ok(Bytes::from_static(b"value")));
        assert_eq!(rx.await.unwrap().unwrap(), Bytes::from_static(b"value"));
    }

    #[tokio::test]
    async fn key_is_released_after_completion() {
        let group = FlightGroup::new();
        let Flight::Leader(guard) = group.join("k") else {
            panic!("first caller must lead");
        };
        guard.complete(Ok(Bytes::new()));

        assert!(matches!(group.join("k"), Flight::Leader(_)));
    }

    #[tokio::test]
    async fn dropped_leader_fails_waiters_instead_of_wedging_them() {
        let group = FlightGroup::new();
        let Flight::Leader(guard) = group.join("k") else {
            panic!("first caller must lead");
        };
        let Flight::Waiter(rx) = group.join("k") else {
            panic!("second caller must wait");
        };

        drop(guard);
        assert!(matches!(rx.await.unwrap(), Err(CacheError::Abandoned)));
        assert!(matches!(group.join("k"), Flight::Leader(_)));
    }
}
