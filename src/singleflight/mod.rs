//! Request Coalescing ("singleflight")
//!
//! Suppresses duplicate concurrent work per key. The first caller for a key
//! (the leader) runs the work; callers arriving while it is in flight (the
//! followers) wait and receive a clone of the leader's result.
//!
//! ```text
//!  caller A ──┐                 ┌──▶ result (A)
//!  caller B ──┼─▶ key "Tom" ──▶ │──▶ result (B)   one execution of `func`
//!  caller C ──┘                 └──▶ result (C)
//! ```
//!
//! This is not a cache: once a call completes its record is removed, and the
//! next caller for the key starts a fresh execution.
//!
//! # Cancellation
//!
//! If the leader's future is dropped before it publishes a result, its record
//! is removed and the waiting followers race to lead a new execution with
//! their own work closures. Nobody waits on an abandoned call forever.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

type CallMap<T> = Arc<Mutex<HashMap<String, Call<T>>>>;

/// In-flight call record: the receiving half of a one-shot broadcast.
struct Call<T> {
    id: u64,
    result: watch::Receiver<Option<T>>,
}

/// Coalesces concurrent calls that share a key
pub struct SingleFlight<T> {
    calls: CallMap<T>,
    next_id: AtomicU64,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            calls: Arc::default(),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<T> fmt::Debug for SingleFlight<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &self.calls.lock().len())
            .finish()
    }
}

/// Held by the leader. Dropping it removes the call record before the
/// sender goes away, so woken followers never find a dead record.
struct LeaderGuard<T> {
    key: String,
    id: u64,
    calls: CallMap<T>,
    sender: watch::Sender<Option<T>>,
}

impl<T> LeaderGuard<T> {
    fn publish(self, value: T) {
        self.sender.send_replace(Some(value));
    }
}

impl<T> Drop for LeaderGuard<T> {
    fn drop(&mut self) {
        let mut calls = self.calls.lock();
        // A later generation may already own the key.
        if calls.get(&self.key).is_some_and(|call| call.id == self.id) {
            calls.remove(&self.key);
        }
    }
}

enum Role<T> {
    Leader(LeaderGuard<T>),
    Follower(watch::Receiver<Option<T>>),
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync,
{
    /// Create an empty coalescing group
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `func` for `key` unless a call for `key` is already in flight, in
    /// which case wait for that call and return a clone of its result.
    ///
    /// The returned flag is `true` when this caller shared another caller's
    /// execution instead of running `func`.
    pub async fn work<F, Fut>(&self, key: &str, func: F) -> (T, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        loop {
            match self.join(key) {
                Role::Leader(guard) => {
                    let value = func().await;
                    // Published before the record is removed, so anyone who
                    // joined in between still sees this result.
                    guard.publish(value.clone());
                    return (value, false);
                }
                Role::Follower(mut receiver) => {
                    let published = receiver
                        .wait_for(Option::is_some)
                        .await
                        .ok()
                        .and_then(|value| value.clone());
                    if let Some(value) = published {
                        return (value, true);
                    }
                    // Leader went away without a result; try to lead.
                }
            }
        }
    }

    /// Number of keys with a call in flight
    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }

    fn join(&self, key: &str) -> Role<T> {
        let mut calls = self.calls.lock();
        if let Some(call) = calls.get(key) {
            return Role::Follower(call.result.clone());
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = watch::channel(None);
        calls.insert(
            key.to_string(),
            Call {
                id,
                result: receiver,
            },
        );

        Role::Leader(LeaderGuard {
            key: key.to_string(),
            id,
            calls: Arc::clone(&self.calls),
            sender,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
