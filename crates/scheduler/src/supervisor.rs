//! Lifecycle owner for per-user pollers.
//!
//! The supervisor keeps one handle per running poller in a table guarded by
//! a plain mutex. Every start and stop goes through that table, and the lock
//! is never held across an await, so concurrent lifecycle calls for the same
//! user serialize and leave at most one live poller behind.
//!
//! Stopping a poller only cancels its token. The task finishes whatever
//! cycle it is in and exits at its next wait point; a replacement for the
//! same user waits on the per-user cycle lock before its first cycle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use jobwatch_core::UserKey;
use jobwatch_store::StoreError;

use crate::poller::{self, PollerDeps};

struct PollerHandle {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl PollerHandle {
    fn is_live(&self) -> bool {
        !self.stop.is_cancelled() && !self.task.is_finished()
    }
}

#[derive(Default)]
struct Registry {
    running: HashMap<UserKey, PollerHandle>,
    cycle_locks: HashMap<UserKey, Arc<tokio::sync::Mutex<()>>>,
    shut_down: bool,
}

/// Starts, stops and restarts pollers in response to user lifecycle events.
pub struct Supervisor {
    deps: PollerDeps,
    registry: Mutex<Registry>,
}

impl Supervisor {
    pub fn new(deps: PollerDeps) -> Self {
        Self {
            deps,
            registry: Mutex::new(Registry::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Spawn a poller for `user` unless a live one exists. Returns whether a
    /// new poller was started.
    fn start_locked(&self, registry: &mut Registry, user: UserKey) -> bool {
        if registry.shut_down {
            debug!(user = %user, "Supervisor shut down, not starting poller");
            return false;
        }
        if registry.running.get(&user).is_some_and(PollerHandle::is_live) {
            return false;
        }

        let cycle_lock = registry.cycle_locks.entry(user).or_default().clone();
        let stop = CancellationToken::new();
        let task = tokio::spawn(poller::run(user, self.deps.clone(), cycle_lock, stop.clone()));
        registry.running.insert(user, PollerHandle { stop, task });
        true
    }

    fn stop_locked(registry: &mut Registry, user: UserKey) -> bool {
        match registry.running.remove(&user) {
            Some(handle) => {
                handle.stop.cancel();
                true
            }
            None => false,
        }
    }

    /// The user became active (`/start`, resume). No-op if already running.
    pub fn on_user_activated(&self, user: UserKey) -> bool {
        let started = self.start_locked(&mut self.lock(), user);
        if started {
            info!(user = %user, "Poller scheduled");
        }
        started
    }

    /// The user paused alerts. Any in-flight cycle completes.
    pub fn on_user_paused(&self, user: UserKey) -> bool {
        let stopped = Self::stop_locked(&mut self.lock(), user);
        if stopped {
            info!(user = %user, "Poller stopping, user paused");
        }
        stopped
    }

    /// The user can no longer be reached. Any in-flight cycle completes.
    pub fn on_user_disabled(&self, user: UserKey) -> bool {
        let stopped = Self::stop_locked(&mut self.lock(), user);
        if stopped {
            info!(user = %user, "Poller stopping, user disabled");
        }
        stopped
    }

    /// Restart the user's poller so it picks up the new interval. Does not
    /// start one for a user that has none running.
    pub fn on_interval_changed(&self, user: UserKey) -> bool {
        let mut registry = self.lock();
        if !Self::stop_locked(&mut registry, user) {
            return false;
        }
        let restarted = self.start_locked(&mut registry, user);
        drop(registry);
        if restarted {
            info!(user = %user, "Poller restarted with new interval");
        }
        restarted
    }

    /// Start a poller for every active user in the store.
    pub async fn on_process_start(&self) -> Result<usize, StoreError> {
        let users = self.deps.store.list_active_users().await?;
        let mut started = 0;
        {
            let mut registry = self.lock();
            for user in &users {
                if self.start_locked(&mut registry, *user) {
                    started += 1;
                }
            }
        }
        info!(active = users.len(), started, "Pollers started for active users");
        Ok(started)
    }

    /// Cancel every poller and wait for in-flight cycles to finish. Later
    /// activation calls are ignored.
    pub async fn shutdown(&self) {
        let handles: Vec<(UserKey, PollerHandle)> = {
            let mut registry = self.lock();
            registry.shut_down = true;
            registry.running.drain().collect()
        };

        info!(count = handles.len(), "Stopping pollers");
        for (_, handle) in &handles {
            handle.stop.cancel();
        }
        for (user, handle) in handles {
            if let Err(e) = handle.task.await {
                warn!(user = %user, error = %e, "Poller task ended abnormally");
            }
        }
    }

    pub fn is_running(&self, user: UserKey) -> bool {
        self.lock().running.get(&user).is_some_and(PollerHandle::is_live)
    }

    pub fn running_users(&self) -> Vec<UserKey> {
        let mut users: Vec<UserKey> = self
            .lock()
            .running
            .iter()
            .filter(|(_, handle)| handle.is_live())
            .map(|(user, _)| *user)
            .collect();
        users.sort();
        users
    }

    /// Number of live pollers.
    pub fn live_count(&self) -> usize {
        self.lock().running.values().filter(|h| h.is_live()).count()
    }
}
