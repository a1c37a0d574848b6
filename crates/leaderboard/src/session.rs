use common::types::{Address, LeaderboardSnapshot};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};

use crate::reconciler::{apply_optimistic_delta, ApplyOutcome, OptimisticSettings};

/// Proof that a build was started; completions are applied only for the latest one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildTicket {
    generation: u64,
}

impl BuildTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// In-memory state for one dashboard session.
#[derive(Debug, Default)]
pub struct Session {
    snapshot: Option<LeaderboardSnapshot>,
    loading: bool,
    submitting: bool,
    connected: Option<Address>,
    latest_generation: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub loading: bool,
    pub submitting: bool,
    pub connected: Option<Address>,
    pub generation: u64,
    pub leaderboard: Option<LeaderboardSnapshot>,
}

impl Session {
    pub fn snapshot(&self) -> Option<&LeaderboardSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn connected(&self) -> Option<&Address> {
        self.connected.as_ref()
    }

    pub fn latest_generation(&self) -> u64 {
        self.latest_generation
    }

    pub fn begin_build(&mut self) -> BuildTicket {
        self.latest_generation += 1;
        self.loading = true;
        BuildTicket {
            generation: self.latest_generation,
        }
    }

    /// Replace the snapshot. Returns false, changing nothing, when a newer build
    /// has started since `ticket` was issued.
    pub fn complete_build(&mut self, ticket: BuildTicket, snapshot: LeaderboardSnapshot) -> bool {
        if ticket.generation != self.latest_generation {
            return false;
        }
        self.snapshot = Some(snapshot);
        self.loading = false;
        true
    }

    /// Clear the loading flag after a failed build, keeping the previous snapshot.
    pub fn fail_build(&mut self, ticket: BuildTicket) -> bool {
        if ticket.generation != self.latest_generation {
            return false;
        }
        self.loading = false;
        true
    }

    pub fn connect(&mut self, address: Address) {
        self.connected = Some(address);
    }

    /// Returns false if a batch is already being submitted.
    pub fn begin_play(&mut self) -> bool {
        if self.submitting {
            return false;
        }
        self.submitting = true;
        true
    }

    pub fn finish_play(&mut self) {
        self.submitting = false;
    }

    pub fn apply_optimistic(
        &mut self,
        address: &Address,
        delta: f64,
        settings: &OptimisticSettings,
    ) -> ApplyOutcome {
        match self.snapshot.as_mut() {
            Some(snapshot) => apply_optimistic_delta(snapshot, address, delta, settings),
            None => ApplyOutcome::NotListed,
        }
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            loading: self.loading,
            submitting: self.submitting,
            connected: self.connected.clone(),
            generation: self.latest_generation,
            leaderboard: self.snapshot.clone(),
        }
    }
}

/// Shared handle to a [`Session`]. Each call to [`SessionHandle::with`] is one
/// synchronous transition, so the lock is never held across an await.
#[derive(Debug, Clone, Default)]
pub struct SessionHandle(Arc<Mutex<Session>>);

impl SessionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn view(&self) -> SessionView {
        self.with(|s| s.view())
    }
}

/// An in-progress build. Dropping it without calling [`BuildGuard::complete`] or
/// [`BuildGuard::fail`] fails the build, so a cancelled refresh never leaves
/// `loading` set.
pub struct BuildGuard {
    session: SessionHandle,
    ticket: BuildTicket,
    settled: bool,
}

impl BuildGuard {
    pub fn begin(session: &SessionHandle) -> Self {
        Self {
            ticket: session.with(Session::begin_build),
            session: session.clone(),
            settled: false,
        }
    }

    pub fn ticket(&self) -> BuildTicket {
        self.ticket
    }

    pub fn complete(mut self, snapshot: LeaderboardSnapshot) -> bool {
        self.settled = true;
        let ticket = self.ticket;
        self.session.with(|s| s.complete_build(ticket, snapshot))
    }

    pub fn fail(mut self) -> bool {
        self.settled = true;
        let ticket = self.ticket;
        self.session.with(|s| s.fail_build(ticket))
    }
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        if !self.settled {
            let ticket = self.ticket;
            self.session.with(|s| s.fail_build(ticket));
        }
    }
}

/// Holds the session's `submitting` flag; clears it on drop, including when the
/// owning future is cancelled.
pub struct PlayGuard {
    session: SessionHandle,
}

impl PlayGuard {
    pub fn acquire(session: &SessionHandle) -> Option<Self> {
        session.with(Session::begin_play).then(|| Self {
            session: session.clone(),
        })
    }
}

impl Drop for PlayGuard {
    fn drop(&mut self) {
        self.session.with(Session::finish_play);
    }
}
