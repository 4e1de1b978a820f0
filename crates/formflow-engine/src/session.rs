// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Execution sessions: the cancellation and timeout domain of a submission.
//!
//! Every submission acquires a [`SessionLease`] from the
//! [`ExecutionSessionManager`]. The lease carries the cancellation token the
//! interpreter polls, and finishes the session when dropped. A nested
//! submission joins its caller's session through
//! [`ExecutionSessionManager::join_execution`] (or, without a known caller,
//! the active session via [`StartOptions::allow_nested_reuse`]); the session
//! is torn down only when its last lease (foreground or background) is
//! released.
//!
//! ```ignore
//! let manager = ExecutionSessionManager::global();
//! let lease = manager.start_execution(true, 90, StartOptions::default());
//! let outcome = execute(&form.actions, &mut ctx_with(lease.token().clone())).await;
//! drop(lease); // finishes the session
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use once_cell::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Process-wide manager for hosts that have a single execution context.
static GLOBAL: OnceCell<ExecutionSessionManager> = OnceCell::new();

/// Identifier of one execution session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Options for [`ExecutionSessionManager::start_execution`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StartOptions {
    /// Join the active session, if any, instead of starting a new one
    pub allow_nested_reuse: bool,
}

/// Snapshot of one live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    /// Outstanding foreground and background leases
    pub ref_count: usize,
    pub timed_out: bool,
}

struct Session {
    token: CancellationToken,
    refs: usize,
    timed_out: Arc<AtomicBool>,
    /// Cancels the deadline task, if one was armed
    disarm: Option<CancellationToken>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    sessions: BTreeMap<SessionId, Session>,
    /// Session that nested submissions may join
    active: Option<SessionId>,
}

/// Hands out and tracks execution sessions.
///
/// Cloning is cheap; clones share the same sessions.
#[derive(Clone, Default)]
pub struct ExecutionSessionManager {
    state: Arc<Mutex<State>>,
}

impl fmt::Debug for ExecutionSessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionSessionManager")
            .field("sessions", &self.session_count())
            .finish()
    }
}

impl ExecutionSessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide manager, created on first use.
    pub fn global() -> &'static ExecutionSessionManager {
        GLOBAL.get_or_init(ExecutionSessionManager::new)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // State stays consistent across a panicking holder: every mutation
        // is a single insert, remove or counter update.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start (or join) an execution session.
    ///
    /// With `enable_timeout` and a non-zero `timeout_threshold_secs`, a new
    /// session is cancelled once the threshold elapses unless it has finished
    /// by then. A joined session keeps the deadline of the session it joins.
    pub fn start_execution(
        &self,
        enable_timeout: bool,
        timeout_threshold_secs: u64,
        options: StartOptions,
    ) -> SessionLease {
        let mut state = self.lock();

        if options.allow_nested_reuse
            && let Some(id) = state.active
            && let Some(session) = state.sessions.get_mut(&id)
        {
            session.refs += 1;
            debug!(session_id = %id, refs = session.refs, "Execution session joined");
            return SessionLease {
                guard: LeaseGuard::new(self.clone(), id),
                token: session.token.clone(),
                timed_out: session.timed_out.clone(),
                reused: true,
            };
        }

        state.next_id += 1;
        let id = SessionId(state.next_id);
        let token = CancellationToken::new();
        let timed_out = Arc::new(AtomicBool::new(false));
        let disarm = (enable_timeout && timeout_threshold_secs > 0)
            .then(|| {
                arm_deadline(
                    id,
                    Duration::from_secs(timeout_threshold_secs),
                    token.clone(),
                    timed_out.clone(),
                )
            })
            .flatten();

        state.sessions.insert(
            id,
            Session {
                token: token.clone(),
                refs: 1,
                timed_out: timed_out.clone(),
                disarm,
            },
        );
        state.active = Some(id);
        debug!(
            session_id = %id,
            timeout_enabled = enable_timeout,
            timeout_secs = timeout_threshold_secs,
            "Execution session started"
        );

        SessionLease {
            guard: LeaseGuard::new(self.clone(), id),
            token,
            timed_out,
            reused: false,
        }
    }

    /// Join the live session `id`, counting one more reference on it.
    ///
    /// Returns `None` when that session has already finished.
    pub fn join_execution(&self, id: SessionId) -> Option<SessionLease> {
        let mut state = self.lock();
        let session = state.sessions.get_mut(&id)?;
        session.refs += 1;
        debug!(session_id = %id, refs = session.refs, "Execution session joined");
        Some(SessionLease {
            guard: LeaseGuard::new(self.clone(), id),
            token: session.token.clone(),
            timed_out: session.timed_out.clone(),
            reused: true,
        })
    }

    /// Keep `lease`'s session alive for work that outlives the foreground
    /// submission. The session finishes once the returned lease is handed to
    /// [`on_background_execution_finish`](Self::on_background_execution_finish)
    /// (or dropped) and every other lease is released.
    pub fn on_background_execution_start(&self, lease: &SessionLease) -> BackgroundLease {
        let id = lease.session_id();
        let mut state = self.lock();
        match state.sessions.get_mut(&id) {
            Some(session) => {
                session.refs += 1;
                debug!(session_id = %id, refs = session.refs, "Background execution started");
                BackgroundLease {
                    guard: LeaseGuard::new(self.clone(), id),
                    token: session.token.clone(),
                }
            }
            None => {
                // Only reachable through a lease from another manager
                warn!(session_id = %id, "Background execution for unknown session");
                BackgroundLease {
                    guard: LeaseGuard::released(self.clone(), id),
                    token: lease.token.clone(),
                }
            }
        }
    }

    /// Release a background lease.
    pub fn on_background_execution_finish(&self, lease: BackgroundLease) {
        debug!(session_id = %lease.guard.id, "Background execution finished");
        drop(lease);
    }

    /// Cancel the session nested submissions would join. Returns `false`
    /// when no session is active.
    pub fn cancel_active(&self) -> bool {
        let state = self.lock();
        let Some(session) = state.active.and_then(|id| state.sessions.get(&id)) else {
            return false;
        };
        session.token.cancel();
        true
    }

    pub fn active_session(&self) -> Option<SessionInfo> {
        let state = self.lock();
        let id = state.active?;
        state.sessions.get(&id).map(|s| SessionInfo {
            id,
            ref_count: s.refs,
            timed_out: s.timed_out.load(Ordering::SeqCst),
        })
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Whether the session's deadline fired. `false` for finished sessions.
    pub fn timed_out(&self, id: SessionId) -> bool {
        self.lock()
            .sessions
            .get(&id)
            .is_some_and(|s| s.timed_out.load(Ordering::SeqCst))
    }

    fn release(&self, id: SessionId) {
        let mut state = self.lock();
        let Some(session) = state.sessions.get_mut(&id) else {
            return;
        };
        session.refs = session.refs.saturating_sub(1);
        if session.refs > 0 {
            debug!(session_id = %id, refs = session.refs, "Execution session released");
            return;
        }

        if let Some(session) = state.sessions.remove(&id)
            && let Some(disarm) = session.disarm
        {
            disarm.cancel();
        }
        if state.active == Some(id) {
            state.active = state.sessions.keys().next_back().copied();
        }
        debug!(session_id = %id, "Execution session finished");
    }
}

/// Spawn the deadline task. Returns the disarm token, or `None` outside a
/// Tokio runtime.
fn arm_deadline(
    id: SessionId,
    threshold: Duration,
    token: CancellationToken,
    timed_out: Arc<AtomicBool>,
) -> Option<CancellationToken> {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        warn!(session_id = %id, "No runtime available, execution timeout disabled");
        return None;
    };
    let disarm = CancellationToken::new();
    let disarmed = disarm.clone();

    handle.spawn(async move {
        tokio::select! {
            biased;

            _ = disarmed.cancelled() => {}
            _ = token.cancelled() => {}
            _ = tokio::time::sleep(threshold) => {
                warn!(
                    session_id = %id,
                    threshold_secs = threshold.as_secs(),
                    "Execution timed out, cancelling"
                );
                timed_out.store(true, Ordering::SeqCst);
                token.cancel();
            }
        }
    });
    Some(disarm)
}

/// Releases one reference on drop, exactly once.
struct LeaseGuard {
    manager: ExecutionSessionManager,
    id: SessionId,
    released: bool,
}

impl LeaseGuard {
    fn new(manager: ExecutionSessionManager, id: SessionId) -> Self {
        Self {
            manager,
            id,
            released: false,
        }
    }

    fn released(manager: ExecutionSessionManager, id: SessionId) -> Self {
        Self {
            manager,
            id,
            released: true,
        }
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if !std::mem::replace(&mut self.released, true) {
            self.manager.release(self.id);
        }
    }
}

/// Foreground handle on an execution session. Dropping it finishes the
/// caller's part of the session.
pub struct SessionLease {
    guard: LeaseGuard,
    token: CancellationToken,
    timed_out: Arc<AtomicBool>,
    reused: bool,
}

impl SessionLease {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn session_id(&self) -> SessionId {
        self.guard.id
    }

    /// Whether this lease joined an already running session.
    pub fn is_reused(&self) -> bool {
        self.reused
    }

    pub fn timed_out(&self) -> bool {
        self.timed_out.load(Ordering::SeqCst)
    }

    /// Finish explicitly. Equivalent to dropping the lease.
    pub fn finish(self) {}
}

impl fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLease")
            .field("session_id", &self.guard.id)
            .field("reused", &self.reused)
            .finish()
    }
}

/// Handle keeping a session alive for detached background work.
pub struct BackgroundLease {
    guard: LeaseGuard,
    token: CancellationToken,
}

impl BackgroundLease {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn session_id(&self) -> SessionId {
        self.guard.id
    }
}

impl fmt::Debug for BackgroundLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundLease")
            .field("session_id", &self.guard.id)
            .finish()
    }
}
