//! Batch supersession: only the newest browse batch may do expensive work.
//!
//! A batch is one screen of thumbnails. Every call of a batch carries the
//! same [`BatchToken`]. [`JobSupervisor`] holds the single active-job slot;
//! a call from another batch takes the slot over, and calls from the batch
//! that held it notice at their next [`JobSupervisor::checkpoint`] and stop.
//!
//! Cancellation is cooperative only. A step already running (a decode, an
//! encode, a cache write) always finishes; it is the *next* step that is
//! skipped.

use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Slot value while no batch is active.
const IDLE: u64 = 0;

/// Identifier shared by every call of one browse batch.
///
/// Tokens from [`BatchToken::now`] are ordered: a larger token always
/// belongs to a later batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BatchToken(NonZeroU64);

impl BatchToken {
    /// Wraps a raw token. Returns `None` for `0`, which marks the idle slot.
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// Issues a token from the wall clock (milliseconds since the epoch).
    ///
    /// Tokens issued by one process are strictly increasing, even when the
    /// clock stalls or steps backwards.
    pub fn now() -> Self {
        static LAST_ISSUED: AtomicU64 = AtomicU64::new(0);

        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        let next = |last: u64| millis.max(last.saturating_add(1));
        let previous = LAST_ISSUED
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(next(last)))
            .unwrap_or_default();
        Self(NonZeroU64::new(next(previous)).unwrap_or(NonZeroU64::MIN))
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for BatchToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owner of the process-wide active-job slot.
///
/// The slot is one atomic word holding the active batch's token, or `0`
/// while idle. It is only reachable through `begin`, `checkpoint` and `end`.
#[derive(Debug, Default)]
pub struct JobSupervisor {
    slot: AtomicU64,
}

impl JobSupervisor {
    /// Creates a supervisor whose slot is idle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits a call of batch `token`; always allowed.
    ///
    /// The slot is overwritten with `token`, so whichever batch held it is
    /// superseded. A call whose batch already holds the slot keeps it.
    pub fn begin(&self, token: BatchToken) -> bool {
        let previous = self.slot.swap(token.get(), Ordering::SeqCst);
        if previous != IDLE && previous != token.get() {
            tracing::debug!(batch = %token, superseded = previous, "batch superseded");
        }
        true
    }

    /// Returns `true` while `token` still owns the slot.
    pub fn checkpoint(&self, token: BatchToken) -> bool {
        self.slot.load(Ordering::SeqCst) == token.get()
    }

    /// Releases the slot after the last call of a batch.
    ///
    /// No-op unless `is_last` is set and `token` still owns the slot.
    pub fn end(&self, token: BatchToken, is_last: bool) {
        if !is_last {
            return;
        }
        let _ = self
            .slot
            .compare_exchange(token.get(), IDLE, Ordering::SeqCst, Ordering::SeqCst);
    }

    /// Returns the batch currently allowed to work, or `None` when idle.
    pub fn active(&self) -> Option<BatchToken> {
        BatchToken::new(self.slot.load(Ordering::SeqCst))
    }
}
