//! Workflow session coalescing.
//!
//! Groups a user's consecutive workflow steps (title generation, outline,
//! humanize, ...) under one session token while the steps keep arriving
//! within a rolling window. The table lives in memory for the lifetime of the
//! process; nothing is persisted and nothing is shared across processes, so
//! two gateway instances mint independent tokens for the same user.
//!
//! Expired records are not removed on lookup. They stay in the table until
//! [`SessionCoalescer::prune_expired`] runs, either from a request handler or
//! from the background task started by [`SessionCoalescer::spawn_pruner`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Default rolling window for [`SessionCoalescer::get_or_create`].
pub const DEFAULT_WINDOW_MINUTES: u64 = 30;

/// Default maximum record age for [`SessionCoalescer::prune_expired`].
pub const DEFAULT_MAX_AGE_MINUTES: u64 = 60;

const MILLIS_PER_MINUTE: i64 = 60_000;

/// `tokio::time::interval` panics on a zero period.
const MIN_PRUNE_INTERVAL: Duration = Duration::from_millis(1);

/// Millisecond wall-clock source.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Real wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// One minted session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub token: String,
    pub user_id: String,
    pub created_at: i64,
}

impl SessionRecord {
    fn age_at(&self, now: i64) -> i64 {
        now - self.created_at
    }
}

/// In-process table of workflow session tokens.
///
/// Construct one per process and share it through `Arc`.
pub struct SessionCoalescer {
    // Insertion order is the scan order for lookups.
    records: Mutex<Vec<SessionRecord>>,
    clock: Arc<dyn Clock>,
}

impl SessionCoalescer {
    /// Create a coalescer backed by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a coalescer with a custom clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            clock,
        }
    }

    fn table(&self) -> MutexGuard<'_, Vec<SessionRecord>> {
        // Every critical section leaves the table consistent, so a poisoned
        // lock is still safe to use.
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Build a fresh token `session_<user_id>_<now_ms>` without storing it.
    pub fn mint_token(&self, user_id: &str) -> String {
        format_token(user_id, self.clock.now_millis())
    }

    /// Return the user's live session token, or mint and store a new one.
    ///
    /// A record is live when its age is strictly below `window_minutes`.
    /// When several live records exist for the user the oldest inserted one
    /// wins.
    pub fn get_or_create(&self, user_id: &str, window_minutes: u64) -> String {
        let window = minutes_to_millis(window_minutes);
        let now = self.clock.now_millis();
        let mut table = self.table();

        if let Some(record) = table
            .iter()
            .find(|r| r.user_id == user_id && r.age_at(now) < window)
        {
            return record.token.clone();
        }

        let token = format_token(user_id, now);
        // Same user, same millisecond, zero window: keep a single entry.
        if !table.iter().any(|r| r.token == token) {
            table.push(SessionRecord {
                token: token.clone(),
                user_id: user_id.to_string(),
                created_at: now,
            });
        }
        drop(table);

        tracing::debug!(user_id = %user_id, session_id = %token, "Minted workflow session");
        token
    }

    /// Remove every record older than `max_age_minutes`. Returns how many
    /// records were dropped.
    pub fn prune_expired(&self, max_age_minutes: u64) -> usize {
        let max_age = minutes_to_millis(max_age_minutes);
        let now = self.clock.now_millis();
        let mut table = self.table();

        let before = table.len();
        table.retain(|r| r.age_at(now) <= max_age);
        let removed = before - table.len();
        drop(table);

        if removed > 0 {
            tracing::debug!(removed, "Pruned expired workflow sessions");
        }
        removed
    }

    /// Number of records currently held, expired or not.
    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }

    /// Copy of the table in insertion order.
    pub fn snapshot(&self) -> Vec<SessionRecord> {
        self.table().clone()
    }

    /// Prune on a fixed cadence until the returned handle is aborted.
    ///
    /// The first prune runs immediately. A zero `every` is raised to one
    /// millisecond.
    pub fn spawn_pruner(
        self: &Arc<Self>,
        every: Duration,
        max_age_minutes: u64,
    ) -> JoinHandle<()> {
        let every = every.max(MIN_PRUNE_INTERVAL);
        let coalescer = Arc::clone(self);
        tracing::info!(
            interval_secs = every.as_secs(),
            max_age_minutes,
            "Starting workflow session pruner"
        );

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                coalescer.prune_expired(max_age_minutes);
            }
        })
    }
}

impl Default for SessionCoalescer {
    fn default() -> Self {
        Self::new()
    }
}

fn format_token(user_id: &str, millis: i64) -> String {
    format!("session_{}_{}", user_id, millis)
}

fn minutes_to_millis(minutes: u64) -> i64 {
    i64::try_from(minutes)
        .unwrap_or(i64::MAX)
        .saturating_mul(MILLIS_PER_MINUTE)
}
