//! Concurrency-safe per-user state: conversation sessions and the postback
//! rate limiter, both bounded by a background reaper.

use std::sync::Arc;
use std::time::Duration;

use agenda_kernel::SessionState;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

struct SessionEntry {
    state: SessionState,
    lock: Arc<Mutex<()>>,
    last_activity: Instant,
}

impl SessionEntry {
    fn new(now: Instant) -> Self {
        Self {
            state: SessionState::default(),
            lock: Arc::new(Mutex::new(())),
            last_activity: now,
        }
    }
}

pub struct SessionStore {
    entries: DashMap<String, SessionEntry>,
    idle_ttl: Duration,
}

impl SessionStore {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            idle_ttl,
        }
    }

    /// Current state for `user`; idle when nothing is stored.
    pub fn get(&self, user: &str) -> SessionState {
        self.entries
            .get(user)
            .map(|entry| entry.state.clone())
            .unwrap_or_default()
    }

    pub fn set(&self, user: &str, state: SessionState) {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(user.to_string())
            .or_insert_with(|| SessionEntry::new(now));
        entry.state = state;
        entry.last_activity = now;
    }

    pub fn clear(&self, user: &str) {
        if let Some(mut entry) = self.entries.get_mut(user) {
            entry.state = SessionState::default();
            entry.last_activity = Instant::now();
        }
    }

    /// Lock serialising event handling for one user. Touches the session.
    pub fn user_lock(&self, user: &str) -> Arc<Mutex<()>> {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(user.to_string())
            .or_insert_with(|| SessionEntry::new(now));
        entry.last_activity = now;
        Arc::clone(&entry.lock)
    }

    /// Drops sessions idle longer than the TTL whose lock nobody holds.
    pub fn evict_idle(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            now.saturating_duration_since(entry.last_activity) <= self.idle_ttl
                || Arc::strong_count(&entry.lock) > 1
        });
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fixed-window limiter: a user is allowed again once `window` has passed
/// since their last allowed interaction.
pub struct RateLimiter {
    last_allowed: DashMap<String, Instant>,
    window: Duration,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            last_allowed: DashMap::new(),
            window,
        }
    }

    pub fn allow(&self, user: &str) -> bool {
        self.allow_at(user, Instant::now())
    }

    /// Records `now` only when the interaction is allowed.
    pub fn allow_at(&self, user: &str, now: Instant) -> bool {
        match self.last_allowed.entry(user.to_string()) {
            Entry::Occupied(mut last) => {
                if now.saturating_duration_since(*last.get()) < self.window {
                    false
                } else {
                    last.insert(now);
                    true
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        }
    }

    /// Entries older than the window can no longer deny anything.
    pub fn evict_expired(&self, now: Instant) -> usize {
        let before = self.last_allowed.len();
        self.last_allowed
            .retain(|_, last| now.saturating_duration_since(*last) < self.window);
        before - self.last_allowed.len()
    }

    pub fn len(&self) -> usize {
        self.last_allowed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_allowed.is_empty()
    }
}

pub fn spawn_reaper(
    sessions: Arc<SessionStore>,
    limiter: Arc<RateLimiter>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            let now = Instant::now();
            let sessions_evicted = sessions.evict_idle(now);
            let limits_evicted = limiter.evict_expired(now);
            if sessions_evicted > 0 {
                info!(sessions_evicted, "Idle sessions evicted");
            }
            debug!(limits_evicted, remaining = sessions.len(), "Reaper pass");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use agenda_kernel::{EventDraft, Flow};

    #[test]
    fn rate_limiter_denies_inside_window() {
        let limiter = RateLimiter::new(Duration::from_secs(2));
        let start = Instant::now();
        assert!(limiter.allow_at("U1", start));
        assert!(!limiter.allow_at("U1", start + Duration::from_millis(1_999)));
        assert!(limiter.allow_at("U2", start));
        assert!(limiter.allow_at("U1", start + Duration::from_secs(2)));
    }

    #[test]
    fn denied_requests_do_not_extend_the_window() {
        let limiter = RateLimiter::new(Duration::from_secs(2));
        let start = Instant::now();
        assert!(limiter.allow_at("U1", start));
        assert!(!limiter.allow_at("U1", start + Duration::from_millis(1_500)));
        assert!(limiter.allow_at("U1", start + Duration::from_millis(2_100)));
    }

    #[test]
    fn rate_limiter_eviction_drops_stale_entries() {
        let limiter = RateLimiter::new(Duration::from_secs(2));
        let start = Instant::now();
        limiter.allow_at("U1", start);
        limiter.allow_at("U2", start + Duration::from_secs(3));
        assert_eq!(limiter.evict_expired(start + Duration::from_secs(4)), 1);
        assert_eq!(limiter.len(), 1);
    }

    #[test]
    fn sessions_get_set_clear() {
        let store = SessionStore::new(Duration::from_secs(60));
        assert!(store.get("U1").is_idle());
        store.set("U1", SessionState::in_flow(Flow::CreateEvent(EventDraft::Title)));
        assert!(!store.get("U1").is_idle());
        store.clear("U1");
        assert!(store.get("U1").is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_are_evicted_unless_locked() {
        let store = SessionStore::new(Duration::from_secs(60));
        store.set("U1", SessionState::in_flow(Flow::CreateEvent(EventDraft::Title)));
        let held = store.user_lock("U2");
        let _guard = held.lock().await;

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(store.evict_idle(Instant::now()), 1);
        assert!(store.get("U1").is_idle());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reaper_runs_on_interval() {
        let sessions = Arc::new(SessionStore::new(Duration::from_secs(10)));
        let limiter = Arc::new(RateLimiter::new(Duration::from_secs(2)));
        sessions.set("U1", SessionState::default());
        limiter.allow("U1");
        let handle = spawn_reaper(
            Arc::clone(&sessions),
            Arc::clone(&limiter),
            Duration::from_secs(30),
        );

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(sessions.is_empty());
        assert!(limiter.is_empty());
        handle.abort();
    }
}
