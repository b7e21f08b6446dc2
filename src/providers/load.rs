//! In-flight request accounting.
//!
//! [`ActiveLoad`] counts attempts currently running against each provider.
//! Attempts hold a [`LoadGuard`]; dropping the guard releases the slot, so a
//! panicking or cancelled call can never leave a provider permanently busy.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::warn;

/// Provider → in-flight count. Counts never go negative.
#[derive(Debug, Default)]
pub struct ActiveLoad {
    counts: Mutex<HashMap<String, u32>>,
}

impl ActiveLoad {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current in-flight count for a provider (0 if never seen).
    pub fn get(&self, provider: &str) -> u32 {
        self.lock().get(provider).copied().unwrap_or(0)
    }

    pub fn increment(&self, provider: &str) {
        let mut counts = self.lock();
        let count = counts.entry(provider.to_string()).or_insert(0);
        *count = count.saturating_add(1);
    }

    /// Decrement, clamping at zero. An unmatched decrement is logged.
    pub fn decrement(&self, provider: &str) {
        let mut counts = self.lock();
        match counts.get_mut(provider) {
            Some(count) if *count > 0 => *count -= 1,
            _ => warn!(provider, "load decrement without matching increment"),
        }
    }

    /// Increment only if the provider is below `limit`. Check and increment
    /// happen under one lock acquisition.
    pub fn try_increment(&self, provider: &str, limit: u32) -> bool {
        let mut counts = self.lock();
        let count = counts.entry(provider.to_string()).or_insert(0);
        if *count >= limit {
            return false;
        }
        *count += 1;
        true
    }

    /// Take a slot unconditionally.
    pub fn acquire(self: &Arc<Self>, provider: &str) -> LoadGuard {
        self.increment(provider);
        LoadGuard {
            load: Arc::clone(self),
            provider: provider.to_string(),
        }
    }

    /// Take a slot if one is free under `limit`.
    pub fn try_acquire(self: &Arc<Self>, provider: &str, limit: u32) -> Option<LoadGuard> {
        self.try_increment(provider, limit).then(|| LoadGuard {
            load: Arc::clone(self),
            provider: provider.to_string(),
        })
    }

    /// Copy of all non-zero counts.
    pub fn snapshot(&self) -> HashMap<String, u32> {
        self.lock()
            .iter()
            .filter(|(_, c)| **c > 0)
            .map(|(p, c)| (p.clone(), *c))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, u32>> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One in-flight slot. Released on drop.
#[derive(Debug)]
#[must_use = "dropping the guard releases the slot immediately"]
pub struct LoadGuard {
    load: Arc<ActiveLoad>,
    provider: String,
}

impl LoadGuard {
    pub fn provider(&self) -> &str {
        &self.provider
    }
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        self.load.decrement(&self.provider);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_releases_on_drop() {
        let load = Arc::new(ActiveLoad::new());
        {
            let _a = load.acquire("openai");
            let _b = load.acquire("openai");
            assert_eq!(load.get("openai"), 2);
        }
        assert_eq!(load.get("openai"), 0);
    }

    #[test]
    fn decrement_never_goes_negative() {
        let load = ActiveLoad::new();
        load.decrement("openai");
        assert_eq!(load.get("openai"), 0);
        load.increment("openai");
        load.decrement("openai");
        load.decrement("openai");
        assert_eq!(load.get("openai"), 0);
    }

    #[test]
    fn try_acquire_respects_limit() {
        let load = Arc::new(ActiveLoad::new());
        let first = load.try_acquire("ollama", 1);
        assert!(first.is_some());
        assert!(load.try_acquire("ollama", 1).is_none());
        drop(first);
        assert!(load.try_acquire("ollama", 1).is_some());
    }

    #[test]
    fn guard_releases_on_panic() {
        let load = Arc::new(ActiveLoad::new());
        let cloned = Arc::clone(&load);
        let result = std::panic::catch_unwind(move || {
            let _guard = cloned.acquire("anthropic");
            panic!("call blew up");
        });
        assert!(result.is_err());
        assert_eq!(load.get("anthropic"), 0);
    }

    #[test]
    fn snapshot_skips_idle_providers() {
        let load = Arc::new(ActiveLoad::new());
        let _g = load.acquire("openai");
        drop(load.acquire("google"));
        let snap = load.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap["openai"], 1);
    }
}
