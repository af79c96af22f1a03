use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use thiserror::Error;

use restohub_auth::PkceVerifier;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("no verifier stored for state")]
    Missing,

    #[error("verifier for state has expired")]
    Expired,

    #[error("verifier cache unavailable")]
    Poisoned,
}

/// A login started by `state`: the provider it was sent to and its PKCE verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLogin {
    pub provider: String,
    pub verifier: PkceVerifier,
}

impl PendingLogin {
    pub fn new(provider: impl Into<String>, verifier: PkceVerifier) -> Self {
        Self {
            provider: provider.into(),
            verifier,
        }
    }
}

/// Short-lived mapping from login `state` to the pending login it started.
pub trait VerifierCache: Send + Sync {
    fn set(&self, state: &str, login: PendingLogin) -> Result<(), CacheError>;

    /// Read without consuming.
    fn get(&self, state: &str) -> Result<PendingLogin, CacheError>;

    /// Read and remove, so a state can complete at most one callback.
    fn take(&self, state: &str) -> Result<PendingLogin, CacheError>;
}

#[derive(Debug)]
struct Entry {
    login: PendingLogin,
    stored_at: Instant,
}

/// Process-local verifier cache with a fixed time-to-live.
///
/// Expired entries are swept on every `set`, so abandoned logins do not
/// accumulate.
#[derive(Debug)]
pub struct InMemoryVerifierCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryVerifierCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_fresh(&self, entry: &Entry) -> bool {
        entry.stored_at.elapsed() < self.ttl
    }
}

impl VerifierCache for InMemoryVerifierCache {
    fn set(&self, state: &str, login: PendingLogin) -> Result<(), CacheError> {
        let mut entries = self.entries.write().map_err(|_| CacheError::Poisoned)?;
        entries.retain(|_, entry| entry.stored_at.elapsed() < self.ttl);
        entries.insert(
            state.to_string(),
            Entry {
                login,
                stored_at: Instant::now(),
            },
        );
        Ok(())
    }

    fn get(&self, state: &str) -> Result<PendingLogin, CacheError> {
        let entries = self.entries.read().map_err(|_| CacheError::Poisoned)?;
        let entry = entries.get(state).ok_or(CacheError::Missing)?;
        if self.is_fresh(entry) {
            Ok(entry.login.clone())
        } else {
            Err(CacheError::Expired)
        }
    }

    fn take(&self, state: &str) -> Result<PendingLogin, CacheError> {
        let mut entries = self.entries.write().map_err(|_| CacheError::Poisoned)?;
        let entry = entries.remove(state).ok_or(CacheError::Missing)?;
        if self.is_fresh(&entry) {
            Ok(entry.login)
        } else {
            Err(CacheError::Expired)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn pending(verifier: &str) -> PendingLogin {
        PendingLogin::new("google", PkceVerifier::from_string(verifier))
    }

    #[test]
    fn take_consumes_entry() {
        let cache = InMemoryVerifierCache::new(Duration::from_secs(60));
        let login = pending("v1");
        cache.set("s1", login.clone()).unwrap();

        assert_eq!(cache.get("s1").unwrap(), login);
        assert_eq!(cache.take("s1").unwrap(), login);
        assert_eq!(cache.take("s1").unwrap_err(), CacheError::Missing);
    }

    #[test]
    fn unknown_state_is_missing() {
        let cache = InMemoryVerifierCache::new(Duration::from_secs(60));
        assert_eq!(cache.get("nope").unwrap_err(), CacheError::Missing);
    }

    #[test]
    fn entry_remembers_its_provider() {
        let cache = InMemoryVerifierCache::new(Duration::from_secs(60));
        cache
            .set("s1", PendingLogin::new("authentik", PkceVerifier::from_string("v")))
            .unwrap();
        assert_eq!(cache.take("s1").unwrap().provider, "authentik");
    }

    #[test]
    fn expired_entries_are_rejected_and_swept() {
        let cache = InMemoryVerifierCache::new(Duration::ZERO);
        cache.set("old", pending("v")).unwrap();
        assert_eq!(cache.get("old").unwrap_err(), CacheError::Expired);

        cache.set("new", pending("w")).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.take("new").unwrap_err(), CacheError::Expired);
        assert!(cache.is_empty());
    }

    #[test]
    fn parallel_logins_redeem_only_their_own_verifier() {
        let cache = Arc::new(InMemoryVerifierCache::new(Duration::from_secs(60)));

        let workers: Vec<_> = (0..8)
            .map(|worker| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for attempt in 0..200 {
                        let state = format!("state-{worker}-{attempt}");
                        let verifier = format!("verifier-{worker}-{attempt}");
                        cache.set(&state, pending(&verifier)).unwrap();
                        let redeemed = cache.take(&state).unwrap();
                        assert_eq!(redeemed.verifier.as_str(), verifier);
                        assert_eq!(cache.take(&state).unwrap_err(), CacheError::Missing);
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }
        assert!(cache.is_empty());
    }

    proptest::proptest! {
        #[test]
        fn interleaved_logins_never_see_each_others_verifier(
            states in proptest::collection::hash_set("[a-z0-9-]{8,36}", 1..16)
        ) {
            let cache = InMemoryVerifierCache::new(Duration::from_secs(60));
            for state in &states {
                cache.set(state, pending(&format!("verifier-{state}"))).unwrap();
            }
            for state in &states {
                let login = cache.take(state).unwrap();
                proptest::prop_assert_eq!(login.verifier.as_str(), format!("verifier-{state}"));
            }
            proptest::prop_assert!(cache.is_empty());
        }
    }
}
