//! Resolution of a usable access token for a user.
//!
//! [`CredentialResolver`] is the only writer of the [`TokenStore`]. It hands out the stored access
//! token while it is fresh and transparently refreshes it once it isn't. Refreshes are serialized
//! per user: concurrent callers that find the same expired token wait for the one refresh that
//! actually hits the provider and then reuse its result.

use crate::oauth::{OAuthClient, TokenSet};
use crate::store::{CredentialRecord, TokenStore};
use crate::{Error, Result};
use jiff::{SignedDuration, Timestamp};
use oauth2::{AccessToken, AuthorizationCode};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::instrument;

/// Source of the current time for expiry decisions.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Timestamp;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: std::sync::Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: std::sync::Mutex::new(now),
        }
    }

    pub fn set(&self, now: Timestamp) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn advance(&self, by: SignedDuration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now = now.checked_add(by).unwrap_or(Timestamp::MAX);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct CredentialResolver {
    oauth: OAuthClient,
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    /// One lock per user id; held across refresh-and-persist.
    refresh_guards: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("oauth", &self.oauth)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl CredentialResolver {
    pub fn new(oauth: OAuthClient, store: Arc<dyn TokenStore>) -> Self {
        Self::with_clock(oauth, store, Arc::new(SystemClock))
    }

    pub fn with_clock(oauth: OAuthClient, store: Arc<dyn TokenStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            oauth,
            store,
            clock,
            refresh_guards: Default::default(),
        }
    }

    pub fn oauth(&self) -> &OAuthClient {
        &self.oauth
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Takes the user's refresh lock, waiting for any refresh already in flight.
    async fn lock_user<'r>(&'r self, user_id: &'r str) -> UserLock<'r> {
        let mutex = {
            let mut guards = self
                .refresh_guards
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(guards.entry(user_id.to_string()).or_default())
        };
        let held = Arc::clone(&mutex).lock_owned().await;
        UserLock {
            guards: &self.refresh_guards,
            user_id,
            mutex,
            held: Some(held),
        }
    }

    /// Persists a freshly issued token set as the user's only credential.
    #[instrument(skip(self, tokens))]
    pub async fn store_tokens(&self, user_id: &str, tokens: TokenSet) -> Result<CredentialRecord> {
        let _held = self.lock_user(user_id).await;
        let record = CredentialRecord::issue(user_id, tokens, self.clock.now());
        self.store.save(&record).await?;
        tracing::debug!(expires_at = %record.expires_at, "stored credentials");
        Ok(record)
    }

    /// Exchanges an authorization code and stores the resulting tokens for `user_id`.
    #[instrument(skip(self, code))]
    pub async fn connect(&self, user_id: &str, code: &AuthorizationCode) -> Result<CredentialRecord> {
        let tokens = self.oauth.exchange_code(code).await?;
        if tokens.refresh_token.is_none() {
            tracing::warn!("provider issued no refresh token; access ends when this token expires");
        }
        self.store_tokens(user_id, tokens).await
    }

    /// Forgets the user's credential. Disconnecting twice is fine.
    #[instrument(skip(self))]
    pub async fn disconnect(&self, user_id: &str) -> Result<()> {
        let _held = self.lock_user(user_id).await;
        self.store.delete(user_id).await?;
        Ok(())
    }

    /// Returns an access token that is fresh right now, refreshing the stored one if needed.
    ///
    /// `Ok(None)` means the user is not connected: there never was a credential, the expired one
    /// had no refresh token, or the provider rejected the refresh token (in which case the stored
    /// credential is deleted).
    #[instrument(skip(self))]
    pub async fn valid_access_token(&self, user_id: &str) -> Result<Option<AccessToken>> {
        let Some(record) = self.store.load(user_id).await? else {
            return Ok(None);
        };
        if record.is_fresh_at(self.clock.now()) {
            return Ok(Some(record.access_token));
        }

        let _held = self.lock_user(user_id).await;
        // Someone else may have refreshed while we were waiting for the lock.
        let Some(record) = self.store.load(user_id).await? else {
            return Ok(None);
        };
        if record.is_fresh_at(self.clock.now()) {
            tracing::trace!("access token was refreshed concurrently");
            return Ok(Some(record.access_token));
        }
        tracing::debug!("access token expired, attempting refresh");
        self.refresh_locked(user_id, record).await
    }

    /// Refreshes even though the stored token looks fresh, because the resource API just
    /// rejected `rejected`.
    ///
    /// If the stored token has already been replaced by another caller since `rejected` was
    /// handed out, that newer token is returned without another refresh.
    #[instrument(skip(self, rejected))]
    pub async fn force_refresh(
        &self,
        user_id: &str,
        rejected: Option<&AccessToken>,
    ) -> Result<Option<AccessToken>> {
        let _held = self.lock_user(user_id).await;
        let Some(record) = self.store.load(user_id).await? else {
            return Ok(None);
        };
        if let Some(rejected) = rejected {
            if record.access_token.secret() != rejected.secret()
                && record.is_fresh_at(self.clock.now())
            {
                tracing::trace!("rejected token was already replaced");
                return Ok(Some(record.access_token));
            }
        }
        self.refresh_locked(user_id, record).await
    }

    /// Thin wrapper over [`Self::valid_access_token`] for gating access.
    pub async fn has_valid_access(&self, user_id: &str) -> Result<bool> {
        Ok(self.valid_access_token(user_id).await?.is_some())
    }

    /// Must be called with the user's lock held.
    async fn refresh_locked(
        &self,
        user_id: &str,
        record: CredentialRecord,
    ) -> Result<Option<AccessToken>> {
        let Some(refresh_token) = record.refresh_token else {
            tracing::warn!("access token expired and no refresh token is stored");
            return Ok(None);
        };

        match self.oauth.refresh(&refresh_token).await {
            Ok(tokens) => {
                let tokens = tokens.or_refresh_token(refresh_token);
                let record = CredentialRecord::issue(user_id, tokens, self.clock.now());
                self.store.save(&record).await?;
                tracing::debug!(expires_at = %record.expires_at, "access token successfully refreshed");
                Ok(Some(record.access_token))
            }
            Err(e @ Error::TokenRefresh { .. }) => {
                tracing::warn!(error = %e, "refresh token rejected, forgetting credentials");
                self.store.delete(user_id).await?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// A held per-user refresh lock.
///
/// On release, the user's entry leaves the lock map unless someone else is already waiting on it,
/// so the map only holds users with a refresh in flight.
struct UserLock<'r> {
    guards: &'r std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
    user_id: &'r str,
    mutex: Arc<Mutex<()>>,
    held: Option<OwnedMutexGuard<()>>,
}

impl Drop for UserLock<'_> {
    fn drop(&mut self) {
        drop(self.held.take());
        let mut guards = self.guards.lock().unwrap_or_else(PoisonError::into_inner);
        // New handles are only cloned under `guards`, so the count can't grow while we look.
        // Two handles left means the map's and ours.
        if Arc::strong_count(&self.mutex) == 2
            && guards
                .get(self.user_id)
                .is_some_and(|m| Arc::ptr_eq(m, &self.mutex))
        {
            guards.remove(self.user_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OAuthConfig;
    use crate::store::MemoryStore;
    use oauth2::RefreshToken;
    use std::time::Duration;

    fn resolver(store: Arc<MemoryStore>, clock: Arc<ManualClock>) -> CredentialResolver {
        // Nothing listens here; tests that reach the token endpoint would fail loudly.
        let config = OAuthConfig::google("id", "secret", "http://localhost/cb")
            .with_token_url("http://127.0.0.1:9/token");
        CredentialResolver::with_clock(OAuthClient::new(config).unwrap(), store, clock)
    }

    fn tokens(access: &str, refresh: Option<&str>) -> TokenSet {
        TokenSet {
            access_token: AccessToken::new(access.to_string()),
            refresh_token: refresh.map(|r| RefreshToken::new(r.to_string())),
            expires_in: Duration::from_secs(3600),
            token_type: "Bearer".to_string(),
            scope: String::new(),
        }
    }

    #[test]
    fn manual_clock_moves_only_when_told() {
        let start: Timestamp = "2024-01-01T00:00:00Z".parse().unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);
        clock.advance(SignedDuration::from_secs(90));
        assert_eq!(clock.now(), "2024-01-01T00:01:30Z".parse().unwrap());
    }

    #[tokio::test]
    async fn unknown_user_is_not_connected() {
        let clock = Arc::new(ManualClock::new(Timestamp::now()));
        let r = resolver(Arc::new(MemoryStore::new()), clock);
        assert!(r.valid_access_token("nobody").await.unwrap().is_none());
        assert!(!r.has_valid_access("nobody").await.unwrap());
    }

    #[tokio::test]
    async fn fresh_token_is_returned_without_refresh() {
        let clock = Arc::new(ManualClock::new("2024-01-01T00:00:00Z".parse().unwrap()));
        let r = resolver(Arc::new(MemoryStore::new()), Arc::clone(&clock));
        r.store_tokens("u1", tokens("A1", Some("R1"))).await.unwrap();

        clock.advance(SignedDuration::from_secs(3599));
        let token = r.valid_access_token("u1").await.unwrap().unwrap();
        assert_eq!(token.secret(), "A1");
    }

    #[tokio::test]
    async fn expired_without_refresh_token_is_not_connected() {
        let clock = Arc::new(ManualClock::new("2024-01-01T00:00:00Z".parse().unwrap()));
        let store = Arc::new(MemoryStore::new());
        let r = resolver(Arc::clone(&store), Arc::clone(&clock));
        r.store_tokens("u1", tokens("A1", None)).await.unwrap();

        clock.advance(SignedDuration::from_secs(3600));
        assert!(r.valid_access_token("u1").await.unwrap().is_none());
        // Nothing was attempted, so nothing was deleted either.
        assert!(store.load("u1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let clock = Arc::new(ManualClock::new(Timestamp::now()));
        let store = Arc::new(MemoryStore::new());
        let r = resolver(Arc::clone(&store), clock);
        r.store_tokens("u1", tokens("A1", Some("R1"))).await.unwrap();
        r.disconnect("u1").await.unwrap();
        r.disconnect("u1").await.unwrap();
        assert!(store.load("u1").await.unwrap().is_none());
    }

    fn locked_users(r: &CredentialResolver) -> usize {
        r.refresh_guards.lock().unwrap().len()
    }

    #[tokio::test]
    async fn user_locks_are_released_once_idle() {
        let clock = Arc::new(ManualClock::new("2024-01-01T00:00:00Z".parse().unwrap()));
        let r = resolver(Arc::new(MemoryStore::new()), Arc::clone(&clock));
        for user in ["u1", "u2", "u3"] {
            r.store_tokens(user, tokens("A1", None)).await.unwrap();
        }
        assert_eq!(locked_users(&r), 0);

        clock.advance(SignedDuration::from_secs(3600));
        assert!(r.valid_access_token("u1").await.unwrap().is_none());
        r.disconnect("u2").await.unwrap();
        assert_eq!(locked_users(&r), 0);
    }

    #[tokio::test]
    async fn waiting_caller_keeps_the_lock_entry() {
        let r = resolver(
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(Timestamp::now())),
        );
        let first = r.lock_user("u1").await;
        let second = r.lock_user("u1");
        tokio::pin!(second);
        // Registers the second caller as a waiter without letting it through.
        assert!(poll_briefly(second.as_mut()).await.is_none());
        drop(first);
        assert_eq!(locked_users(&r), 1);
        drop(second.await);
        assert_eq!(locked_users(&r), 0);
    }

    async fn poll_briefly<F: std::future::Future + Unpin>(fut: F) -> Option<F::Output> {
        tokio::time::timeout(Duration::from_millis(20), fut).await.ok()
    }

    #[tokio::test]
    async fn unreachable_token_endpoint_keeps_credentials() {
        let clock = Arc::new(ManualClock::new("2024-01-01T00:00:00Z".parse().unwrap()));
        let store = Arc::new(MemoryStore::new());
        let r = resolver(Arc::clone(&store), Arc::clone(&clock));
        r.store_tokens("u1", tokens("A1", Some("R1"))).await.unwrap();

        clock.advance(SignedDuration::from_secs(3600));
        let err = r.valid_access_token("u1").await.unwrap_err();
        assert!(
            matches!(err, Error::Transport(_) | Error::Timeout(_)),
            "{err:?}"
        );
        let record = store.load("u1").await.unwrap().unwrap();
        assert_eq!(record.refresh_token.unwrap().secret(), "R1");
    }

    #[tokio::test]
    async fn force_refresh_reuses_a_newer_token() {
        let clock = Arc::new(ManualClock::new(Timestamp::now()));
        let r = resolver(Arc::new(MemoryStore::new()), clock);
        r.store_tokens("u1", tokens("A2", Some("R1"))).await.unwrap();

        let stale = AccessToken::new("A1".to_string());
        let token = r.force_refresh("u1", Some(&stale)).await.unwrap().unwrap();
        assert_eq!(token.secret(), "A2");
    }
}
