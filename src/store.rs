use crate::types::{PendingAuthorization, PlatformCredentials, TokenRecord};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Outcome of matching a callback's `state` against the pending authorization.
#[derive(Debug)]
pub enum PendingMatch {
    Missing,
    /// The entry is left in place.
    Mismatched { created_at: DateTime<Utc> },
    Matched(PendingAuthorization),
}

/// In-memory credential, pending-authorization and token maps, keyed by platform id.
///
/// Writes are last-writer-wins per platform. Nothing is persisted.
#[derive(Debug, Default)]
pub struct OAuthStore {
    credentials: RwLock<HashMap<String, PlatformCredentials>>,
    pending: RwLock<HashMap<String, PendingAuthorization>>,
    tokens: RwLock<HashMap<String, TokenRecord>>,
}

impl OAuthStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_credentials(&self, platform: &str, credentials: PlatformCredentials) {
        write(&self.credentials).insert(platform.to_string(), credentials);
        debug!("Stored credentials for {}", platform);
    }

    pub fn get_credentials(&self, platform: &str) -> Option<PlatformCredentials> {
        read(&self.credentials).get(platform).cloned()
    }

    pub fn store_pending(&self, platform: &str, pending: PendingAuthorization) {
        if write(&self.pending)
            .insert(platform.to_string(), pending)
            .is_some()
        {
            debug!("Replaced in-flight authorization for {}", platform);
        }
    }

    pub fn get_pending(&self, platform: &str) -> Option<PendingAuthorization> {
        read(&self.pending).get(platform).cloned()
    }

    pub fn take_pending(&self, platform: &str) -> Option<PendingAuthorization> {
        write(&self.pending).remove(platform)
    }

    /// Check the state and consume the entry under one write lock.
    pub fn take_matching_pending(&self, platform: &str, state: &str) -> PendingMatch {
        let mut pending = write(&self.pending);
        match pending.get(platform) {
            None => PendingMatch::Missing,
            Some(entry) if entry.state != state => PendingMatch::Mismatched {
                created_at: entry.created_at,
            },
            Some(_) => match pending.remove(platform) {
                Some(entry) => PendingMatch::Matched(entry),
                None => PendingMatch::Missing,
            },
        }
    }

    pub fn store_token(&self, platform: &str, record: TokenRecord) {
        write(&self.tokens).insert(platform.to_string(), record);
    }

    pub fn get_token(&self, platform: &str) -> Option<TokenRecord> {
        read(&self.tokens).get(platform).cloned()
    }

    pub fn remove_token(&self, platform: &str) -> Option<TokenRecord> {
        write(&self.tokens).remove(platform)
    }

    /// Replace the record only while it still holds `refresh_token`.
    ///
    /// Returns false when the record was revoked or replaced in the meantime.
    pub fn replace_token_if(
        &self,
        platform: &str,
        refresh_token: &str,
        record: TokenRecord,
    ) -> bool {
        let mut tokens = write(&self.tokens);
        if !holds_refresh_token(tokens.get(platform), refresh_token) {
            return false;
        }
        tokens.insert(platform.to_string(), record);
        true
    }

    /// Remove the record only while it still holds `refresh_token`.
    pub fn remove_token_if(&self, platform: &str, refresh_token: &str) -> bool {
        let mut tokens = write(&self.tokens);
        if !holds_refresh_token(tokens.get(platform), refresh_token) {
            return false;
        }
        tokens.remove(platform);
        true
    }
}

fn holds_refresh_token(record: Option<&TokenRecord>, refresh_token: &str) -> bool {
    record.and_then(|r| r.refresh_token.as_deref()) == Some(refresh_token)
}
