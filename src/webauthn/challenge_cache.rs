//! # Challenge Cache
//!
//! Holds the one outstanding WebAuthn challenge per username between the
//! start and finish requests of a ceremony.
//!
//! ## Semantics
//! - `put` replaces whatever was cached for the username (last writer wins)
//! - `take` reads and removes in one step, so a challenge is usable once
//! - entries older than the TTL are gone, whether or not moka evicted them yet
//! - keys are lowercased, matching how usernames are stored
//!
//! The in-process cache only works for a single server instance. Running
//! several instances needs a [`ChallengeStore`] backed by shared storage.

use crate::error::AppResult;
use async_trait::async_trait;
use moka::future::Cache;
use std::time::{Duration, Instant};

/// Upper bound on concurrently outstanding ceremonies
const MAX_PENDING_CHALLENGES: u64 = 100_000;

/// Ceremony state kept until the finish request arrives
#[derive(Debug, Clone)]
pub struct PendingChallenge {
    pub username: String,
    /// Serialized verifier state for the finish step
    pub state: Vec<u8>,
    pub issued_at: Instant,
}

impl PendingChallenge {
    pub fn new(username: impl Into<String>, state: Vec<u8>) -> Self {
        Self {
            username: username.into(),
            state,
            issued_at: Instant::now(),
        }
    }
}

#[async_trait]
pub trait ChallengeStore: Send + Sync {
    /// Cache `challenge` under its username, replacing any earlier one
    async fn put(&self, challenge: PendingChallenge) -> AppResult<()>;

    /// Remove and return the live challenge for `username`
    async fn take(&self, username: &str) -> AppResult<Option<PendingChallenge>>;

    async fn remove(&self, username: &str) -> AppResult<()>;
}

pub struct InMemoryChallengeCache {
    entries: Cache<String, PendingChallenge>,
    ttl: Duration,
}

impl InMemoryChallengeCache {
    pub fn new(ttl: Duration) -> Self {
        let entries = Cache::builder()
            .max_capacity(MAX_PENDING_CHALLENGES)
            .time_to_live(ttl)
            .build();
        Self { entries, ttl }
    }

    fn key(username: &str) -> String {
        username.to_lowercase()
    }
}

#[async_trait]
impl ChallengeStore for InMemoryChallengeCache {
    async fn put(&self, challenge: PendingChallenge) -> AppResult<()> {
        tracing::debug!(username = %challenge.username, "Caching challenge");
        self.entries
            .insert(Self::key(&challenge.username), challenge)
            .await;
        Ok(())
    }

    async fn take(&self, username: &str) -> AppResult<Option<PendingChallenge>> {
        let Some(challenge) = self.entries.remove(&Self::key(username)).await else {
            return Ok(None);
        };

        if challenge.issued_at.elapsed() >= self.ttl {
            tracing::debug!(username, "Discarding expired challenge");
            return Ok(None);
        }

        Ok(Some(challenge))
    }

    async fn remove(&self, username: &str) -> AppResult<()> {
        self.entries.invalidate(&Self::key(username)).await;
        Ok(())
    }
}
